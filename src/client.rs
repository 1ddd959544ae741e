use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::{ClientConfig, MAX_ITEM_PAGE};
use crate::credential::{ChainProvider, Credential, CredentialProvider};
use crate::error::{PaapiError, Result};
use crate::exec::handle_response;
use crate::fetch::{Page, PageSource, PaginatedFetcher};
use crate::filter::ItemFilter;
use crate::request::{SearchItemsRequest, build_signed_request};
use crate::response::{Product, SearchItemsResponse, SearchOutcome};

/// Async client for the catalog search API.
///
/// Configuration and credentials are fixed at construction. Every call signs
/// its request afresh at the instant it is sent.
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
    credential: Credential,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client with an explicit credential.
    pub fn new(credential: Credential) -> Result<Self> {
        Self::with_config(credential, ClientConfig::default())
    }

    /// Creates a new client with an explicit credential and custom configuration.
    pub fn with_config(credential: Credential, config: ClientConfig) -> Result<Self> {
        credential.validate()?;
        config.host()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| PaapiError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            credential,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Creates a new client from the environment: credentials from the
    /// default chain, configuration from [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        let credential = ChainProvider::default_chain().resolve()?;
        Self::with_config(credential, ClientConfig::from_env()?)
    }

    /// Replaces the clock used to timestamp signatures.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the sleeper used for backoff and inter-page pauses.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetches a single page, without retries.
    ///
    /// The page is `request.item_page`, or 1 when unset.
    pub async fn search_items(&self, request: &SearchItemsRequest) -> Result<SearchItemsResponse> {
        self.execute(request, request.item_page.unwrap_or(1), self.page_size(request))
            .await
    }

    /// Collects up to `target_count` products matching `filter` across pages.
    ///
    /// Throttled or timed-out pages are retried per the configured
    /// [`RetryPolicy`](crate::RetryPolicy). A search that matches nothing
    /// returns [`SearchOutcome::NoResults`].
    pub async fn search(
        &self,
        request: &SearchItemsRequest,
        target_count: usize,
        filter: &ItemFilter,
    ) -> Result<SearchOutcome> {
        self.search_with_cancel(request, target_count, filter, CancellationToken::new())
            .await
    }

    /// Same as [`Client::search`], abandoning the in-flight call or pause
    /// once `cancel` fires.
    pub async fn search_with_cancel(
        &self,
        request: &SearchItemsRequest,
        target_count: usize,
        filter: &ItemFilter,
        cancel: CancellationToken,
    ) -> Result<SearchOutcome> {
        request.validate()?;

        let pages = SearchPages {
            client: self,
            request,
            page_size: self.page_size(request),
        };
        let products = PaginatedFetcher::new(&pages, self.sleeper.as_ref(), &self.config.retry)
            .with_cancellation(cancel)
            .fetch(target_count, |product| filter.matches(product))
            .await?;

        info!(
            keywords = %request.keywords,
            found = products.len(),
            target = target_count,
            "search completed"
        );
        Ok(SearchOutcome::from_products(products))
    }

    fn page_size(&self, request: &SearchItemsRequest) -> u32 {
        request.item_count.unwrap_or(self.config.page_size)
    }

    async fn execute(
        &self,
        request: &SearchItemsRequest,
        page: u32,
        page_size: u32,
    ) -> Result<SearchItemsResponse> {
        let signed = build_signed_request(
            request,
            page,
            page_size,
            &self.credential,
            &self.config,
            self.clock.now(),
        )?;

        let mut builder = self.http.post(&signed.url);
        for (name, value) in &signed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(page, url = %signed.url, "sending search request");
        let response = builder.body(signed.body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(page, status = status.as_u16(), "received search response");

        handle_response(status, &text)
    }
}

/// Pages of one search, fetched through the client.
struct SearchPages<'a> {
    client: &'a Client,
    request: &'a SearchItemsRequest,
    page_size: u32,
}

impl PageSource for SearchPages<'_> {
    type Item = Product;

    async fn fetch_page(&self, page: u32) -> Result<Page<Product>> {
        let response = self
            .client
            .execute(self.request, page, self.page_size)
            .await?;
        let total = response
            .search_result
            .as_ref()
            .and_then(|r| r.total_result_count);
        let items: Vec<Product> = response.items().iter().map(Product::from).collect();
        let has_more = has_more_pages(total, items.len(), page, self.page_size);
        Ok(Page::new(items, has_more))
    }
}

/// Whether a page after `page` exists.
///
/// Uses the reported total when present, otherwise assumes more results
/// follow a full page. Never goes past the upstream page cap.
fn has_more_pages(total: Option<u32>, fetched: usize, page: u32, page_size: u32) -> bool {
    if page >= MAX_ITEM_PAGE {
        return false;
    }
    match total {
        Some(total) => page < total.div_ceil(page_size.max(1)),
        None => fetched >= page_size as usize,
    }
}

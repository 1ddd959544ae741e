use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::error::{PaapiError, Result};

/// Largest page the upstream will return for a single `SearchItems` call.
pub const MAX_ITEM_COUNT: u32 = 10;

/// Highest page number the upstream accepts.
pub const MAX_ITEM_PAGE: u32 = 10;

/// Known marketplaces as `(marketplace, host, region)`.
const MARKETPLACES: &[(&str, &str, &str)] = &[
    ("www.amazon.com", "webservices.amazon.com", "us-east-1"),
    ("www.amazon.ca", "webservices.amazon.ca", "us-east-1"),
    ("www.amazon.com.mx", "webservices.amazon.com.mx", "us-east-1"),
    ("www.amazon.com.br", "webservices.amazon.com.br", "us-east-1"),
    ("www.amazon.co.uk", "webservices.amazon.co.uk", "eu-west-1"),
    ("www.amazon.de", "webservices.amazon.de", "eu-west-1"),
    ("www.amazon.fr", "webservices.amazon.fr", "eu-west-1"),
    ("www.amazon.it", "webservices.amazon.it", "eu-west-1"),
    ("www.amazon.es", "webservices.amazon.es", "eu-west-1"),
    ("www.amazon.in", "webservices.amazon.in", "eu-west-1"),
    ("www.amazon.co.jp", "webservices.amazon.co.jp", "us-west-2"),
    ("www.amazon.com.au", "webservices.amazon.com.au", "us-west-2"),
];

/// Retry and pacing policy for paginated fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed per page, including the first one.
    pub max_attempts: u32,

    /// Fixed pause before retrying a throttled or timed-out page.
    pub backoff: Duration,

    /// Courtesy pause between two successful pages.
    pub inter_page_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            inter_page_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_inter_page_delay(mut self, delay: Duration) -> Self {
        self.inter_page_delay = delay;
        self
    }
}

/// Configuration for the catalog client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API host, e.g. `https://webservices.amazon.com`.
    pub endpoint: String,

    /// Signing region.
    pub region: String,

    /// Signing service name.
    pub service: String,

    /// Marketplace the search runs against.
    pub marketplace: String,

    /// Partner type sent with every request.
    pub partner_type: String,

    /// HTTP request timeout for a single upstream call.
    pub timeout: Duration,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Per-page retry policy.
    pub retry: RetryPolicy,

    /// Items requested per page.
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://webservices.amazon.com".to_string(),
            region: "us-east-1".to_string(),
            service: "ProductAdvertisingAPI".to_string(),
            marketplace: "www.amazon.com".to_string(),
            partner_type: "Associates".to_string(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            page_size: MAX_ITEM_COUNT,
        }
    }
}

impl ClientConfig {
    /// Default configuration with `PAAPI_ENDPOINT`, `PAAPI_REGION` and
    /// `PAAPI_MARKETPLACE` applied when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(marketplace) = env::var("PAAPI_MARKETPLACE") {
            config = config.with_marketplace(marketplace)?;
        }
        if let Ok(endpoint) = env::var("PAAPI_ENDPOINT") {
            config = config.with_endpoint(endpoint);
        }
        if let Ok(region) = env::var("PAAPI_REGION") {
            config = config.with_region(region);
        }
        config.host()?;
        Ok(config)
    }

    /// Sets a custom endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Switches to a known marketplace, updating endpoint and region with it.
    pub fn with_marketplace(mut self, marketplace: impl Into<String>) -> Result<Self> {
        let marketplace = marketplace.into();
        let (_, host, region) = MARKETPLACES
            .iter()
            .find(|(name, _, _)| *name == marketplace)
            .ok_or_else(|| {
                PaapiError::Configuration(format!("unknown marketplace '{marketplace}'"))
            })?;
        self.endpoint = format!("https://{host}");
        self.region = (*region).to_string();
        self.marketplace = marketplace;
        Ok(self)
    }

    /// Sets the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the page size, clamped to `1..=MAX_ITEM_COUNT`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_ITEM_COUNT);
        self
    }

    /// Host (with non-default port) the signature is bound to.
    pub fn host(&self) -> Result<String> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            PaapiError::Configuration(format!("invalid endpoint '{}': {e}", self.endpoint))
        })?;
        let host = url.host_str().ok_or_else(|| {
            PaapiError::Configuration(format!("endpoint '{}' has no host", self.endpoint))
        })?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Full URL for an API path such as `/paapi5/searchitems`.
    pub(crate) fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }
}

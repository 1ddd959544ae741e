//! Paginated fetching under an unreliable, rate-limited upstream.
//!
//! Each page moves through `Pending → Requesting → {Success, RateLimited, Failed}`.
//! Pages are fetched strictly one after another; a throttled or timed-out
//! page is retried in place after a fixed backoff until the attempt ceiling
//! is reached, at which point the whole fetch fails.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Sleeper;
use crate::config::RetryPolicy;
use crate::error::{PaapiError, Result};

/// One page of upstream results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Whether the upstream declares further pages.
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    /// A page that ends the result set.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, false)
    }
}

/// Remote endpoint that can be asked for a numbered page.
///
/// Implementations must sign every call afresh: the fetcher calls
/// `fetch_page` again for the same page number when retrying.
pub trait PageSource: Sync {
    type Item: Send;

    fn fetch_page(&self, page: u32) -> impl Future<Output = Result<Page<Self::Item>>> + Send;
}

enum PageState<T> {
    Pending,
    Requesting,
    Success(Page<T>),
    RateLimited(PaapiError),
    Failed(PaapiError),
}

struct PageFetchState<T> {
    page_number: u32,
    accumulated: Vec<T>,
    target_count: usize,
    attempts_on_current_page: u32,
}

/// Drives a [`PageSource`] until enough items are gathered or pages run out.
pub struct PaginatedFetcher<'a, S> {
    source: &'a S,
    sleeper: &'a dyn Sleeper,
    policy: &'a RetryPolicy,
    cancel: CancellationToken,
}

impl<'a, S: PageSource> PaginatedFetcher<'a, S> {
    pub fn new(source: &'a S, sleeper: &'a dyn Sleeper, policy: &'a RetryPolicy) -> Self {
        Self {
            source,
            sleeper,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts the in-flight call or pause as soon as `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetches up to `target_count` items that pass `filter`, in page order.
    ///
    /// # Errors
    ///
    /// Non-retryable upstream errors fail immediately. A page that is still
    /// throttled after `max_attempts` attempts fails with
    /// [`PaapiError::Upstream`] coded `RetriesExhausted`. Partial results are
    /// discarded on failure.
    pub async fn fetch<F>(&self, target_count: usize, filter: F) -> Result<Vec<S::Item>>
    where
        F: Fn(&S::Item) -> bool,
    {
        let mut state = PageFetchState {
            page_number: 1,
            accumulated: Vec::new(),
            target_count,
            attempts_on_current_page: 0,
        };
        if target_count == 0 {
            return Ok(state.accumulated);
        }

        let mut phase = PageState::Pending;
        loop {
            phase = match phase {
                PageState::Pending => {
                    state.attempts_on_current_page = 0;
                    PageState::Requesting
                }
                PageState::Requesting => {
                    state.attempts_on_current_page += 1;
                    debug!(
                        page = state.page_number,
                        attempt = state.attempts_on_current_page,
                        "requesting page"
                    );
                    match self.request(state.page_number).await {
                        Ok(page) => PageState::Success(page),
                        Err(e) if e.is_retryable() => PageState::RateLimited(e),
                        Err(e) => PageState::Failed(e),
                    }
                }
                PageState::Success(page) => {
                    let exhausted = page.items.is_empty() || !page.has_more;
                    let fetched = page.items.len();
                    state
                        .accumulated
                        .extend(page.items.into_iter().filter(|item| filter(item)));
                    debug!(
                        page = state.page_number,
                        fetched,
                        accumulated = state.accumulated.len(),
                        target = state.target_count,
                        "page fetched"
                    );
                    if state.accumulated.len() >= state.target_count || exhausted {
                        break;
                    }
                    state.page_number += 1;
                    match self.pause(self.policy.inter_page_delay).await {
                        Ok(()) => PageState::Pending,
                        Err(e) => PageState::Failed(e),
                    }
                }
                PageState::RateLimited(err) => {
                    if state.attempts_on_current_page < self.policy.max_attempts {
                        warn!(
                            page = state.page_number,
                            attempt = state.attempts_on_current_page,
                            max_attempts = self.policy.max_attempts,
                            error = %err,
                            "page throttled, backing off"
                        );
                        match self.pause(self.policy.backoff).await {
                            Ok(()) => PageState::Requesting,
                            Err(e) => PageState::Failed(e),
                        }
                    } else {
                        PageState::Failed(PaapiError::exhausted(
                            state.page_number,
                            state.attempts_on_current_page,
                            &err,
                        ))
                    }
                }
                PageState::Failed(err) => {
                    warn!(page = state.page_number, error = %err, "fetch failed");
                    return Err(err);
                }
            };
        }

        state.accumulated.truncate(state.target_count);
        Ok(state.accumulated)
    }

    async fn request(&self, page: u32) -> Result<Page<S::Item>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PaapiError::Cancelled),
            result = self.source.fetch_page(page) => result,
        }
    }

    async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PaapiError::Cancelled),
            _ = self.sleeper.sleep(duration) => Ok(()),
        }
    }
}

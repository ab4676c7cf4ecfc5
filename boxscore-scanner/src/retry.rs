use crate::config::ScannerConfig;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::result::{FetchRequest, FetchResponse};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff schedule: `base`, `2 * base`, `4 * base`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay())
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ScannerConfig::default())
    }
}

pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs the request, retrying transport failures (network errors and
    /// timeouts) at most `max_retries` extra times. HTTP errors and rate limits
    /// come back on the first occurrence.
    pub async fn fetch_with_retry(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut retry = 0;
        loop {
            match self.inner.fetch(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retry < self.policy.max_retries => {
                    let delay = self.policy.delay_for(retry);
                    retry += 1;
                    warn!(
                        url = request.url(),
                        attempt = retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient fetch failure, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(url = request.url(), error = %e, retries = retry, "Giving up on request");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.fetch_with_retry(request).await
    }
}

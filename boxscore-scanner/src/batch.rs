use crate::config::ScannerConfig;
use crate::fetch::Fetcher;
use crate::result::{BatchScrapeResult, FetchRequest, PingResult, ScrapeResult};
use crate::retry::RetryingFetcher;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const PING_TIMEOUT_MS: u64 = 5_000;

/// Per-batch overrides; anything left `None` falls back to the scraper's defaults.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub headers: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
}

pub struct BatchScraper<F> {
    fetcher: Arc<RetryingFetcher<F>>,
    max_concurrency: usize,
}

impl<F: Fetcher + 'static> BatchScraper<F> {
    pub fn new(fetcher: Arc<RetryingFetcher<F>>, config: &ScannerConfig) -> Self {
        Self {
            fetcher,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Fetches every URL with retry under a bounded pool. Failures are recorded
    /// per URL and never abort the batch; results keep the input order.
    pub async fn scrape_batch(&self, urls: &[String], options: &BatchOptions) -> BatchScrapeResult {
        let start = Instant::now();
        let concurrency = options.concurrency.unwrap_or(self.max_concurrency).max(1);
        info!("Scraping {} URLs with {} workers", urls.len(), concurrency);

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let fetcher = self.fetcher.clone();
            let semaphore = semaphore.clone();
            let url = url.clone();
            let headers = options.headers.clone();
            let timeout_ms = options.timeout_ms;

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return ScrapeResult::with_error(url, e.to_string()),
                };

                let mut request = match FetchRequest::new(&url) {
                    Ok(request) => request.with_headers(&headers),
                    Err(e) => return ScrapeResult::with_error(url, e.to_string()),
                };
                if let Some(timeout_ms) = timeout_ms {
                    request = request.with_timeout_ms(timeout_ms);
                }

                match fetcher.fetch_with_retry(&request).await {
                    Ok(response) => ScrapeResult::success(url, response),
                    Err(e) => {
                        warn!("Scrape error for {}: {}", url, e);
                        ScrapeResult::with_error(url, e.to_string())
                    }
                }
            }));
        }

        let results: Vec<ScrapeResult> = join_all(handles)
            .await
            .into_iter()
            .zip(urls)
            .map(|(joined, url)| {
                joined.unwrap_or_else(|e| {
                    ScrapeResult::with_error(url.clone(), format!("Worker task failed: {}", e))
                })
            })
            .collect();

        let batch = BatchScrapeResult::from_results(results, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete. {}/{} succeeded in {}ms",
            batch.success_count, batch.total_count, batch.duration_ms
        );
        batch
    }

    /// Single reachability probe without retry. Never fails at the call level.
    pub async fn ping(&self, url: &str) -> PingResult {
        let start = Instant::now();
        let outcome = match FetchRequest::new(url) {
            Ok(request) => {
                self.fetcher
                    .inner()
                    .fetch(&request.with_timeout_ms(PING_TIMEOUT_MS))
                    .await
            }
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(url, duration_ms, ok = outcome.is_ok(), "Ping finished");

        match outcome {
            Ok(response) => PingResult {
                url: url.to_string(),
                accessible: true,
                status_code: Some(response.status_code),
                duration_ms,
                error: None,
            },
            Err(crate::error::FetchError::Http { status_code, .. }) => PingResult {
                url: url.to_string(),
                accessible: false,
                status_code: Some(status_code),
                duration_ms,
                error: Some(format!("HTTP {}", status_code)),
            },
            Err(e @ crate::error::FetchError::RateLimit { .. }) => PingResult {
                url: url.to_string(),
                accessible: false,
                status_code: Some(429),
                duration_ms,
                error: Some(e.to_string()),
            },
            Err(e) => PingResult {
                url: url.to_string(),
                accessible: false,
                status_code: None,
                duration_ms,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, Result};
    use crate::fetch::HttpFetcher;
    use crate::result::FetchResponse;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn http_scraper() -> BatchScraper<HttpFetcher> {
        let config = ScannerConfig::default();
        let fetcher = HttpFetcher::new(&config).unwrap();
        let retrying = RetryingFetcher::new(fetcher, RetryPolicy::new(0, Duration::ZERO));
        BatchScraper::new(Arc::new(retrying), &config)
    }

    /// Test that failures are isolated and order follows the input
    #[tokio::test]
    async fn test_batch_preserves_order_and_isolates_failures() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fast"))
            .mount(&mock_server)
            .await;

        let urls = vec![
            format!("{}/slow", mock_server.uri()),
            format!("{}/missing", mock_server.uri()),
            "not a url".to_string(),
            format!("{}/fast", mock_server.uri()),
        ];

        let batch = http_scraper()
            .scrape_batch(&urls, &BatchOptions::default())
            .await;

        assert_eq!(batch.total_count, 4);
        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.failure_count, 2);
        assert_eq!(batch.success_count + batch.failure_count, batch.total_count);

        let order: Vec<&str> = batch.results.iter().map(|r| r.url.as_str()).collect();
        let expected: Vec<&str> = urls.iter().map(String::as_str).collect();
        assert_eq!(order, expected);

        assert_eq!(batch.results[0].response.as_ref().unwrap().body, "slow");
        assert!(batch.results[1].error.as_ref().unwrap().contains("404"));
        assert!(batch.results[2].response.is_none());
        assert_eq!(batch.results[3].response.as_ref().unwrap().body, "fast");
    }

    struct CountingFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Err(FetchError::Http {
                url: request.url().to_string(),
                status_code: 503,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let counting = CountingFetcher {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let retrying = Arc::new(RetryingFetcher::new(counting, RetryPolicy::default()));
        let scraper = BatchScraper::new(retrying.clone(), &ScannerConfig::default());

        let urls: Vec<String> = (0..12)
            .map(|i| format!("https://stats.test/team/{}", i))
            .collect();
        let options = BatchOptions {
            concurrency: Some(3),
            ..Default::default()
        };

        let batch = scraper.scrape_batch(&urls, &options).await;

        assert_eq!(batch.failure_count, 12);
        let peak = retrying.inner().peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {}", peak);
        assert!(peak >= 2, "workers never overlapped");
    }

    #[tokio::test]
    async fn test_ping_reports_instead_of_failing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/up"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let scraper = http_scraper();

        let up = scraper.ping(&format!("{}/up", mock_server.uri())).await;
        assert!(up.accessible);
        assert_eq!(up.status_code, Some(204));
        assert!(up.error.is_none());

        let down = scraper.ping(&format!("{}/down", mock_server.uri())).await;
        assert!(!down.accessible);
        assert_eq!(down.status_code, Some(503));

        let busy = scraper.ping(&format!("{}/busy", mock_server.uri())).await;
        assert!(!busy.accessible);
        assert_eq!(busy.status_code, Some(429));
        assert!(busy.error.is_some());

        let invalid = scraper.ping("nowhere").await;
        assert!(!invalid.accessible);
        assert!(invalid.status_code.is_none());
        assert!(invalid.error.is_some());
    }
}

use crate::config::ScannerConfig;
use crate::error::{FetchError, Result};
use crate::result::{FetchRequest, FetchResponse};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// One bounded HTTP retrieval. Implementations never retry on their own.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        (**self).fetch(request).await
    }
}

pub struct HttpFetcher {
    client: Client,
    no_redirect_client: Client,
    default_timeout_ms: u64,
}

impl HttpFetcher {
    pub fn new(config: &ScannerConfig) -> std::result::Result<Self, reqwest::Error> {
        Ok(Self {
            client: Self::build_client(config, reqwest::redirect::Policy::limited(10))?,
            no_redirect_client: Self::build_client(config, reqwest::redirect::Policy::none())?,
            default_timeout_ms: config.timeout_ms,
        })
    }

    fn build_client(
        config: &ScannerConfig,
        redirect: reqwest::redirect::Policy,
    ) -> std::result::Result<Client, reqwest::Error> {
        Client::builder()
            .user_agent(config.user_agent.as_str())
            .pool_max_idle_per_host(config.max_concurrency.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(redirect)
            .build()
    }

    async fn exchange(builder: RequestBuilder, url: &str, timeout_ms: u64) -> Result<FetchResponse> {
        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(url, timeout_ms, e))?;

        let status_code = response.status().as_u16();
        let headers = normalize_headers(response.headers());

        if status_code == 429 {
            let retry_after_ms = headers
                .get("retry-after")
                .and_then(|v| parse_retry_after(v, Utc::now()));
            return Err(FetchError::RateLimit {
                url: url.to_string(),
                retry_after_ms,
            });
        }
        if status_code >= 400 {
            return Err(FetchError::Http {
                url: url.to_string(),
                status_code,
            });
        }

        let final_url = response.url().to_string();
        let content_type = headers.get("content-type").cloned();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(url, timeout_ms, e))?;

        Ok(FetchResponse {
            url: url.to_string(),
            final_url,
            status_code,
            headers,
            body,
            content_type,
            fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.url();
        let timeout_ms = request.timeout_ms.unwrap_or(self.default_timeout_ms);
        let client = if request.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let mut builder = client.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(url, timeout_ms, "Fetching");

        // Dropping the exchange future on expiry aborts the in-flight request
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            Self::exchange(builder, url, timeout_ms),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_ms,
            }),
        }
    }
}

fn classify_transport_error(url: &str, timeout_ms: u64, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout_ms,
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            cause: error.to_string(),
        }
    }
}

fn normalize_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut normalized = HashMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        normalized
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    normalized
}

/// Parses a `Retry-After` value into milliseconds. Accepts delta-seconds and
/// HTTP-dates; dates in the past yield zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some((seconds * 1000.0).round() as u64);
        }
        return None;
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc) - now;
    Some(delta.num_milliseconds().max(0) as u64)
}

use crate::error::{FetchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// A single GET to perform. The URL is validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    url: String,
    pub headers: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
    pub follow_redirects: bool,
}

impl FetchRequest {
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(format!("{url}: not an absolute URL")));
        }

        Ok(Self {
            url: url.to_string(),
            headers: HashMap::new(),
            timeout_ms: None,
            follow_redirects: true,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: &HashMap<String, String>) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: String,
    pub content_type: Option<String>,
    pub fetched_at: String,
    pub duration_ms: u64,
}

impl FetchResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false)
    }
}

/// Outcome of one URL inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub url: String,
    pub success: bool,
    pub response: Option<FetchResponse>,
    pub error: Option<String>,
}

impl ScrapeResult {
    pub fn success(url: String, response: FetchResponse) -> Self {
        Self {
            url,
            success: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn with_error(url: String, error: String) -> Self {
        Self {
            url,
            success: false,
            response: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScrapeResult {
    pub results: Vec<ScrapeResult>,
    pub total_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub duration_ms: u64,
}

impl BatchScrapeResult {
    pub fn from_results(results: Vec<ScrapeResult>, duration_ms: u64) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            total_count: results.len(),
            failure_count: results.len() - success_count,
            success_count,
            results,
            duration_ms,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScrapeResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub url: String,
    pub accessible: bool,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_relative_url() {
        assert!(matches!(
            FetchRequest::new("/teams/2020"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            FetchRequest::new("mailto:someone@h.test"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_request_defaults() {
        let request = FetchRequest::new("https://h.test/teams").unwrap();
        assert!(request.follow_redirects);
        assert!(request.timeout_ms.is_none());
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_batch_counts() {
        let batch = BatchScrapeResult::from_results(
            vec![
                ScrapeResult::with_error("https://a.test/".into(), "boom".into()),
                ScrapeResult::with_error("https://b.test/".into(), "boom".into()),
            ],
            12,
        );
        assert_eq!(batch.total_count, 2);
        assert_eq!(batch.success_count, 0);
        assert_eq!(batch.failure_count, 2);
        assert_eq!(batch.failures().count(), 2);
    }
}

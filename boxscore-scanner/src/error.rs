use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("HTTP {status_code} from {url}")]
    Http { url: String, status_code: u16 },

    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Rate limited by {url}{}", .retry_after_ms.map(|ms| format!(" (retry after {ms}ms)")).unwrap_or_default())]
    RateLimit {
        url: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Network error for {url}: {cause}")]
    Network { url: String, cause: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Transport failures are worth another attempt; HTTP-level answers are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network { .. } | FetchError::Timeout { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Http { url, .. }
            | FetchError::Timeout { url, .. }
            | FetchError::RateLimit { url, .. }
            | FetchError::Network { url, .. } => url,
            FetchError::InvalidUrl(url) => url,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HtmlError {
    #[error("Failed to load HTML document: {0}")]
    Parser(String),

    #[error("Invalid selector: {selector}")]
    Selector { selector: String },
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_retryable() {
        let url = "https://h.test/".to_string();
        assert!(
            FetchError::Network {
                url: url.clone(),
                cause: "reset".into()
            }
            .is_retryable()
        );
        assert!(
            FetchError::Timeout {
                url: url.clone(),
                timeout_ms: 10
            }
            .is_retryable()
        );
        assert!(
            !FetchError::Http {
                url: url.clone(),
                status_code: 503
            }
            .is_retryable()
        );
        assert!(
            !FetchError::RateLimit {
                url: url.clone(),
                retry_after_ms: Some(2000)
            }
            .is_retryable()
        );
        assert!(!FetchError::InvalidUrl(url).is_retryable());
    }

    #[test]
    fn test_rate_limit_display_includes_hint() {
        let err = FetchError::RateLimit {
            url: "https://h.test/".into(),
            retry_after_ms: Some(2000),
        };
        assert_eq!(
            err.to_string(),
            "Rate limited by https://h.test/ (retry after 2000ms)"
        );
    }
}

pub mod batch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod html;
pub mod result;
pub mod retry;

pub use batch::{BatchOptions, BatchScraper};
pub use config::ScannerConfig;
pub use error::{FetchError, HtmlError};
pub use fetch::{Fetcher, HttpFetcher};
pub use result::{BatchScrapeResult, FetchRequest, FetchResponse, PingResult, ScrapeResult};
pub use retry::{RetryPolicy, RetryingFetcher};

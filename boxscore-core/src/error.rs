use boxscore_scanner::{FetchError, HtmlError};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to produce one entity's data. Recovered by the extractor.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Html(#[from] HtmlError),

    #[error("Response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response from {url} has nothing at JSON pointer {pointer}")]
    MissingPointer { url: String, pointer: String },

    #[error("{failed} of {total} pages failed, first error: {first_error}")]
    Batch {
        failed: usize,
        total: usize,
        first_error: String,
    },

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Invalid source definition: {0}")]
    InvalidDefinition(String),
}

/// Environment-level failure that stops the run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest at {} is not readable JSON: {source}", path.display())]
    ManifestFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Manifest at {} belongs to source '{found}', expected '{expected}'", path.display())]
    SourceMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Year {year} is outside the range {first}-{last} of source '{source_name}'")]
    YearOutOfRange {
        source_name: String,
        year: u16,
        first: u16,
        last: u16,
    },
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

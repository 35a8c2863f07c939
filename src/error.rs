//! Error taxonomy for dataset jobs and the processing cache.

use std::path::PathBuf;
use thiserror::Error;

/// Result type used by the tabulation core.
pub type TabulateResult<T> = Result<T, TabulateError>;

/// Everything that can end a single dataset job early.
///
/// None of these escape a worker: the pool converts them into a
/// [`crate::JobOutcome`] at the job boundary.
#[derive(Debug, Error)]
pub enum TabulateError {
    /// Malformed locator, unknown encoding name, unsupported format, bad filter regex.
    #[error("configuration error: {0}")]
    Config(String),

    /// None of the candidate encodings decoded the whole input.
    #[error("could not detect character encoding of {}", path.display())]
    EncodingDetection { path: PathBuf },

    /// A delimited-text record does not have as many fields as the header.
    #[error("line {line}: expected {expected} fields, found {found}")]
    FormatIntegrity { line: u64, expected: usize, found: usize },

    /// Cancellation was observed at a checkpoint.
    #[error("interrupted")]
    Interrupted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TabulateError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Failures of the content-addressed cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted line is not `IDENTIFIER HEXDIGEST`.
    #[error("malformed cache line {line} in {}", path.display())]
    Malformed { path: PathBuf, line: usize },

    /// Identifiers must be non-empty and must not contain line breaks.
    #[error("invalid cache identifier {0:?}")]
    InvalidIdentifier(String),
}

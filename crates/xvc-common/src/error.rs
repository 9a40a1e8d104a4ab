//! Error types for XVC

use thiserror::Error;

/// Result type alias for XVC operations
pub type Result<T> = std::result::Result<T, XvcError>;

/// Main error type for XVC
#[derive(Error, Debug)]
pub enum XvcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: status {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("State store error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sink error: {0}")]
    Sink(String),
}

impl XvcError {
    /// True for failure classes worth retrying at the transport layer.
    ///
    /// Network-level failures and server errors are transient; client
    /// errors and malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            XvcError::Network(_) => true,
            XvcError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

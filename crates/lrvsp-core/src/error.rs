//! Error types for the LRVSP daemon.

use thiserror::Error;

/// Result type alias using the daemon's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for LRVSP operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The per-item write unit could not be applied
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No extractor is registered for the file type
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// The extractor raised or could not run
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The extractor returned a value of the wrong shape
    #[error("Malformed extraction result: {0}")]
    MalformedExtraction(String),

    /// The downstream trigger exited unsuccessfully
    #[error("Downstream trigger error: {0}")]
    Downstream(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

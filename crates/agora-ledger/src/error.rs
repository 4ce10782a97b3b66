//! Error types for the feedback ledger.

use std::time::Duration;
use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ledger operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing request field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown node
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistence layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reserved. Same-key races are absorbed by the upsert and never surface.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request exceeded the configured deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Timeout(_) => "timeout",
            Error::Storage(_) | Error::Serialization(_) | Error::Config(_) | Error::Io(_) => {
                "storage_failure"
            }
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidArgument(_) => 400,
            Error::NotFound(_) => 404,
            Error::Timeout(_) => 408,
            Error::Conflict(_) => 409,
            _ => 500,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Storage(format!("storage task failed: {}", e))
    }
}

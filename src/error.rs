//! Error types for the message bus.

use thiserror::Error;

/// Main error type for bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Invalid stream name: {0:?}")]
    InvalidStreamName(String),

    #[error("Invalid offset: {0}")]
    InvalidOffset(i64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Stream is closed: {0}")]
    StreamClosed(String),

    #[error("Publish to {stream} failed: {reason}")]
    PublishFailed { stream: String, reason: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::Serialization(e.to_string())
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

//! Error types for the remote configuration store.

use thiserror::Error;

/// Configuration store errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The remote snapshot could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The fetched document is not a valid snapshot.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// I/O error on the local cache.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

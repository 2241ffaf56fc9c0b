//! Remote store error types.

use thiserror::Error;

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors that can occur talking to a remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RemoteError {
    /// True for failures that may succeed on retry (offline, 5xx, 429).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(RemoteError::Network("offline".into()).is_transient());
        assert!(RemoteError::Http { status: 503, message: String::new() }.is_transient());
        assert!(RemoteError::Http { status: 429, message: String::new() }.is_transient());
        assert!(!RemoteError::Http { status: 400, message: String::new() }.is_transient());
        assert!(!RemoteError::Auth("expired".into()).is_transient());
        assert!(!RemoteError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn http_display() {
        let err = RemoteError::Http { status: 500, message: "boom".into() };
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }
}

//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The email is empty after normalization.
    #[error("email must not be empty")]
    InvalidEmail,

    /// The expiration must be a positive number of days.
    #[error("expiration must be a positive number of days, got {0}")]
    InvalidExpiration(u32),

    /// An extra field collides with a field the ticket always carries.
    #[error("field '{0}' is reserved")]
    ReservedField(String),

    /// The signing secret is unusable.
    #[error("license secret must not be empty")]
    InvalidSecret,

    /// The ticket could not be produced.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// The blob is not a decodable ticket.
    #[error("malformed license blob: {0}")]
    MalformedBlob(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

//! Error types for the service layer.

use thiserror::Error;

/// Service-level errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The configuration file is unreadable or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file is not valid TOML.
    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required secret was not provided.
    #[error("missing secret: set {0}")]
    MissingSecret(&'static str),

    /// The service task is gone.
    #[error("service is not running")]
    ChannelClosed,

    #[error(transparent)]
    License(#[from] docflow_license::LicenseError),

    #[error(transparent)]
    Update(#[from] docflow_update::UpdateError),

    #[error(transparent)]
    Remote(#[from] docflow_remote::RemoteError),

    #[error(transparent)]
    Version(#[from] docflow_types::VersionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

//! Error types for the update pipeline.

use docflow_crypto::CryptoError;
use docflow_remote::RemoteError;
use thiserror::Error;

/// Result type for update operations.
pub type UpdateResult<T> = Result<T, UpdateError>;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("release signature invalid")]
    SignatureInvalid,

    #[error("invalid release key")]
    InvalidKey,

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("manifest.json missing from package")]
    ManifestMissing,

    #[error("manifest validation error: {0}")]
    ManifestInvalid(String),

    #[error("update requires app version {required} or newer, running {current}")]
    IncompatibleVersion { required: String, current: String },

    #[error("backup failed: {0}")]
    BackupFailed(String),

    #[error("failed to apply {path}: {reason}")]
    ApplyFailed { path: String, reason: String },

    #[error("another install is in progress")]
    InstallInProgress,

    #[error("no update history entry for version {0}")]
    HistoryNotFound(String),

    #[error("install failed: {cause}; previous files restored")]
    RolledBack { cause: Box<UpdateError> },

    #[error("install failed: {cause}; rollback also failed: {rollback}")]
    RollbackFailed {
        cause: Box<UpdateError>,
        rollback: Box<UpdateError>,
    },

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl UpdateError {
    /// True for failures caused by unverifiable or tampered data.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::SignatureInvalid
                | Self::DecryptionFailed(_)
                | Self::ManifestMissing
                | Self::ManifestInvalid(_)
        )
    }
}

impl From<tokio::task::JoinError> for UpdateError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

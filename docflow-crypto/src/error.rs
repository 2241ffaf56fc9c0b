use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrong key, wrong passphrase, or modified bytes.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Missing magic or truncated blob.
    #[error("invalid sealed data: {0}")]
    InvalidFormat(String),
}

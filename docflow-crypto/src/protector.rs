//! File protection service interface.
//!
//! Components that write or read protected files (the update fetcher, the
//! installer's sensitive-file handling, the package builder) depend on
//! `Arc<dyn FileProtector>` and never handle the passphrase themselves.

use crate::error::CryptoResult;
use crate::key::KdfParams;
use crate::sealed::{open, seal};
use zeroize::Zeroizing;

/// Encrypts and decrypts opaque file contents.
pub trait FileProtector: Send + Sync {
    /// Returns a protected form of `data`.
    fn protect(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Reverses [`FileProtector::protect`].
    fn unprotect(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Seals data with a passphrase-derived key.
pub struct PassphraseProtector {
    passphrase: Zeroizing<String>,
    params: KdfParams,
}

impl PassphraseProtector {
    /// Creates a protector using the default KDF parameters.
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self::with_params(passphrase, KdfParams::default())
    }

    /// Creates a protector with explicit KDF parameters for newly sealed data.
    pub fn with_params(passphrase: impl Into<String>, params: KdfParams) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
            params,
        }
    }
}

impl std::fmt::Debug for PassphraseProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseProtector")
            .field("passphrase", &"[REDACTED]")
            .field("params", &self.params)
            .finish()
    }
}

impl FileProtector for PassphraseProtector {
    fn protect(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        seal(&self.passphrase, data, &self.params)
    }

    fn unprotect(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        open(&self.passphrase, data)
    }
}

/// No-op protector for tests. Data passes through unchanged.
#[derive(Debug, Default)]
pub struct PassthroughProtector;

impl FileProtector for PassthroughProtector {
    fn protect(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn unprotect(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

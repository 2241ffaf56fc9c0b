//! PBKDF2-HMAC-SHA256 passphrase keys.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a derived key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a KDF salt in bytes.
pub const SALT_SIZE: usize = 16;

/// OWASP 2023 figure for PBKDF2-HMAC-SHA256.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Highest iteration count accepted from a sealed blob header.
pub const MAX_ITERATIONS: u32 = 10 * DEFAULT_ITERATIONS;

/// 256-bit ChaCha20 key, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Random per-blob KDF salt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt {
    bytes: [u8; SALT_SIZE],
}

impl Salt {
    /// Fresh salt from the OS RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Salt read back from a blob header.
    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self { bytes }
    }

    /// Raw salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.bytes
    }
}

/// PBKDF2 parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// PBKDF2-HMAC-SHA256 rounds.
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::with_iterations(DEFAULT_ITERATIONS)
    }
}

impl KdfParams {
    /// Low counts are only appropriate for tests.
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }
}

/// Fails on a zero iteration count or an empty passphrase.
pub fn derive_key(passphrase: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<DerivedKey> {
    if params.iterations == 0 {
        return Err(CryptoError::KeyDerivation(
            "iteration count must be positive".to_string(),
        ));
    }
    if passphrase.is_empty() {
        return Err(CryptoError::KeyDerivation("passphrase is empty".to_string()));
    }

    let mut out = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt.as_bytes(), params.iterations, &mut out);
    let key = DerivedKey::from_bytes(out);
    out.zeroize();
    Ok(key)
}

/// Random key, for callers that never derive from a passphrase.
pub fn generate_random_key() -> DerivedKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    DerivedKey::from_bytes(bytes)
}

//! Passphrase-sealed blobs.
//!
//! Layout: `MAGIC[4] | iterations:u32 LE | salt[16] | nonce[12] | ciphertext+tag`.
//! The iteration count is stored so blobs sealed under older parameters stay
//! readable after the default changes.

use crate::cipher::{decrypt, encrypt, NONCE_SIZE, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, KdfParams, Salt, MAX_ITERATIONS, SALT_SIZE};

/// Leading bytes of every sealed blob.
pub const SEALED_MAGIC: &[u8; 4] = b"DFS1";

/// Bytes before the ciphertext.
pub const SEALED_HEADER_SIZE: usize = KDF_HEADER_SIZE + NONCE_SIZE;

/// Magic, iteration count and salt; authenticated as associated data.
const KDF_HEADER_SIZE: usize = SEALED_MAGIC.len() + 4 + SALT_SIZE;

/// Seals `plaintext` under a key derived from `passphrase` with a fresh salt.
pub fn seal(passphrase: &str, plaintext: &[u8], params: &KdfParams) -> CryptoResult<Vec<u8>> {
    let salt = Salt::random();
    let key = derive_key(passphrase, &salt, params)?;

    let mut out = Vec::with_capacity(SEALED_HEADER_SIZE + plaintext.len() + TAG_SIZE);
    out.extend_from_slice(SEALED_MAGIC);
    out.extend_from_slice(&params.iterations.to_le_bytes());
    out.extend_from_slice(salt.as_bytes());
    let body = encrypt(&key, &out, plaintext)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Opens a blob produced by [`seal`].
pub fn open(passphrase: &str, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < SEALED_HEADER_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidFormat("data too short".to_string()));
    }
    let (magic, rest) = sealed.split_at(SEALED_MAGIC.len());
    if magic != SEALED_MAGIC {
        return Err(CryptoError::InvalidFormat("unknown header".to_string()));
    }

    let header = &sealed[..KDF_HEADER_SIZE];
    let (iterations, rest) = rest.split_at(4);
    let mut iter_bytes = [0u8; 4];
    iter_bytes.copy_from_slice(iterations);
    let iterations = u32::from_le_bytes(iter_bytes);
    if iterations > MAX_ITERATIONS {
        return Err(CryptoError::InvalidFormat(format!(
            "iteration count {iterations} exceeds {MAX_ITERATIONS}"
        )));
    }
    let params = KdfParams::with_iterations(iterations);

    let (salt_bytes, rest) = rest.split_at(SALT_SIZE);
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(salt_bytes);

    let key = derive_key(passphrase, &Salt::from_bytes(salt), &params)?;
    decrypt(&key, header, rest)
}

//! ChaCha20-Poly1305 with an authenticated header.
//!
//! The output is `nonce || ciphertext+tag`. The caller's header bytes are
//! passed as associated data, so a blob only opens together with the exact
//! header it was sealed under.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;

/// ChaCha20-Poly1305 nonce length.
pub const NONCE_SIZE: usize = 12;
/// Poly1305 tag length.
pub const TAG_SIZE: usize = 16;

/// Encrypts `plaintext` under a fresh random nonce, binding `header`.
pub fn encrypt(key: &DerivedKey, header: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = ChaCha20Poly1305::new(key.as_bytes().into())
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: header,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverses [`encrypt`]. Fails if the key, the header or any byte of `body` differs.
pub fn decrypt(key: &DerivedKey, header: &[u8], body: &[u8]) -> CryptoResult<Vec<u8>> {
    if body.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidFormat("ciphertext too short".to_string()));
    }
    let (nonce, ciphertext) = body.split_at(NONCE_SIZE);

    ChaCha20Poly1305::new(key.as_bytes().into())
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| CryptoError::Decryption("wrong passphrase or tampered data".to_string()))
}

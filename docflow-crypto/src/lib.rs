//! Encryption layer for docflow.
//!
//! Update artifacts, the remote configuration document and sensitive files
//! inside update packages are all sealed with a passphrase:
//!
//! - PBKDF2-HMAC-SHA256 derives a 256-bit key from the passphrase and a random salt
//! - ChaCha20-Poly1305 encrypts the payload and authenticates it with the header
//! - The salt, nonce and iteration count travel in the sealed blob's header
//!
//! Consumers hold an `Arc<dyn FileProtector>` and never see key material.

mod cipher;
mod error;
mod key;
mod protector;
mod sealed;

pub use cipher::{decrypt, encrypt, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    derive_key, generate_random_key, DerivedKey, KdfParams, Salt, DEFAULT_ITERATIONS, KEY_SIZE,
    MAX_ITERATIONS, SALT_SIZE,
};
pub use protector::{FileProtector, PassphraseProtector, PassthroughProtector};
pub use sealed::{open, seal, SEALED_HEADER_SIZE, SEALED_MAGIC};

//! Property-based tests for the crypto module.
//!
//! These tests verify security properties that must always hold:
//! - Encryption is reversible with the correct key
//! - Wrong keys and wrong passphrases fail decryption
//! - Tampering anywhere in a sealed blob is detected
//! - Oversized iteration counts are refused before key derivation

use docflow_crypto::{
    decrypt, encrypt, generate_random_key, open, seal, CryptoError, FileProtector, KdfParams,
    PassphraseProtector, MAX_ITERATIONS, SEALED_HEADER_SIZE,
};
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn plaintext_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

fn passphrase_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9!@#$%^&*()]{1,64}").unwrap()
}

/// Fast KDF params for testing
fn fast_kdf_params() -> KdfParams {
    KdfParams::with_iterations(4)
}

// =============================================================================
// ENCRYPTION PROPERTIES
// =============================================================================

mod encryption_properties {
    use super::*;

    proptest! {
        /// Encryption followed by decryption with the same key returns original plaintext
        #[test]
        fn roundtrip_preserves_data(plaintext in plaintext_strategy()) {
            let key = generate_random_key();
            let body = encrypt(&key, b"header", &plaintext).unwrap();
            prop_assert_eq!(decrypt(&key, b"header", &body).unwrap(), plaintext);
        }

        /// Decryption with a different key always fails
        #[test]
        fn wrong_key_fails(plaintext in plaintext_strategy()) {
            let body = encrypt(&generate_random_key(), b"", &plaintext).unwrap();
            prop_assert!(decrypt(&generate_random_key(), b"", &body).is_err());
        }
    }
}

// =============================================================================
// SEALED BLOB PROPERTIES
// =============================================================================

mod sealed_properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Sealing then opening with the same passphrase returns the plaintext
        #[test]
        fn seal_roundtrip(pass in passphrase_strategy(), plaintext in plaintext_strategy()) {
            let sealed = seal(&pass, &plaintext, &fast_kdf_params()).unwrap();
            prop_assert_eq!(open(&pass, &sealed).unwrap(), plaintext);
        }

        /// Flipping any byte after the magic is detected
        #[test]
        fn tampering_detected(plaintext in plaintext_strategy(), pos in any::<prop::sample::Index>(), bit in 0u8..8) {
            let mut sealed = seal("passphrase", &plaintext, &fast_kdf_params()).unwrap();
            // The iteration count has its own properties below
            let idx = 8 + pos.index(sealed.len() - 8);
            sealed[idx] ^= 1 << bit;
            prop_assert!(open("passphrase", &sealed).is_err());
        }

        /// An edited iteration count within bounds fails authentication
        #[test]
        fn edited_iteration_count_detected(plaintext in plaintext_strategy(), iterations in 1u32..=4096) {
            prop_assume!(iterations != 4);
            let mut sealed = seal("passphrase", &plaintext, &fast_kdf_params()).unwrap();
            sealed[4..8].copy_from_slice(&iterations.to_le_bytes());
            let is_decryption_error = matches!(open("passphrase", &sealed), Err(CryptoError::Decryption(_)));
            prop_assert!(is_decryption_error);
        }

        /// An iteration count above the ceiling is refused without deriving a key
        #[test]
        fn oversized_iteration_count_rejected(plaintext in plaintext_strategy(), iterations in (MAX_ITERATIONS + 1)..=u32::MAX) {
            let mut sealed = seal("passphrase", &plaintext, &fast_kdf_params()).unwrap();
            sealed[4..8].copy_from_slice(&iterations.to_le_bytes());
            let is_format_error = matches!(open("passphrase", &sealed), Err(CryptoError::InvalidFormat(_)));
            prop_assert!(is_format_error);
        }

        /// Flipping a bit in the top byte of the iteration count is caught by the ceiling
        #[test]
        fn iteration_high_byte_flip_rejected(plaintext in plaintext_strategy(), bit in 0u8..8) {
            let mut sealed = seal("passphrase", &plaintext, &fast_kdf_params()).unwrap();
            sealed[7] ^= 1 << bit;
            prop_assert!(open("passphrase", &sealed).is_err());
        }

        /// Two seals of the same plaintext never share salt or nonce
        #[test]
        fn seals_are_randomized(plaintext in plaintext_strategy()) {
            let a = seal("pw", &plaintext, &fast_kdf_params()).unwrap();
            let b = seal("pw", &plaintext, &fast_kdf_params()).unwrap();
            prop_assert_ne!(&a[8..SEALED_HEADER_SIZE], &b[8..SEALED_HEADER_SIZE]);
        }
    }
}

// =============================================================================
// PROTECTOR
// =============================================================================

#[test]
fn passphrase_protector_roundtrip() {
    let protector = PassphraseProtector::with_params("secret", fast_kdf_params());
    let protected = protector.protect(b"client list").unwrap();
    assert_ne!(protected, b"client list");
    assert_eq!(protector.unprotect(&protected).unwrap(), b"client list");
}

#[test]
fn passphrase_protector_debug_hides_passphrase() {
    let protector = PassphraseProtector::with_params("hunter2", fast_kdf_params());
    let debug = format!("{protector:?}");
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("REDACTED"));
}

#[test]
fn different_passphrases_do_not_interoperate() {
    let a = PassphraseProtector::with_params("alpha", fast_kdf_params());
    let b = PassphraseProtector::with_params("beta", fast_kdf_params());
    let protected = a.protect(b"data").unwrap();
    assert!(b.unprotect(&protected).is_err());
}

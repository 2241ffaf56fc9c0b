//! Ed25519 release signing.
//!
//! A release signature covers the artifact's checksum string (lowercase hex),
//! so the signature can be checked before any bytes are downloaded.

use crate::error::{UpdateError, UpdateResult};
use ed25519_dalek::{
    Signature as DalekSignature, Signer as _, SigningKey as DalekSigningKey, Verifier as _,
    VerifyingKey as DalekVerifyingKey,
};
use rand::rngs::OsRng;

/// Ed25519 signing key (secret). Held by the release publisher.
#[derive(Clone)]
pub struct SigningKey(DalekSigningKey);

/// Ed25519 verifying key (public). Shipped with the application.
#[derive(Clone)]
pub struct VerifyingKey(DalekVerifyingKey);

/// A keypair for signing and verification.
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generates a new random Ed25519 keypair.
    pub fn generate() -> Self {
        let signing = DalekSigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        Self {
            signing_key: SigningKey(signing),
            verifying_key: VerifyingKey(verifying),
        }
    }
}

impl SigningKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(DalekSigningKey::from_bytes(bytes))
    }

    /// Parses a 64-character hex secret key.
    pub fn from_hex(hex_key: &str) -> UpdateResult<Self> {
        Ok(Self::from_bytes(&decode_array(hex_key)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Signs a checksum, returning the hex signature.
    pub fn sign_checksum(&self, checksum: &str) -> String {
        hex::encode(self.0.sign(normalize(checksum).as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey([REDACTED])")
    }
}

impl VerifyingKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> UpdateResult<Self> {
        DalekVerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| UpdateError::InvalidKey)
    }

    /// Parses a 64-character hex public key.
    pub fn from_hex(hex_key: &str) -> UpdateResult<Self> {
        Self::from_bytes(&decode_array(hex_key)?)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Verifies a hex signature over a checksum.
    pub fn verify_checksum(&self, checksum: &str, signature_hex: &str) -> UpdateResult<()> {
        let bytes: [u8; 64] = hex::decode(signature_hex.trim())
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or(UpdateError::SignatureInvalid)?;
        self.0
            .verify(normalize(checksum).as_bytes(), &DalekSignature::from_bytes(&bytes))
            .map_err(|_| UpdateError::SignatureInvalid)
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", self.to_hex())
    }
}

fn normalize(checksum: &str) -> String {
    checksum.trim().to_ascii_lowercase()
}

fn decode_array(hex_key: &str) -> UpdateResult<[u8; 32]> {
    hex::decode(hex_key.trim())
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or(UpdateError::InvalidKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUM: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn sign_verify_roundtrip() {
        let kp = KeyPair::generate();
        let sig = kp.signing_key.sign_checksum(CHECKSUM);
        assert!(kp.verifying_key.verify_checksum(CHECKSUM, &sig).is_ok());
    }

    #[test]
    fn checksum_case_is_irrelevant() {
        let kp = KeyPair::generate();
        let sig = kp.signing_key.sign_checksum(&CHECKSUM.to_uppercase());
        assert!(kp.verifying_key.verify_checksum(CHECKSUM, &sig).is_ok());
    }

    #[test]
    fn cloned_key_signs_identically() {
        let kp = KeyPair::generate();
        let copy = kp.signing_key.clone();
        assert_eq!(copy.to_hex(), kp.signing_key.to_hex());
        assert_eq!(copy.sign_checksum(CHECKSUM), kp.signing_key.sign_checksum(CHECKSUM));
    }

    #[test]
    fn wrong_checksum_fails() {
        let kp = KeyPair::generate();
        let sig = kp.signing_key.sign_checksum(CHECKSUM);
        let other = CHECKSUM.replace('b', "c");
        assert!(matches!(
            kp.verifying_key.verify_checksum(&other, &sig),
            Err(UpdateError::SignatureInvalid)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();
        let sig = kp1.signing_key.sign_checksum(CHECKSUM);
        assert!(kp2.verifying_key.verify_checksum(CHECKSUM, &sig).is_err());
    }

    #[test]
    fn garbage_signature_fails() {
        let kp = KeyPair::generate();
        assert!(kp.verifying_key.verify_checksum(CHECKSUM, "zz").is_err());
        assert!(kp.verifying_key.verify_checksum(CHECKSUM, "abcd").is_err());
    }

    #[test]
    fn hex_roundtrip() {
        let kp = KeyPair::generate();
        let sk = SigningKey::from_hex(&kp.signing_key.to_hex()).unwrap();
        let vk = VerifyingKey::from_hex(&kp.verifying_key.to_hex()).unwrap();
        let sig = sk.sign_checksum(CHECKSUM);
        assert!(vk.verify_checksum(CHECKSUM, &sig).is_ok());
        assert!(matches!(VerifyingKey::from_hex("00"), Err(UpdateError::InvalidKey)));
    }

    #[test]
    fn debug_hides_secret() {
        let kp = KeyPair::generate();
        assert!(!format!("{:?}", kp.signing_key).contains(&kp.signing_key.to_hex()));
    }
}

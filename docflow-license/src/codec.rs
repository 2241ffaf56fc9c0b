//! Ticket issuing, decoding and signing.

use crate::error::{LicenseError, LicenseResult};
use crate::ticket::{canonical_json, normalize_email, LicenseTicket};
use base64::{engine::general_purpose::STANDARD, Engine};
use docflow_types::SECS_PER_DAY;
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::collections::BTreeMap;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Fields every ticket carries; extra fields may not use these names.
pub const RESERVED_FIELDS: [&str; 3] = ["email", "created_at", "expires_at"];

/// Encodes, decodes and signs license tickets with a shared secret.
#[derive(Clone)]
pub struct LicenseCodec {
    secret: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for LicenseCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseCodec")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl LicenseCodec {
    /// Creates a codec keyed by `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> LicenseResult<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(LicenseError::InvalidSecret);
        }
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
        })
    }

    /// Issues a ticket for `email` starting now.
    ///
    /// `expiration_days = None` issues a ticket that never expires.
    pub fn encode(
        &self,
        email: &str,
        expiration_days: Option<u32>,
        extra: &BTreeMap<String, Value>,
    ) -> LicenseResult<String> {
        self.encode_at(email, expiration_days, extra, chrono::Utc::now().timestamp())
    }

    /// Issues a ticket as if the current time were `now`.
    pub fn encode_at(
        &self,
        email: &str,
        expiration_days: Option<u32>,
        extra: &BTreeMap<String, Value>,
        now: i64,
    ) -> LicenseResult<String> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(LicenseError::InvalidEmail);
        }
        if let Some(key) = extra.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            return Err(LicenseError::ReservedField(key.clone()));
        }

        let expires_at = match expiration_days {
            None => Value::Null,
            Some(0) => return Err(LicenseError::InvalidExpiration(0)),
            Some(days) => json!(now + i64::from(days) * SECS_PER_DAY),
        };

        let mut payload = Map::new();
        payload.insert("email".to_string(), Value::String(email));
        payload.insert("created_at".to_string(), json!(now));
        payload.insert("expires_at".to_string(), expires_at);
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
        let payload = Value::Object(payload);

        let signature = self.sign(&payload)?;
        let wrapper = json!({ "data": payload, "signature": signature });
        let bytes = serde_json::to_vec(&wrapper)
            .map_err(|e| LicenseError::EncodingFailed(e.to_string()))?;
        let blob = STANDARD.encode(bytes);

        // A blob that will not decode must never leave this function.
        LicenseTicket::from_blob(&blob)
            .map_err(|e| LicenseError::EncodingFailed(format!("produced undecodable ticket: {e}")))?;

        Ok(blob)
    }

    /// Decodes a ticket without verifying it.
    pub fn decode(&self, blob: &str) -> LicenseResult<LicenseTicket> {
        LicenseTicket::from_blob(blob)
    }

    /// Computes the lowercase hex HMAC-SHA256 of the canonical form of `data`.
    pub fn sign(&self, data: &Value) -> LicenseResult<String> {
        let canonical = canonical_json(data)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| LicenseError::InvalidSecret)?;
        mac.update(canonical.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Returns true if the ticket's signature matches its payload.
    #[must_use]
    pub fn signature_matches(&self, ticket: &LicenseTicket) -> bool {
        self.sign(ticket.raw_data())
            .is_ok_and(|expected| expected == ticket.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> LicenseCodec {
        LicenseCodec::new(b"unit-test-secret").unwrap()
    }

    #[test]
    fn signature_is_lowercase_hex_sha256() {
        let sig = codec().sign(&json!({"email": "a@b.com"})).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn signature_ignores_key_order() {
        let a = codec().sign(&json!({"a": 1, "b": 2})).unwrap();
        let b = codec().sign(&json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_secrets_disagree() {
        let other = LicenseCodec::new(b"another-secret").unwrap();
        let data = json!({"email": "a@b.com"});
        assert_ne!(codec().sign(&data).unwrap(), other.sign(&data).unwrap());
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(matches!(LicenseCodec::new(b""), Err(LicenseError::InvalidSecret)));
    }

    #[test]
    fn debug_is_redacted() {
        assert!(!format!("{:?}", codec()).contains("unit-test-secret"));
    }
}

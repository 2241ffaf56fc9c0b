//! Ticket data model and canonical serialization.

use crate::error::{LicenseError, LicenseResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The signed payload of a license ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketData {
    /// Normalized (trimmed, lowercase) email the ticket is issued to.
    pub email: String,
    /// Issue time (seconds since epoch).
    pub created_at: i64,
    /// Expiry time (seconds since epoch), `None` for no expiry.
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Issuer-defined fields (`license_type`, `issuer`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A decoded, not yet verified, license ticket.
#[derive(Debug, Clone)]
pub struct LicenseTicket {
    data: TicketData,
    signature: String,
    /// `data` exactly as it appeared in the blob; the signature covers this.
    raw_data: Value,
}

impl LicenseTicket {
    /// Decodes a transport blob.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedBlob`] if the blob is not base64, not
    /// JSON, or lacks the `data`/`signature` keys.
    pub fn from_blob(blob: &str) -> LicenseResult<Self> {
        let bytes = STANDARD
            .decode(blob.trim())
            .map_err(|e| LicenseError::MalformedBlob(format!("invalid base64: {e}")))?;

        let wrapper: Value = serde_json::from_slice(&bytes)
            .map_err(|e| LicenseError::MalformedBlob(format!("invalid JSON: {e}")))?;

        let raw_data = wrapper
            .get("data")
            .filter(|d| d.is_object())
            .cloned()
            .ok_or_else(|| LicenseError::MalformedBlob("missing 'data' object".to_string()))?;

        let signature = wrapper
            .get("signature")
            .and_then(Value::as_str)
            .ok_or_else(|| LicenseError::MalformedBlob("missing 'signature'".to_string()))?
            .to_string();

        let data: TicketData = serde_json::from_value(raw_data.clone())
            .map_err(|e| LicenseError::MalformedBlob(format!("invalid ticket data: {e}")))?;

        Ok(Self {
            data,
            signature,
            raw_data,
        })
    }

    /// Returns the typed payload.
    #[must_use]
    pub fn data(&self) -> &TicketData {
        &self.data
    }

    /// Consumes the ticket, returning the typed payload.
    #[must_use]
    pub fn into_data(self) -> TicketData {
        self.data
    }

    /// Returns the hex signature carried by the blob.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns the payload exactly as it was signed.
    #[must_use]
    pub fn raw_data(&self) -> &Value {
        &self.raw_data
    }
}

/// Normalizes an email for comparison and storage keys.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Serializes `value` with object keys sorted at every depth and no whitespace.
///
/// Re-serializing the same value always yields identical bytes.
pub fn canonical_json(value: &Value) -> LicenseResult<String> {
    serde_json::to_string(&sorted(value))
        .map_err(|e| LicenseError::EncodingFailed(format!("canonical JSON: {e}")))
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

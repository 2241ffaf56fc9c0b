//! Shared test helpers for license tests.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use docflow_license::{LicenseCodec, LicenseVerifier};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fixed reference time: 2024-01-01T00:00:00Z.
pub const NOW: i64 = 1_704_067_200;

pub const DAY: i64 = 24 * 60 * 60;

pub fn test_codec() -> LicenseCodec {
    LicenseCodec::new(b"test-license-secret").unwrap()
}

pub fn test_verifier() -> LicenseVerifier {
    LicenseVerifier::new(test_codec())
}

pub fn no_extra() -> BTreeMap<String, Value> {
    BTreeMap::new()
}

pub fn pro_extra() -> BTreeMap<String, Value> {
    let mut extra = BTreeMap::new();
    extra.insert("license_type".to_string(), Value::from("pro"));
    extra.insert("issuer".to_string(), Value::from("admin@docflow.test"));
    extra
}

/// Decodes a blob into its JSON wrapper.
pub fn unwrap_blob(blob: &str) -> Value {
    serde_json::from_slice(&STANDARD.decode(blob).unwrap()).unwrap()
}

/// Re-encodes a JSON wrapper into a blob.
pub fn wrap_blob(wrapper: &Value) -> String {
    STANDARD.encode(serde_json::to_vec(wrapper).unwrap())
}

//! Local license cache.
//!
//! A JSON object mapping normalized email to ticket blob. At most one ticket
//! is kept per email; inserting a newer ticket replaces the old one.

use crate::error::{LicenseError, LicenseResult};
use crate::ticket::{normalize_email, LicenseTicket};
use crate::verifier::{LicenseVerifier, Verification, VerifyReason};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The on-disk license cache.
#[derive(Debug)]
pub struct LicenseStore {
    path: PathBuf,
    licenses: BTreeMap<String, String>,
}

impl LicenseStore {
    /// Opens the cache at `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> LicenseResult<Self> {
        let path = path.into();
        let licenses = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(LicenseError::Storage(e.to_string())),
        };
        Ok(Self { path, licenses })
    }

    /// Returns the cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores a ticket under the email it was issued to. Returns that email.
    ///
    /// The blob is decoded, not verified.
    pub fn insert(&mut self, blob: &str) -> LicenseResult<String> {
        let ticket = LicenseTicket::from_blob(blob)?;
        let email = normalize_email(&ticket.data().email);
        self.licenses.insert(email.clone(), blob.trim().to_string());
        Ok(email)
    }

    /// Returns the blob stored for `email`.
    #[must_use]
    pub fn get(&self, email: &str) -> Option<&str> {
        self.licenses.get(&normalize_email(email)).map(String::as_str)
    }

    /// Removes the ticket stored for `email`.
    pub fn remove(&mut self, email: &str) -> Option<String> {
        self.licenses.remove(&normalize_email(email))
    }

    /// Emails with a stored ticket, sorted.
    pub fn emails(&self) -> impl Iterator<Item = &str> {
        self.licenses.keys().map(String::as_str)
    }

    /// Number of stored tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.licenses.len()
    }

    /// True if no ticket is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty()
    }

    /// Persists the cache atomically.
    pub fn save(&self) -> LicenseResult<()> {
        docflow_types::write_json_atomic(&self.path, &self.licenses)
            .map_err(|e| LicenseError::Storage(e.to_string()))
    }

    /// Verifies the stored ticket for `email`.
    #[must_use]
    pub fn verify(&self, verifier: &LicenseVerifier, email: &str) -> Verification {
        match self.get(email) {
            Some(blob) => verifier.verify(email, blob),
            None => Verification::rejected(VerifyReason::NotFound),
        }
    }

    /// Imports `license_key` blobs from the remote `licences` section.
    ///
    /// Records whose ticket is issued to a different email than their key are
    /// skipped. Returns the number of entries added or changed.
    pub fn sync_remote(&mut self, licences: &BTreeMap<String, Value>) -> usize {
        let mut changed = 0;
        for (email, record) in licences {
            let Some(blob) = record.get("license_key").and_then(Value::as_str) else {
                continue;
            };
            let email = normalize_email(email);
            if self.licenses.get(&email).map(String::as_str) == Some(blob.trim()) {
                continue;
            }
            match LicenseTicket::from_blob(blob) {
                Ok(ticket) if normalize_email(&ticket.data().email) == email => {
                    self.licenses.insert(email.clone(), blob.trim().to_string());
                    debug!(email = %email, "imported remote license");
                    changed += 1;
                }
                Ok(_) => warn!(email = %email, "remote license issued to another email, skipped"),
                Err(e) => warn!(email = %email, error = %e, "remote license undecodable, skipped"),
            }
        }
        changed
    }
}

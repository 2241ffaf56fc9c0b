//! Shared fixtures for update tests.

#![allow(dead_code)]

use docflow_crypto::{CryptoResult, FileProtector, KdfParams, PassphraseProtector};
use docflow_types::Version;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const PASSPHRASE: &str = "update-passphrase";

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

/// Passphrase protector with a KDF cost suitable for tests.
pub fn fast_protector() -> PassphraseProtector {
    PassphraseProtector::with_params(PASSPHRASE, KdfParams::with_iterations(16))
}

/// Wraps a protector and counts unprotect calls.
pub struct CountingProtector<P> {
    pub inner: P,
    pub unprotect_calls: AtomicUsize,
}

impl<P> CountingProtector<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            unprotect_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.unprotect_calls.load(Ordering::SeqCst)
    }
}

impl<P: FileProtector> FileProtector for CountingProtector<P> {
    fn protect(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.inner.protect(data)
    }

    fn unprotect(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.unprotect_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.unprotect(data)
    }
}

/// Names of the entries in `dir`, sorted.
pub fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

//! Shared fixtures for service tests.

#![allow(dead_code)]

use docflow_crypto::{FileProtector, KdfParams, PassphraseProtector};
use docflow_license::LicenseCodec;
use docflow_remote::{MemoryStore, RemoteStore};
use docflow_service::{
    LicenseSection, NotificationKind, NotificationSink, RemoteSection, Secrets, ServiceConfig,
    ServiceEvent, ServiceHandle, UpdateSection, UpdateService,
};
use docflow_types::{ManualClock, Version};
use docflow_update::{sha256_hex, PackageBuilder};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use zeroize::Zeroizing;

pub const PASSPHRASE: &str = "service-passphrase";
pub const SECRET: &str = "license-secret";
pub const EMAIL: &str = "user@example.com";
/// 2024-01-01T00:00:00Z
pub const NOW: i64 = 1_704_067_200;
pub const CONFIG_FOLDER: &str = "config";
pub const CONFIG_FILE: &str = "config.json.enc";
pub const UPDATES_FOLDER: &str = "updates";

/// Records every notification shown.
#[derive(Default)]
pub struct RecordingSink {
    pub shown: Mutex<Vec<(String, String, NotificationKind)>>,
}

impl RecordingSink {
    pub fn titles_with(&self, kind: NotificationKind) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, k)| *k == kind)
            .map(|(title, _, _)| title.clone())
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn show_notification(&self, title: &str, message: &str, kind: NotificationKind, _duration_ms: u64) {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string(), kind));
    }
}

pub fn protector() -> PassphraseProtector {
    PassphraseProtector::with_params(PASSPHRASE, KdfParams::with_iterations(16))
}

pub fn ticket(email: &str, days: u32) -> String {
    LicenseCodec::new(SECRET)
        .unwrap()
        .encode_at(email, Some(days), &BTreeMap::new(), NOW)
        .unwrap()
}

pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub config: ServiceConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let app_root = dir.path().join("app");
        std::fs::create_dir_all(app_root.join("data")).unwrap();
        std::fs::write(app_root.join("data/clients.json"), b"clients v1").unwrap();

        let config = ServiceConfig {
            app_root,
            data_dir: dir.path().join("state"),
            current_version: "1.0.0".to_string(),
            check_interval_secs: 3600,
            remote: RemoteSection {
                api_base_url: "http://127.0.0.1:9".to_string(),
                config_folder: CONFIG_FOLDER.to_string(),
                config_file: CONFIG_FILE.to_string(),
                updates_folder: UPDATES_FOLDER.to_string(),
            },
            update: UpdateSection {
                critical_files: vec![PathBuf::from("data/clients.json")],
                retention_days: 30,
                release_public_key: None,
                kdf_iterations: 16,
            },
            license: LicenseSection {
                active_email: Some(EMAIL.to_string()),
                expiry_warning_days: 7,
            },
        };

        Self {
            dir,
            store: Arc::new(MemoryStore::new()),
            sink: Arc::new(RecordingSink::default()),
            clock: Arc::new(ManualClock::new(NOW)),
            config,
        }
    }

    pub fn without_license(mut self) -> Self {
        self.config.license.active_email = None;
        self
    }

    pub fn secrets() -> Secrets {
        Secrets {
            license_secret: Some(Zeroizing::new(SECRET.to_string())),
            update_passphrase: Some(Zeroizing::new(PASSPHRASE.to_string())),
            access_token: None,
        }
    }

    pub fn app_file(&self, relative: &str) -> PathBuf {
        self.config.app_root.join(relative)
    }

    pub async fn publish_config(&self, document: &Value) {
        let sealed = protector().protect(&serde_json::to_vec(document).unwrap()).unwrap();
        let mut properties = BTreeMap::new();
        properties.insert("checksum".to_string(), sha256_hex(&sealed));
        self.store
            .put(CONFIG_FOLDER, CONFIG_FILE, sealed, properties)
            .await;
    }

    pub async fn publish_package(&self, version: &str, files: &[(&str, &[u8])]) {
        let mut builder = PackageBuilder::new(Version::parse(version).unwrap());
        for (path, data) in files {
            builder = builder.add_file(path, data.to_vec(), false);
        }
        let built = builder.build(&protector(), &protector()).unwrap();
        self.store
            .put(UPDATES_FOLDER, &built.file_name(), built.bytes.clone(), built.properties())
            .await;
    }

    pub fn spawn(&self) -> (ServiceHandle, mpsc::Receiver<ServiceEvent>) {
        self.spawn_with(self.store.clone())
    }

    pub fn spawn_with(&self, remote: Arc<dyn RemoteStore>) -> (ServiceHandle, mpsc::Receiver<ServiceEvent>) {
        UpdateService::new(
            &self.config,
            &Self::secrets(),
            remote,
            self.sink.clone(),
            self.clock.clone(),
        )
        .unwrap()
        .spawn()
    }
}

/// Receives events until one matches `pred`, failing after a few seconds.
pub async fn wait_for<F>(events: &mut mpsc::Receiver<ServiceEvent>, mut pred: F) -> ServiceEvent
where
    F: FnMut(&ServiceEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("service stopped unexpectedly");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Names of the entries in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

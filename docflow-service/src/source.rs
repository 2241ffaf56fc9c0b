//! Remote configuration document source.

use async_trait::async_trait;
use docflow_config::{ConfigError, ConfigResult, RemoteConfigSnapshot, SnapshotSource};
use docflow_update::UpdateFetcher;
use std::sync::Arc;

/// Reads the encrypted configuration document through the update fetcher,
/// which enforces its checksum property and decrypts it.
pub struct RemoteSnapshotSource {
    fetcher: Arc<UpdateFetcher>,
    folder: String,
    file_name: String,
}

impl RemoteSnapshotSource {
    pub fn new(fetcher: Arc<UpdateFetcher>, folder: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            fetcher,
            folder: folder.into(),
            file_name: file_name.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for RemoteSnapshotSource {
    async fn fetch_snapshot(&self) -> ConfigResult<RemoteConfigSnapshot> {
        let bytes = self
            .fetcher
            .fetch_artifact(&self.folder, &self.file_name)
            .await
            .map_err(|e| ConfigError::Fetch(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::InvalidSnapshot(e.to_string()))
    }
}

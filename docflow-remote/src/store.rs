//! Remote store abstraction.

use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::io::AsyncWrite;

/// Metadata about an artifact in a remote folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// The artifact's identifier in the store.
    pub id: String,
    /// The file name.
    pub name: String,
    /// Size in bytes (0 if unknown).
    pub size: u64,
    /// Last modified time.
    pub modified_at: DateTime<Utc>,
    /// Custom string properties attached to the artifact.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl RemoteFile {
    /// Returns a property by key.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Read access to a remote folder of artifacts.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the name of the provider.
    fn provider_name(&self) -> &'static str;

    /// Lists the files in `folder`, newest first.
    async fn list_files(&self, folder: &str) -> RemoteResult<Vec<RemoteFile>>;

    /// Streams a file's content into `writer`. Returns the number of bytes written.
    async fn download_to(
        &self,
        file_id: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> RemoteResult<u64>;

    /// Downloads a file's content into memory.
    async fn download(&self, file_id: &str) -> RemoteResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.download_to(file_id, &mut buf).await?;
        Ok(buf)
    }

    /// Finds the newest file named `name` in `folder`.
    async fn find_file(&self, folder: &str, name: &str) -> RemoteResult<RemoteFile> {
        self.list_files(folder)
            .await?
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| RemoteError::NotFound(format!("{folder}/{name}")))
    }
}

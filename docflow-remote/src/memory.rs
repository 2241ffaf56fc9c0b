//! In-memory remote store.
//!
//! Backs tests and local dry runs. Can be switched offline to simulate
//! network failures.

use crate::error::{RemoteError, RemoteResult};
use crate::store::{RemoteFile, RemoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    /// folder -> files
    folders: BTreeMap<String, Vec<RemoteFile>>,
    /// file id -> content
    contents: BTreeMap<String, Vec<u8>>,
    next_id: u64,
}

/// A remote store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
    downloads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file to `folder` and returns its metadata.
    pub async fn put(
        &self,
        folder: &str,
        name: &str,
        content: Vec<u8>,
        properties: BTreeMap<String, String>,
    ) -> RemoteFile {
        self.put_at(folder, name, content, properties, Utc::now()).await
    }

    /// Adds a file with an explicit modification time.
    pub async fn put_at(
        &self,
        folder: &str,
        name: &str,
        content: Vec<u8>,
        properties: BTreeMap<String, String>,
        modified_at: DateTime<Utc>,
    ) -> RemoteFile {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let file = RemoteFile {
            id: format!("mem-{}", inner.next_id),
            name: name.to_string(),
            size: content.len() as u64,
            modified_at,
            properties,
        };
        inner.contents.insert(file.id.clone(), content);
        inner
            .folders
            .entry(folder.to_string())
            .or_default()
            .push(file.clone());
        file
    }

    /// Replaces the content of an existing file, keeping its metadata.
    pub async fn replace_content(&self, file_id: &str, content: Vec<u8>) -> RemoteResult<()> {
        let mut inner = self.inner.write().await;
        match inner.contents.get_mut(file_id) {
            Some(existing) => {
                *existing = content;
                Ok(())
            }
            None => Err(RemoteError::NotFound(file_id.to_string())),
        }
    }

    /// Removes a file from every folder.
    pub async fn remove(&self, file_id: &str) {
        let mut inner = self.inner.write().await;
        inner.contents.remove(file_id);
        for files in inner.folders.values_mut() {
            files.retain(|f| f.id != file_id);
        }
    }

    /// Makes every subsequent call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of downloads started so far.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn provider_name(&self) -> &'static str {
        "Memory"
    }

    async fn list_files(&self, folder: &str) -> RemoteResult<Vec<RemoteFile>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut files = inner.folders.get(folder).cloned().unwrap_or_default();
        files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(files)
    }

    async fn download_to(
        &self,
        file_id: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> RemoteResult<u64> {
        self.check_online()?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let content = {
            let inner = self.inner.read().await;
            inner
                .contents
                .get(file_id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(file_id.to_string()))?
        };
        writer.write_all(&content).await?;
        writer.flush().await?;
        Ok(content.len() as u64)
    }
}

//! Google Drive backed remote store.
//!
//! Uses Drive API v3. Artifact properties are read from `appProperties`.

use crate::error::{RemoteError, RemoteResult};
use crate::store::{RemoteFile, RemoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Drive backend configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Base URL for the Drive API (e.g. `https://www.googleapis.com`).
    pub api_base_url: String,
    /// OAuth2 bearer token.
    #[serde(skip)]
    pub access_token: String,
    /// Deadline in seconds for metadata requests such as listings.
    pub timeout_secs: u64,
    /// Deadline in seconds for establishing a connection.
    pub connect_timeout_secs: u64,
    /// Longest stall in seconds between two reads. Downloads have no total
    /// deadline, only this one.
    pub read_timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com".to_string(),
            access_token: String::new(),
            timeout_secs: 60,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for DriveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveConfig")
            .field("api_base_url", &self.api_base_url)
            .field("access_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    size: Option<String>,
    #[serde(rename = "modifiedTime")]
    modified_time: Option<String>,
    #[serde(rename = "appProperties", default)]
    app_properties: BTreeMap<String, String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(file: DriveFile) -> Self {
        let size = file.size.and_then(|s| s.parse().ok()).unwrap_or(0);
        let modified_at = file
            .modified_time
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |dt| dt.with_timezone(&Utc));

        RemoteFile {
            id: file.id,
            name: file.name,
            size,
            modified_at,
            properties: file.app_properties,
        }
    }
}

/// Google Drive remote store.
pub struct DriveStore {
    config: DriveConfig,
    client: Client,
}

impl DriveStore {
    /// Creates a Drive store.
    pub fn new(config: DriveConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| RemoteError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.config.api_base_url)
    }

    fn ensure_token(&self) -> RemoteResult<&str> {
        if self.config.access_token.is_empty() {
            return Err(RemoteError::Auth("no access token configured".to_string()));
        }
        Ok(&self.config.access_token)
    }
}

/// Maps a non-success response onto a [`RemoteError`].
async fn check_status(response: Response, what: &str) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::Auth(format!("{what} rejected: {body}"))
        }
        StatusCode::NOT_FOUND => RemoteError::NotFound(what.to_string()),
        _ => RemoteError::Http {
            status: status.as_u16(),
            message: format!("{what} failed: {body}"),
        },
    })
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn provider_name(&self) -> &'static str {
        "Google Drive"
    }

    async fn list_files(&self, folder: &str) -> RemoteResult<Vec<RemoteFile>> {
        let access_token = self.ensure_token()?;
        let query = format!("'{folder}' in parents and trashed = false");

        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.files_url())
                .bearer_auth(access_token)
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .query(&[
                    ("q", query.as_str()),
                    (
                        "fields",
                        "nextPageToken,files(id,name,size,modifiedTime,appProperties)",
                    ),
                    ("orderBy", "modifiedTime desc"),
                    ("pageSize", "100"),
                ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| RemoteError::Network(format!("file list failed: {e}")))?;
            let response = check_status(response, "file list").await?;

            let file_list: DriveFileList = response
                .json()
                .await
                .map_err(|e| RemoteError::Network(format!("failed to parse file list: {e}")))?;

            all_files.extend(file_list.files.into_iter().map(RemoteFile::from));

            page_token = file_list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        // Newest first across pages.
        all_files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        debug!(folder, count = all_files.len(), "listed remote files");
        Ok(all_files)
    }

    async fn download_to(
        &self,
        file_id: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> RemoteResult<u64> {
        let access_token = self.ensure_token()?;

        let response = self
            .client
            .get(format!("{}/{file_id}", self.files_url()))
            .bearer_auth(access_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| RemoteError::Network(format!("download failed: {e}")))?;
        let mut response = check_status(response, &format!("file {file_id}")).await?;

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RemoteError::Network(format!("download interrupted: {e}")))?
        {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        debug!(file_id, bytes = written, "downloaded remote file");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_file_conversion() {
        let file = DriveFile {
            id: "f1".into(),
            name: "update_2.4.0.zip.enc".into(),
            size: Some("1024".into()),
            modified_time: Some("2024-03-01T10:00:00Z".into()),
            app_properties: BTreeMap::from([("version".to_string(), "2.4.0".to_string())]),
        };
        let remote = RemoteFile::from(file);
        assert_eq!(remote.size, 1024);
        assert_eq!(remote.modified_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(remote.property("version"), Some("2.4.0"));
    }

    #[test]
    fn drive_file_missing_fields() {
        let file = DriveFile {
            id: "f1".into(),
            name: "x".into(),
            size: Some("not a number".into()),
            modified_time: None,
            app_properties: BTreeMap::new(),
        };
        let remote = RemoteFile::from(file);
        assert_eq!(remote.size, 0);
        assert_eq!(remote.modified_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn debug_redacts_token() {
        let config = DriveConfig {
            access_token: "ya29.secret".into(),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("ya29"));
    }
}

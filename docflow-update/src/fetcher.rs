//! Update discovery, download and verification.
//!
//! Nothing here installs anything. A downloaded artifact is hashed before it
//! is decrypted, and only a decrypted, verified archive reaches the staging
//! directory.

use crate::checksum::{checksums_match, sha256_file, sha256_hex};
use crate::error::{UpdateError, UpdateResult};
use crate::package::{UpdatePackageMetadata, PROP_CHECKSUM};
use crate::signing::VerifyingKey;
use docflow_crypto::FileProtector;
use docflow_remote::RemoteStore;
use docflow_types::{write_atomic, Version};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Locates and downloads update artifacts from a remote folder.
pub struct UpdateFetcher {
    remote: Arc<dyn RemoteStore>,
    folder: String,
    staging_dir: PathBuf,
    protector: Arc<dyn FileProtector>,
    release_key: Option<VerifyingKey>,
}

impl UpdateFetcher {
    /// Creates a fetcher reading packages from `folder`, staging verified
    /// archives in `staging_dir`, decrypting with `protector`.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        folder: impl Into<String>,
        staging_dir: impl Into<PathBuf>,
        protector: Arc<dyn FileProtector>,
    ) -> Self {
        Self {
            remote,
            folder: folder.into(),
            staging_dir: staging_dir.into(),
            protector,
            release_key: None,
        }
    }

    /// Requires every package to carry a valid release signature.
    #[must_use]
    pub fn with_release_key(mut self, key: VerifyingKey) -> Self {
        self.release_key = Some(key);
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Returns the newest package strictly newer than `current`, if any.
    pub async fn check_for_updates(
        &self,
        current: &Version,
    ) -> UpdateResult<Option<UpdatePackageMetadata>> {
        let files = self.remote.list_files(&self.folder).await?;
        let listed = files.len();
        let newest = files
            .iter()
            .filter_map(UpdatePackageMetadata::from_remote)
            .filter(|meta| meta.version > *current)
            .max_by(|a, b| a.version.cmp(&b.version));

        match &newest {
            Some(meta) => info!(current = %current, available = %meta.version, "update available"),
            None => debug!(current = %current, listed, "no newer update"),
        }
        Ok(newest)
    }

    /// Checks the release signature of `meta` when a release key is configured.
    pub fn verify_release(&self, meta: &UpdatePackageMetadata) -> UpdateResult<()> {
        let Some(key) = &self.release_key else {
            return Ok(());
        };
        let signature = meta.signature.as_deref().ok_or_else(|| {
            warn!(version = %meta.version, "package is not signed");
            UpdateError::SignatureInvalid
        })?;
        key.verify_checksum(&meta.checksum, signature).inspect_err(|_| {
            warn!(version = %meta.version, "package signature rejected");
        })
    }

    /// Verifies, downloads and stages a discovered package.
    pub async fn download_package(&self, meta: &UpdatePackageMetadata) -> UpdateResult<PathBuf> {
        self.verify_release(meta)?;
        let name = format!("update_{}.zip", meta.version);
        self.fetch_to_staging(&meta.file_id, &meta.checksum, &name)
            .await
    }

    /// Downloads `file_id`, checks its SHA-256 against `expected_checksum`,
    /// decrypts it and moves it into the staging directory.
    ///
    /// On any failure no file is left behind. Dropping the returned future
    /// before completion removes the partial download.
    pub async fn download(&self, file_id: &str, expected_checksum: &str) -> UpdateResult<PathBuf> {
        let name = format!("{}.zip", sanitize_file_name(file_id));
        self.fetch_to_staging(file_id, expected_checksum, &name).await
    }

    async fn fetch_to_staging(
        &self,
        file_id: &str,
        expected_checksum: &str,
        staged_name: &str,
    ) -> UpdateResult<PathBuf> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let download = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&self.staging_dir)?;

        let mut writer = tokio::fs::File::from_std(download.as_file().try_clone()?);
        let size = self.remote.download_to(file_id, &mut writer).await?;
        drop(writer);
        debug!(file_id, bytes = size, "download complete, verifying");

        let protector = self.protector.clone();
        let expected = expected_checksum.to_string();
        let target = self.staging_dir.join(staged_name);
        let staged = tokio::task::spawn_blocking(move || {
            verify_and_stage(download, &expected, protector.as_ref(), &target)
        })
        .await??;

        info!(path = %staged.display(), "update staged");
        Ok(staged)
    }

    /// Downloads a small encrypted artifact (such as the remote configuration)
    /// by name and returns its decrypted bytes.
    ///
    /// If the artifact carries a `checksum` property it is enforced.
    pub async fn fetch_artifact(&self, folder: &str, name: &str) -> UpdateResult<Vec<u8>> {
        let file = self.remote.find_file(folder, name).await?;
        let sealed = self.remote.download(&file.id).await?;

        if let Some(expected) = file.property(PROP_CHECKSUM) {
            let actual = sha256_hex(&sealed);
            if !checksums_match(expected, &actual) {
                warn!(name, "artifact checksum mismatch");
                return Err(UpdateError::ChecksumMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let protector = self.protector.clone();
        tokio::task::spawn_blocking(move || {
            protector
                .unprotect(&sealed)
                .map_err(|e| UpdateError::DecryptionFailed(e.to_string()))
        })
        .await?
    }
}

/// Runs on a blocking thread. `download` is deleted when dropped, so every
/// early return cleans up.
fn verify_and_stage(
    download: NamedTempFile,
    expected: &str,
    protector: &dyn FileProtector,
    target: &Path,
) -> UpdateResult<PathBuf> {
    let actual = sha256_file(download.path())?;
    if !checksums_match(expected, &actual) {
        warn!(expected, actual = %actual, "download checksum mismatch");
        return Err(UpdateError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    let sealed = std::fs::read(download.path())?;
    drop(download);

    let archive = protector.unprotect(&sealed).map_err(|e| {
        warn!(error = %e, "download failed to decrypt");
        UpdateError::DecryptionFailed(e.to_string())
    })?;

    write_atomic(target, &archive)?;
    Ok(target.to_path_buf())
}

fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_file_name("abc-123_X"), "abc-123_X");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("a b/c"), "a_b_c");
    }
}

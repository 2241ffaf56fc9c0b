//! Critical-file backups.
//!
//! A backup directory holds a copy of every critical file that existed, under
//! `files/`, plus `backup_index.json` recording each critical path as present
//! (with its SHA-256) or absent. Restoring re-creates present files and
//! deletes files that were absent, reproducing the pre-install state.

use crate::checksum::{sha256_file, sha256_hex};
use crate::error::{UpdateError, UpdateResult};
use crate::manifest::safe_relative_path;
use chrono::{DateTime, Utc};
use docflow_types::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the index file inside a backup directory.
pub const BACKUP_INDEX: &str = "backup_index.json";

const FILES_DIR: &str = "files";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIndex {
    /// Label given at creation (usually the version about to be installed).
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BackupEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Path relative to the app root.
    pub path: String,
    /// SHA-256 of the saved copy; `None` if the file did not exist.
    pub sha256: Option<String>,
}

impl BackupEntry {
    pub fn present(&self) -> bool {
        self.sha256.is_some()
    }
}

/// Copies every critical file under `app_root` into a new directory inside
/// `backups_dir` and verifies the copies. Returns the backup directory.
pub fn create_backup(
    app_root: &Path,
    critical_files: &[PathBuf],
    backups_dir: &Path,
    label: &str,
    now: DateTime<Utc>,
) -> UpdateResult<PathBuf> {
    let backup_dir = create_backup_dir(backups_dir, label, now)
        .map_err(|e| UpdateError::BackupFailed(format!("cannot create backup directory: {e}")))?;

    let result = fill_backup(app_root, critical_files, &backup_dir, label, now)
        .and_then(|()| verify_backup(&backup_dir).map(|_| ()));
    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_dir_all(&backup_dir) {
            warn!(path = %backup_dir.display(), error = %cleanup, "failed to remove incomplete backup");
        }
        return Err(match e {
            UpdateError::BackupFailed(_) => e,
            other => UpdateError::BackupFailed(other.to_string()),
        });
    }

    info!(path = %backup_dir.display(), files = critical_files.len(), "backup created");
    Ok(backup_dir)
}

fn create_backup_dir(backups_dir: &Path, label: &str, now: DateTime<Utc>) -> std::io::Result<PathBuf> {
    fs::create_dir_all(backups_dir)?;
    let base = format!("backup_{}_{}", label, now.format("%Y%m%d_%H%M%S"));
    let mut candidate = backups_dir.join(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = backups_dir.join(format!("{base}_{n}"));
        n += 1;
    }
    fs::create_dir(&candidate)?;
    restrict_permissions(&candidate)?;
    Ok(candidate)
}

#[cfg(unix)]
fn restrict_permissions(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_permissions(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn fill_backup(
    app_root: &Path,
    critical_files: &[PathBuf],
    backup_dir: &Path,
    label: &str,
    now: DateTime<Utc>,
) -> UpdateResult<()> {
    let mut entries = Vec::with_capacity(critical_files.len());
    for relative in critical_files {
        let relative = safe_relative_path(&relative.to_string_lossy())
            .map_err(|e| UpdateError::BackupFailed(e.to_string()))?;
        let source = app_root.join(&relative);
        let path = relative.to_string_lossy().replace('\\', "/");

        let sha256 = match fs::read(&source) {
            Ok(data) => {
                let copy = backup_dir.join(FILES_DIR).join(&relative);
                write_atomic(&copy, &data)?;
                Some(sha256_hex(&data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(UpdateError::BackupFailed(format!("cannot read {path}: {e}")));
            }
        };
        debug!(path = %path, present = sha256.is_some(), "backed up critical file");
        entries.push(BackupEntry { path, sha256 });
    }

    let index = BackupIndex {
        label: label.to_string(),
        created_at: now,
        entries,
    };
    write_atomic(&backup_dir.join(BACKUP_INDEX), &serde_json::to_vec_pretty(&index)?)?;
    Ok(())
}

/// Reads the index and re-hashes every saved copy.
pub fn verify_backup(backup_dir: &Path) -> UpdateResult<BackupIndex> {
    let index = read_index(backup_dir)?;
    for entry in &index.entries {
        let Some(expected) = &entry.sha256 else {
            continue;
        };
        let copy = backup_dir.join(FILES_DIR).join(safe_relative_path(&entry.path)?);
        let actual = sha256_file(&copy)
            .map_err(|e| UpdateError::BackupFailed(format!("{} unreadable: {e}", entry.path)))?;
        if actual != *expected {
            return Err(UpdateError::BackupFailed(format!(
                "{} does not match its recorded hash",
                entry.path
            )));
        }
    }
    Ok(index)
}

pub fn read_index(backup_dir: &Path) -> UpdateResult<BackupIndex> {
    let bytes = fs::read(backup_dir.join(BACKUP_INDEX)).map_err(|e| {
        UpdateError::BackupFailed(format!("{}: {e}", backup_dir.display()))
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Restores every critical file recorded in the backup at `backup_dir`.
///
/// The backup is verified first; nothing is touched if verification fails.
/// Individual file failures do not stop the restore; the first one is
/// returned after every file has been attempted.
pub fn restore_backup(backup_dir: &Path, app_root: &Path) -> UpdateResult<()> {
    let index = verify_backup(backup_dir)?;
    let mut first_error = None;

    for entry in &index.entries {
        if let Err(e) = restore_entry(backup_dir, app_root, entry) {
            warn!(path = %entry.path, error = %e, "failed to restore file");
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        None => {
            info!(path = %backup_dir.display(), "backup restored");
            Ok(())
        }
        Some(e) => Err(e),
    }
}

fn restore_entry(backup_dir: &Path, app_root: &Path, entry: &BackupEntry) -> UpdateResult<()> {
    let relative = safe_relative_path(&entry.path)?;
    let target = app_root.join(&relative);
    if entry.present() {
        let data = fs::read(backup_dir.join(FILES_DIR).join(&relative))?;
        write_atomic(&target, &data)?;
    } else {
        match fs::remove_file(&target) {
            Ok(()) => debug!(path = %entry.path, "removed file absent before install"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

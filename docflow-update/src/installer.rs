//! Applies staged update packages with all-or-nothing semantics.
//!
//! ```text
//! Staged -> BackingUp -> Extracting -> Applying -> Committed
//!                             \            \
//!                              +------------+--> RollingBack -> RolledBack
//! ```

use crate::backup::{create_backup, read_index, restore_backup};
use crate::error::{UpdateError, UpdateResult};
use crate::history::{HistoryEntry, UpdateHistory};
use crate::manifest::{safe_relative_path, UpdateManifest, MANIFEST_ENTRY, PAYLOAD_PREFIX};
use chrono::{DateTime, Duration, Utc};
use docflow_crypto::FileProtector;
use docflow_types::{write_atomic, Clock, Version};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{debug, error, info, warn};

/// Installer state machine stages, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    BackingUp,
    Extracting,
    Applying,
    Committed,
    RollingBack,
    RolledBack,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BackingUp => "backing up",
            Self::Extracting => "extracting",
            Self::Applying => "applying",
            Self::Committed => "committed",
            Self::RollingBack => "rolling back",
            Self::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

/// Paths and settings the installer works with.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Root that manifest and critical-file paths are relative to.
    pub app_root: PathBuf,
    pub critical_files: Vec<PathBuf>,
    pub backups_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub history_path: PathBuf,
    pub current_version: Version,
}

/// Result of a committed install.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallReport {
    pub version: Version,
    pub backup_dir: PathBuf,
    pub files_applied: usize,
}

/// Result of a rollback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackReport {
    pub version: String,
    pub restored_from: PathBuf,
    /// Backup of the state that was replaced by the rollback.
    pub safety_backup: PathBuf,
}

/// Result of a housekeeping sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub backups_removed: usize,
    pub staged_removed: usize,
    pub history_pruned: usize,
    pub errors: usize,
}

/// Display-ready install result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    pub success: bool,
    pub message: String,
}

impl From<&UpdateResult<InstallReport>> for InstallOutcome {
    fn from(result: &UpdateResult<InstallReport>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                message: format!("Update {} installed", report.version),
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// Applies update packages. At most one install, rollback or cleanup runs at
/// a time per installer; callers share one instance.
pub struct UpdateInstaller {
    config: InstallerConfig,
    protector: Arc<dyn FileProtector>,
    clock: Arc<dyn Clock>,
    history: UpdateHistory,
    busy: Mutex<()>,
}

impl UpdateInstaller {
    pub fn new(
        config: InstallerConfig,
        protector: Arc<dyn FileProtector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let history = UpdateHistory::new(&config.history_path);
        Self {
            config,
            protector,
            clock,
            history,
            busy: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn history(&self) -> &UpdateHistory {
        &self.history
    }

    fn acquire(&self) -> UpdateResult<MutexGuard<'_, ()>> {
        match self.busy.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(UpdateError::InstallInProgress),
            // The guarded value is (); a panic elsewhere leaves nothing inconsistent.
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    /// Installs the staged package at `package_path`.
    ///
    /// Fails with [`UpdateError::InstallInProgress`] if another operation holds
    /// the installer. A failure after the backup was taken triggers a rollback
    /// and is reported as [`UpdateError::RolledBack`] or
    /// [`UpdateError::RollbackFailed`].
    pub fn install(&self, package_path: &Path) -> UpdateResult<InstallReport> {
        let _guard = self.acquire()?;
        let now = self.clock.now();

        stage(InstallStage::BackingUp);
        let label = package_label(package_path);
        let backup_dir = create_backup(
            &self.config.app_root,
            &self.config.critical_files,
            &self.config.backups_dir,
            &label,
            now,
        )?;

        match self.extract_and_apply(package_path) {
            Ok((version, files_applied)) => {
                stage(InstallStage::Committed);
                let entry = HistoryEntry {
                    version: version.to_string(),
                    date: now,
                    backup_dir: backup_dir.clone(),
                };
                if let Err(e) = self.history.append(entry) {
                    error!(error = %e, "update installed but history could not be written");
                }
                self.discard_staged(package_path);
                info!(version = %version, files = files_applied, "update installed");
                Ok(InstallReport {
                    version,
                    backup_dir,
                    files_applied,
                })
            }
            Err(cause) => {
                warn!(error = %cause, "install failed");
                stage(InstallStage::RollingBack);
                match restore_backup(&backup_dir, &self.config.app_root) {
                    Ok(()) => {
                        stage(InstallStage::RolledBack);
                        Err(UpdateError::RolledBack {
                            cause: Box::new(cause),
                        })
                    }
                    Err(rollback) => {
                        error!(
                            error = %rollback,
                            backup = %backup_dir.display(),
                            "rollback failed, critical files may be inconsistent"
                        );
                        Err(UpdateError::RollbackFailed {
                            cause: Box::new(cause),
                            rollback: Box::new(rollback),
                        })
                    }
                }
            }
        }
    }

    /// [`install`](Self::install) reduced to a display-ready outcome.
    pub fn install_outcome(&self, package_path: &Path) -> InstallOutcome {
        InstallOutcome::from(&self.install(package_path))
    }

    fn extract_and_apply(&self, package_path: &Path) -> UpdateResult<(Version, usize)> {
        stage(InstallStage::Extracting);
        fs::create_dir_all(&self.config.staging_dir)?;
        let workdir = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(&self.config.staging_dir)?;
        let manifest = extract_package(package_path, workdir.path())?;
        let version = manifest.parsed_version()?;
        manifest.check_compatible(&self.config.current_version)?;

        stage(InstallStage::Applying);
        for file in &manifest.files {
            self.apply_file(workdir.path(), &file.path, file.sensitive)
                .map_err(|e| match e {
                    UpdateError::ApplyFailed { .. } => e,
                    other => UpdateError::ApplyFailed {
                        path: file.path.clone(),
                        reason: other.to_string(),
                    },
                })?;
        }
        Ok((version, manifest.files.len()))
    }

    fn apply_file(&self, workdir: &Path, raw_path: &str, sensitive: bool) -> UpdateResult<()> {
        let relative = safe_relative_path(raw_path)?;
        let source = workdir.join(PAYLOAD_PREFIX).join(&relative);
        let data = fs::read(&source)?;
        let data = if sensitive {
            self.protector
                .unprotect(&data)
                .map_err(|e| UpdateError::DecryptionFailed(e.to_string()))?
        } else {
            data
        };
        write_atomic(&self.config.app_root.join(&relative), &data)?;
        debug!(path = raw_path, sensitive, "applied file");
        Ok(())
    }

    fn discard_staged(&self, package_path: &Path) {
        let in_staging = package_path
            .parent()
            .zip(fs::canonicalize(&self.config.staging_dir).ok())
            .and_then(|(parent, staging)| fs::canonicalize(parent).ok().map(|p| p == staging))
            .unwrap_or(false);
        if in_staging {
            if let Err(e) = fs::remove_file(package_path) {
                warn!(path = %package_path.display(), error = %e, "failed to remove staged package");
            }
        }
    }

    /// Restores the state saved before `version` was installed.
    ///
    /// The current critical files are backed up first, so a rollback can
    /// itself be undone.
    pub fn rollback_update(&self, version: &str) -> UpdateResult<RollbackReport> {
        let _guard = self.acquire()?;
        let entry = self
            .history
            .latest_for(version)?
            .ok_or_else(|| UpdateError::HistoryNotFound(version.to_string()))?;

        // Fail before touching anything if the target backup is gone.
        read_index(&entry.backup_dir)?;

        let safety_backup = create_backup(
            &self.config.app_root,
            &self.config.critical_files,
            &self.config.backups_dir,
            &format!("pre_rollback_{}", entry.version),
            self.clock.now(),
        )?;

        stage(InstallStage::RollingBack);
        restore_backup(&entry.backup_dir, &self.config.app_root)?;
        stage(InstallStage::RolledBack);
        info!(version = %entry.version, "rolled back update");

        Ok(RollbackReport {
            version: entry.version,
            restored_from: entry.backup_dir,
            safety_backup,
        })
    }

    /// Deletes backups and staged files older than `retention_days` and drops
    /// history entries from before the cutoff. Individual failures are logged
    /// and counted; the sweep always runs to the end.
    pub fn cleanup_old_updates(&self, retention_days: u32) -> UpdateResult<CleanupReport> {
        let _guard = self.acquire()?;
        let cutoff = self.clock.now() - Duration::days(i64::from(retention_days));
        let mut report = CleanupReport::default();

        for (path, is_dir) in list_dir(&self.config.backups_dir, &mut report) {
            if !is_dir {
                continue;
            }
            let created = read_index(&path)
                .map(|index| index.created_at)
                .ok()
                .or_else(|| modified_at(&path));
            if created.is_some_and(|t| t < cutoff) {
                match fs::remove_dir_all(&path) {
                    Ok(()) => report.backups_removed += 1,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to remove old backup");
                        report.errors += 1;
                    }
                }
            }
        }

        for (path, is_dir) in list_dir(&self.config.staging_dir, &mut report) {
            if modified_at(&path).is_some_and(|t| t < cutoff) {
                let removed = if is_dir {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                match removed {
                    Ok(()) => report.staged_removed += 1,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to remove staged file");
                        report.errors += 1;
                    }
                }
            }
        }

        match self.history.load() {
            Ok(entries) => {
                let before = entries.len();
                let kept: Vec<_> = entries.into_iter().filter(|e| e.date >= cutoff).collect();
                report.history_pruned = before - kept.len();
                if report.history_pruned > 0 {
                    if let Err(e) = self.history.save(&kept) {
                        warn!(error = %e, "failed to prune update history");
                        report.errors += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "update history unreadable, not pruned");
                report.errors += 1;
            }
        }

        info!(
            backups = report.backups_removed,
            staged = report.staged_removed,
            history = report.history_pruned,
            errors = report.errors,
            "cleanup finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for UpdateInstaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateInstaller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn stage(stage: InstallStage) {
    info!(stage = %stage, "install stage");
}

fn package_label(package_path: &Path) -> String {
    package_path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(|c: char| !c.is_ascii_alphanumeric() && c != '.', "_"))
        .unwrap_or_else(|| "update".to_string())
}

/// Unzips `package_path` into `dest` and returns its validated manifest.
///
/// Entries are extracted only through their enclosed name; the number of
/// payload files must equal the number of manifest entries, and every
/// manifest entry must be present.
fn extract_package(package_path: &Path, dest: &Path) -> UpdateResult<UpdateManifest> {
    let file = fs::File::open(package_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| UpdateError::ManifestInvalid(format!("not a package archive: {e}")))?;

    let mut manifest_bytes = None;
    let mut payload_count = 0usize;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(UpdateError::ManifestInvalid(format!(
                "unsafe archive entry: {}",
                entry.name()
            )));
        };
        if entry.is_dir() {
            continue;
        }

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;

        if relative.as_path() == Path::new(MANIFEST_ENTRY) {
            manifest_bytes = Some(data);
            continue;
        }
        if relative.starts_with(PAYLOAD_PREFIX.trim_end_matches('/')) {
            payload_count += 1;
        }
        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &data)?;
    }

    let manifest = UpdateManifest::from_slice(&manifest_bytes.ok_or(UpdateError::ManifestMissing)?)?;

    if payload_count != manifest.files.len() {
        return Err(UpdateError::ManifestInvalid(format!(
            "manifest lists {} files, archive holds {payload_count}",
            manifest.files.len()
        )));
    }
    for file in &manifest.files {
        let relative = safe_relative_path(&file.path)?;
        if !dest.join(PAYLOAD_PREFIX).join(&relative).is_file() {
            return Err(UpdateError::ManifestInvalid(format!(
                "{} listed but not in archive",
                file.path
            )));
        }
    }
    Ok(manifest)
}

fn list_dir(dir: &Path, report: &mut CleanupReport) -> Vec<(PathBuf, bool)> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| match entry {
                Ok(entry) => {
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    Some((entry.path(), is_dir))
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "unreadable directory entry");
                    report.errors += 1;
                    None
                }
            })
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot list directory");
            report.errors += 1;
            Vec::new()
        }
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

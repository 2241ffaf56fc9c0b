//! Persisted log of installed updates.

use crate::error::UpdateResult;
use chrono::{DateTime, Utc};
use docflow_types::{write_json_atomic, Version};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One installed update and the backup taken just before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub version: String,
    pub date: DateTime<Utc>,
    pub backup_dir: PathBuf,
}

impl HistoryEntry {
    /// True if this entry records `version`, comparing numerically when both parse.
    pub fn matches(&self, version: &str) -> bool {
        match (Version::parse(&self.version), Version::parse(version)) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.version.trim() == version.trim(),
        }
    }
}

/// The update history file: a JSON array of [`HistoryEntry`].
#[derive(Debug, Clone)]
pub struct UpdateHistory {
    path: PathBuf,
}

impl UpdateHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all entries, oldest first. A missing file is an empty history.
    pub fn load(&self) -> UpdateResult<Vec<HistoryEntry>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, entries: &[HistoryEntry]) -> UpdateResult<()> {
        write_json_atomic(&self.path, entries)?;
        Ok(())
    }

    pub fn append(&self, entry: HistoryEntry) -> UpdateResult<()> {
        let mut entries = self.load()?;
        entries.push(entry);
        self.save(&entries)
    }

    /// The most recent entry recording `version`.
    pub fn latest_for(&self, version: &str) -> UpdateResult<Option<HistoryEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|e| e.matches(version))
            .max_by_key(|e| e.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: &str, secs: i64, dir: &str) -> HistoryEntry {
        HistoryEntry {
            version: version.to_string(),
            date: DateTime::from_timestamp(secs, 0).unwrap(),
            backup_dir: PathBuf::from(dir),
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = UpdateHistory::new(dir.path().join("update_history.json"));
        assert!(history.load().unwrap().is_empty());
    }

    #[test]
    fn append_and_find_latest() {
        let dir = tempfile::tempdir().unwrap();
        let history = UpdateHistory::new(dir.path().join("update_history.json"));
        history.append(entry("2.4.0", 100, "a")).unwrap();
        history.append(entry("2.5.0", 200, "b")).unwrap();
        history.append(entry("2.4", 300, "c")).unwrap();

        let found = history.latest_for("2.4.0").unwrap().unwrap();
        assert_eq!(found.backup_dir, PathBuf::from("c"));
        assert!(history.latest_for("9.9").unwrap().is_none());
    }

    #[test]
    fn file_format_is_iso_dates() {
        let dir = tempfile::tempdir().unwrap();
        let history = UpdateHistory::new(dir.path().join("h.json"));
        history.append(entry("1.0", 1_700_000_000, "/b")).unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(history.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["date"], "2023-11-14T22:13:20Z");
        assert_eq!(raw[0]["version"], "1.0");
        assert_eq!(raw[0]["backup_dir"], "/b");
    }
}

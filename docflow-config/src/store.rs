//! The remote configuration store.

use crate::diff::diff_snapshots;
use crate::error::ConfigResult;
use crate::observer::ConfigObserver;
use crate::snapshot::{GlobalMessage, Notification, RemoteConfigSnapshot};
use async_trait::async_trait;
use docflow_types::{write_json_atomic, Clock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default minimum delay between two remote checks.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;

/// Fetches the latest remote snapshot.
///
/// Implementations own the network and credential layer.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> ConfigResult<RemoteConfigSnapshot>;
}

/// Local mirror of the remote configuration document.
pub struct RemoteConfigStore {
    cache_path: PathBuf,
    source: Arc<dyn SnapshotSource>,
    clock: Arc<dyn Clock>,
    check_interval_secs: u64,
    current: RemoteConfigSnapshot,
    last_check: Option<i64>,
    offline: bool,
    overrides: BTreeMap<String, bool>,
    observers: Vec<Arc<dyn ConfigObserver>>,
}

impl RemoteConfigStore {
    /// Creates a store with an empty current snapshot.
    ///
    /// Call [`load_local_cache`](Self::load_local_cache) to start from the
    /// persisted snapshot.
    pub fn new(
        cache_path: impl Into<PathBuf>,
        source: Arc<dyn SnapshotSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache_path: cache_path.into(),
            source,
            clock,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            current: RemoteConfigSnapshot::default(),
            last_check: None,
            offline: false,
            overrides: BTreeMap::new(),
            observers: Vec::new(),
        }
    }

    /// Sets the minimum delay between two non-forced checks.
    #[must_use]
    pub fn with_check_interval(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    /// Registers an observer for change signals.
    pub fn subscribe(&mut self, observer: Arc<dyn ConfigObserver>) {
        self.observers.push(observer);
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Loads the cache file into the current snapshot and returns it.
    ///
    /// A missing file yields an empty snapshot. A corrupt file is moved aside
    /// to `<name>.corrupt_<YYYYmmdd_HHMMSS>` and an empty snapshot is used.
    pub fn load_local_cache(&mut self) -> &RemoteConfigSnapshot {
        self.current = self.read_cache();
        &self.current
    }

    fn read_cache(&self) -> RemoteConfigSnapshot {
        let bytes = match std::fs::read(&self.cache_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.cache_path.display(), "no config cache yet");
                return RemoteConfigSnapshot::default();
            }
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "config cache unreadable");
                return RemoteConfigSnapshot::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "config cache corrupt");
                self.quarantine_cache();
                RemoteConfigSnapshot::default()
            }
        }
    }

    fn quarantine_cache(&self) {
        let stamp = self.clock.now().format("%Y%m%d_%H%M%S");
        let mut name = self.cache_path.as_os_str().to_owned();
        name.push(format!(".corrupt_{stamp}"));
        let aside = PathBuf::from(name);
        match std::fs::rename(&self.cache_path, &aside) {
            Ok(()) => info!(path = %aside.display(), "moved corrupt config cache aside"),
            Err(e) => error!(error = %e, "failed to move corrupt config cache aside"),
        }
    }

    /// Writes `snapshot` to the cache file atomically. Returns false on failure.
    pub fn save_local_cache(&self, snapshot: &RemoteConfigSnapshot) -> bool {
        match write_json_atomic(&self.cache_path, snapshot) {
            Ok(()) => true,
            Err(e) => {
                error!(path = %self.cache_path.display(), error = %e, "failed to save config cache");
                false
            }
        }
    }

    /// Fetches the remote snapshot and applies it if it differs from the
    /// current one. Returns true if the current snapshot was replaced.
    ///
    /// Non-forced calls within the check interval return false immediately.
    /// A fetch failure switches the store to offline mode.
    pub async fn check_for_updates(&mut self, force: bool) -> bool {
        let now = self.clock.unix_now();
        if !force && self.within_interval(now) {
            debug!("config check skipped, interval not elapsed");
            return false;
        }
        self.last_check = Some(now);

        let fetched = match self.source.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "remote config unavailable, staying offline");
                self.offline = true;
                return false;
            }
        };
        self.offline = false;

        if fetched == self.current {
            debug!("remote config unchanged");
            return false;
        }

        let diff = diff_snapshots(&self.current, &fetched);
        self.save_local_cache(&fetched);
        self.current = fetched;
        info!(
            version_bump = diff.version_bump.is_some(),
            message = diff.message.is_some(),
            features = diff.feature_changes.len(),
            "remote config updated"
        );

        for observer in &self.observers {
            if let Some(version) = &diff.version_bump {
                observer.on_update_available(version, &self.current);
            }
            if let Some(message) = &diff.message {
                observer.on_global_message(message);
            }
            for change in &diff.feature_changes {
                if !self.overrides.contains_key(&change.name) {
                    observer.on_feature_toggled(&change.name, change.enabled);
                }
            }
        }
        true
    }

    fn within_interval(&self, now: i64) -> bool {
        self.last_check.is_some_and(|last| {
            now.saturating_sub(last) < i64::try_from(self.check_interval_secs).unwrap_or(i64::MAX)
        })
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> &RemoteConfigSnapshot {
        &self.current
    }

    /// True if the last fetch failed.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Time of the last non-skipped check, in seconds since the epoch.
    pub fn last_check(&self) -> Option<i64> {
        self.last_check
    }

    /// Returns whether a feature is enabled. Local overrides win over the
    /// remote value; unknown features are disabled.
    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.overrides
            .get(name)
            .or_else(|| self.current.features.get(name))
            .copied()
            .unwrap_or(false)
    }

    pub fn set_local_override(&mut self, name: &str, enabled: bool) {
        self.overrides.insert(name.to_string(), enabled);
    }

    pub fn clear_local_override(&mut self, name: &str) -> Option<bool> {
        self.overrides.remove(name)
    }

    /// The global message, only while it is visible.
    pub fn global_message(&self) -> Option<&GlobalMessage> {
        let message = &self.current.global_message;
        message.visible.then_some(message)
    }

    /// Reads a setting by dotted key (`"editor.autosave"`), falling back to
    /// `default` if absent or of the wrong type.
    pub fn setting<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let mut parts = key.split('.');
        let Some(first) = parts.next() else {
            return default;
        };
        let mut node = self.current.settings.get(first);
        for part in parts {
            node = node.and_then(|v| v.get(part));
        }
        node.cloned()
            .and_then(|v: Value| serde_json::from_value(v).ok())
            .unwrap_or(default)
    }

    /// Notifications not yet marked read.
    pub fn pending_notifications(&self) -> Vec<&Notification> {
        self.current.notifications.iter().filter(|n| !n.read).collect()
    }
}

impl std::fmt::Debug for RemoteConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfigStore")
            .field("cache_path", &self.cache_path)
            .field("check_interval_secs", &self.check_interval_secs)
            .field("last_check", &self.last_check)
            .field("offline", &self.offline)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

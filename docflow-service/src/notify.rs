//! User-facing notifications.

use docflow_config::{ConfigObserver, GlobalMessage, RemoteConfigSnapshot};
use docflow_types::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// How long a notification stays on screen by default.
pub const DEFAULT_DURATION_MS: u64 = 5_000;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    /// Maps a remote `type` string; unknown values fall back to `Info`.
    pub fn from_remote(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "warning" | "warn" => Self::Warning,
            "error" | "danger" => Self::Error,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Displays notifications to the user.
///
/// Implementations must return quickly; they are called from the service task.
pub trait NotificationSink: Send + Sync {
    fn show_notification(&self, title: &str, message: &str, kind: NotificationKind, duration_ms: u64);
}

/// A sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn show_notification(&self, title: &str, message: &str, kind: NotificationKind, _duration_ms: u64) {
        match kind {
            NotificationKind::Error => error!(%title, "{message}"),
            NotificationKind::Warning => warn!(%title, "{message}"),
            NotificationKind::Info | NotificationKind::Success => info!(%title, "{message}"),
        }
    }
}

/// Forwards configuration signals to a [`NotificationSink`].
///
/// Update announcements are shown only for versions newer than the running one.
pub struct NotifyingObserver<S: ?Sized> {
    sink: std::sync::Arc<S>,
    current_version: Version,
}

impl<S: NotificationSink + ?Sized> NotifyingObserver<S> {
    pub fn new(sink: std::sync::Arc<S>, current_version: Version) -> Self {
        Self {
            sink,
            current_version,
        }
    }
}

impl<S: NotificationSink + ?Sized> ConfigObserver for NotifyingObserver<S> {
    fn on_update_available(&self, version: &Version, _snapshot: &RemoteConfigSnapshot) {
        if *version <= self.current_version {
            debug!(%version, current = %self.current_version, "Announced version is not newer");
            return;
        }
        self.sink.show_notification(
            "Update available",
            &format!("Version {version} is available (installed: {}).", self.current_version),
            NotificationKind::Info,
            DEFAULT_DURATION_MS,
        );
    }

    fn on_global_message(&self, message: &GlobalMessage) {
        self.sink.show_notification(
            &message.title,
            &message.message,
            NotificationKind::from_remote(&message.kind),
            DEFAULT_DURATION_MS * 2,
        );
    }

    fn on_feature_toggled(&self, name: &str, enabled: bool) {
        let state = if enabled { "enabled" } else { "disabled" };
        self.sink.show_notification(
            "Feature update",
            &format!("Feature '{name}' was {state}."),
            NotificationKind::Info,
            DEFAULT_DURATION_MS,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, NotificationKind)>>);

    impl NotificationSink for Recorder {
        fn show_notification(&self, title: &str, _message: &str, kind: NotificationKind, _duration_ms: u64) {
            self.0.lock().unwrap().push((title.to_string(), kind));
        }
    }

    fn observer(current: &str) -> (Arc<Recorder>, NotifyingObserver<Recorder>) {
        let sink = Arc::new(Recorder::default());
        let observer = NotifyingObserver::new(Arc::clone(&sink), Version::parse(current).unwrap());
        (sink, observer)
    }

    #[test]
    fn announces_only_newer_versions() {
        let (sink, observer) = observer("1.10.0");
        let snapshot = RemoteConfigSnapshot::default();

        observer.on_update_available(&Version::parse("1.9.0").unwrap(), &snapshot);
        observer.on_update_available(&Version::parse("1.10").unwrap(), &snapshot);
        assert!(sink.0.lock().unwrap().is_empty());

        observer.on_update_available(&Version::parse("1.10.1").unwrap(), &snapshot);
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![("Update available".to_string(), NotificationKind::Info)]
        );
    }

    #[test]
    fn global_message_keeps_remote_severity() {
        let (sink, observer) = observer("1.0.0");
        observer.on_global_message(&GlobalMessage {
            visible: true,
            title: "Maintenance".to_string(),
            message: "Tonight 22:00".to_string(),
            kind: "WARNING".to_string(),
            ..GlobalMessage::default()
        });
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![("Maintenance".to_string(), NotificationKind::Warning)]
        );
    }

    #[test]
    fn unknown_kind_is_info() {
        assert_eq!(NotificationKind::from_remote("banner"), NotificationKind::Info);
        assert_eq!(NotificationKind::from_remote("danger"), NotificationKind::Error);
    }
}

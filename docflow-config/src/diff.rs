//! Change detection between two snapshots.

use crate::snapshot::{GlobalMessage, RemoteConfigSnapshot};
use docflow_types::Version;
use std::collections::BTreeSet;
use tracing::warn;

/// A feature flag whose effective value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureChange {
    pub name: String,
    pub enabled: bool,
}

/// The signals raised by moving from one snapshot to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDiff {
    /// Set when `app.version` moved to a strictly newer version.
    pub version_bump: Option<Version>,
    /// Set when a message became visible, or its text changed while visible.
    pub message: Option<GlobalMessage>,
    pub feature_changes: Vec<FeatureChange>,
}

impl SnapshotDiff {
    /// True if no signal fired.
    pub fn is_empty(&self) -> bool {
        self.version_bump.is_none() && self.message.is_none() && self.feature_changes.is_empty()
    }
}

/// Computes the signals raised by replacing `old` with `new`.
pub fn diff_snapshots(old: &RemoteConfigSnapshot, new: &RemoteConfigSnapshot) -> SnapshotDiff {
    SnapshotDiff {
        version_bump: version_bump(old.app.version.as_deref(), new.app.version.as_deref()),
        message: message_change(&old.global_message, &new.global_message),
        feature_changes: feature_changes(old, new),
    }
}

fn version_bump(old: Option<&str>, new: Option<&str>) -> Option<Version> {
    let new_raw = new?;
    let new_version = match Version::parse(new_raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(version = new_raw, error = %e, "ignoring unparsable remote app version");
            return None;
        }
    };
    // An unreadable previous version counts as absent.
    match old.and_then(|v| Version::parse(v).ok()) {
        Some(old_version) if new_version <= old_version => None,
        _ => Some(new_version),
    }
}

fn message_change(old: &GlobalMessage, new: &GlobalMessage) -> Option<GlobalMessage> {
    if !new.visible {
        return None;
    }
    let changed = !old.visible || old.title != new.title || old.message != new.message;
    changed.then(|| new.clone())
}

fn feature_changes(old: &RemoteConfigSnapshot, new: &RemoteConfigSnapshot) -> Vec<FeatureChange> {
    let names: BTreeSet<&String> = old.features.keys().chain(new.features.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let before = old.features.get(name).copied().unwrap_or(false);
            let after = new.features.get(name).copied().unwrap_or(false);
            (before != after).then(|| FeatureChange {
                name: name.clone(),
                enabled: after,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_version(v: &str) -> RemoteConfigSnapshot {
        let mut s = RemoteConfigSnapshot::default();
        s.app.version = Some(v.to_string());
        s
    }

    fn with_message(visible: bool, title: &str, message: &str) -> RemoteConfigSnapshot {
        let mut s = RemoteConfigSnapshot::default();
        s.global_message = GlobalMessage {
            visible,
            title: title.to_string(),
            message: message.to_string(),
            ..Default::default()
        };
        s
    }

    // ── Version bump ────────────────────────────────────────────

    #[test]
    fn numeric_bump_detected() {
        let diff = diff_snapshots(&with_version("1.9.0"), &with_version("1.10.0"));
        assert_eq!(diff.version_bump, Some(Version::parse("1.10.0").unwrap()));
    }

    #[test]
    fn lexicographically_larger_but_older_is_not_a_bump() {
        let diff = diff_snapshots(&with_version("1.10.0"), &with_version("1.9.0"));
        assert!(diff.version_bump.is_none());
    }

    #[test]
    fn padded_equal_is_not_a_bump() {
        let diff = diff_snapshots(&with_version("2.0"), &with_version("2.0.0"));
        assert!(diff.is_empty());
    }

    #[test]
    fn first_version_is_a_bump() {
        let diff = diff_snapshots(&RemoteConfigSnapshot::default(), &with_version("1.0"));
        assert!(diff.version_bump.is_some());
    }

    #[test]
    fn unparsable_version_never_bumps() {
        let diff = diff_snapshots(&with_version("1.0"), &with_version("latest"));
        assert!(diff.version_bump.is_none());
    }

    // ── Global message ──────────────────────────────────────────

    #[test]
    fn message_becoming_visible_fires() {
        let diff = diff_snapshots(&with_message(false, "t", "m"), &with_message(true, "t", "m"));
        assert_eq!(diff.message.unwrap().title, "t");
    }

    #[test]
    fn message_text_change_while_visible_fires() {
        let diff = diff_snapshots(&with_message(true, "t", "a"), &with_message(true, "t", "b"));
        assert!(diff.message.is_some());
    }

    #[test]
    fn unchanged_or_hidden_message_is_silent() {
        assert!(diff_snapshots(&with_message(true, "t", "m"), &with_message(true, "t", "m")).message.is_none());
        assert!(diff_snapshots(&with_message(true, "t", "m"), &with_message(false, "x", "y")).message.is_none());
    }

    // ── Features ────────────────────────────────────────────────

    #[test]
    fn feature_toggles_reported_per_key() {
        let mut old = RemoteConfigSnapshot::default();
        old.features.insert("ai_chat".into(), true);
        old.features.insert("export".into(), false);
        old.features.insert("beta".into(), true);

        let mut new = RemoteConfigSnapshot::default();
        new.features.insert("ai_chat".into(), true);
        new.features.insert("export".into(), true);
        new.features.insert("templates".into(), true);

        let diff = diff_snapshots(&old, &new);
        assert_eq!(
            diff.feature_changes,
            vec![
                FeatureChange { name: "beta".into(), enabled: false },
                FeatureChange { name: "export".into(), enabled: true },
                FeatureChange { name: "templates".into(), enabled: true },
            ]
        );
    }

    #[test]
    fn absent_and_false_are_equivalent() {
        let mut new = RemoteConfigSnapshot::default();
        new.features.insert("export".into(), false);
        assert!(diff_snapshots(&RemoteConfigSnapshot::default(), &new).is_empty());
    }
}

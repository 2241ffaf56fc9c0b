//! Change callbacks.

use crate::snapshot::{GlobalMessage, RemoteConfigSnapshot};
use docflow_types::Version;

/// Receives the signals raised when a new snapshot replaces the current one.
///
/// All hooks default to no-ops so implementors override only what they need.
/// Hooks run synchronously inside the check and must not block.
pub trait ConfigObserver: Send + Sync {
    fn on_update_available(&self, _version: &Version, _snapshot: &RemoteConfigSnapshot) {}

    fn on_global_message(&self, _message: &GlobalMessage) {}

    fn on_feature_toggled(&self, _name: &str, _enabled: bool) {}
}

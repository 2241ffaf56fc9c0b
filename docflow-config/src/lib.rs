//! Local mirror of the remote configuration document.
//!
//! [`RemoteConfigStore`] keeps the current [`RemoteConfigSnapshot`], persists
//! it to a JSON cache, and on each successful fetch diffs the new snapshot
//! against the previous one to raise version, message and feature signals
//! through [`ConfigObserver`]s.

pub mod diff;
pub mod error;
pub mod observer;
pub mod snapshot;
pub mod store;

pub use diff::{diff_snapshots, FeatureChange, SnapshotDiff};
pub use error::{ConfigError, ConfigResult};
pub use observer::ConfigObserver;
pub use snapshot::{AppSection, GlobalMessage, Notification, RemoteConfigSnapshot};
pub use store::{RemoteConfigStore, SnapshotSource, DEFAULT_CHECK_INTERVAL_SECS};

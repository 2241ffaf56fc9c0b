//! The remote configuration document.
//!
//! Every section is optional in the JSON; missing sections deserialize to
//! their empty defaults. Unknown top-level sections are preserved.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One version of the remote configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfigSnapshot {
    pub app: AppSection,
    pub update: BTreeMap<String, Value>,
    pub features: BTreeMap<String, bool>,
    /// Remote license records keyed by email.
    pub licences: BTreeMap<String, Value>,
    pub global_message: GlobalMessage,
    pub notifications: Vec<Notification>,
    pub settings: BTreeMap<String, Value>,
    pub support: BTreeMap<String, Value>,
    pub changelog_full: Vec<Value>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl RemoteConfigSnapshot {
    /// True if no section carries any data.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The `app` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// Latest published application version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A banner message shown to every user while `visible` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalMessage {
    pub visible: bool,
    pub title: String,
    pub message: String,
    /// Severity (`info`, `warning`, `error`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A per-user notification entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub read: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

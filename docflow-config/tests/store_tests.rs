use async_trait::async_trait;
use docflow_config::{
    ConfigError, ConfigObserver, ConfigResult, GlobalMessage, RemoteConfigSnapshot,
    RemoteConfigStore, SnapshotSource,
};
use docflow_types::{ManualClock, Version};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const T0: i64 = 1_700_000_000;

/// Serves whatever snapshot it was last given, or fails while offline.
#[derive(Default)]
struct ScriptedSource {
    snapshot: Mutex<Option<RemoteConfigSnapshot>>,
    calls: Mutex<usize>,
}

impl ScriptedSource {
    fn serve(&self, doc: serde_json::Value) {
        *self.snapshot.lock().unwrap() = Some(serde_json::from_value(doc).unwrap());
    }

    fn go_offline(&self) {
        *self.snapshot.lock().unwrap() = None;
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch_snapshot(&self) -> ConfigResult<RemoteConfigSnapshot> {
        *self.calls.lock().unwrap() += 1;
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConfigError::Fetch("offline".into()))
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl ConfigObserver for Recorder {
    fn on_update_available(&self, version: &Version, _snapshot: &RemoteConfigSnapshot) {
        self.events.lock().unwrap().push(format!("update:{version}"));
    }

    fn on_global_message(&self, message: &GlobalMessage) {
        self.events.lock().unwrap().push(format!("message:{}", message.title));
    }

    fn on_feature_toggled(&self, name: &str, enabled: bool) {
        self.events.lock().unwrap().push(format!("feature:{name}={enabled}"));
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    cache: PathBuf,
    source: Arc<ScriptedSource>,
    clock: Arc<ManualClock>,
    recorder: Arc<Recorder>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("remote_config.json");
        Self {
            _dir: dir,
            cache,
            source: Arc::new(ScriptedSource::default()),
            clock: Arc::new(ManualClock::new(T0)),
            recorder: Arc::new(Recorder::default()),
        }
    }

    fn store(&self) -> RemoteConfigStore {
        let mut store =
            RemoteConfigStore::new(&self.cache, self.source.clone(), self.clock.clone())
                .with_check_interval(3600);
        store.subscribe(self.recorder.clone());
        store
    }
}

fn full_doc() -> serde_json::Value {
    json!({
        "app": {"version": "2.4.0"},
        "features": {"ai_chat": true, "export": false},
        "global_message": {"visible": true, "title": "Hello", "message": "Welcome", "type": "info"},
        "notifications": [
            {"id": "n1", "title": "Read", "message": "", "read": true},
            {"id": "n2", "title": "Unread", "message": ""}
        ],
        "settings": {"autosave_secs": 30, "editor": {"font": "Inter"}}
    })
}

// ── Local cache ─────────────────────────────────────────────────

#[test]
fn missing_cache_loads_empty() {
    let fx = Fixture::new();
    let mut store = fx.store();
    assert!(store.load_local_cache().is_empty());
}

#[test]
fn corrupt_cache_is_moved_aside() {
    let fx = Fixture::new();
    std::fs::write(&fx.cache, b"{ truncated").unwrap();

    let mut store = fx.store();
    assert!(store.load_local_cache().is_empty());
    assert!(!fx.cache.exists());

    let aside = fx.cache.with_file_name("remote_config.json.corrupt_20231114_221320");
    assert_eq!(std::fs::read(&aside).unwrap(), b"{ truncated");
}

#[test]
fn save_then_load_roundtrip() {
    let fx = Fixture::new();
    let store = fx.store();
    let snapshot: RemoteConfigSnapshot = serde_json::from_value(full_doc()).unwrap();
    assert!(store.save_local_cache(&snapshot));

    let mut reopened = fx.store();
    assert_eq!(reopened.load_local_cache(), &snapshot);
}

#[test]
fn cache_preserves_non_ascii_and_indents() {
    let fx = Fixture::new();
    let store = fx.store();
    let snapshot: RemoteConfigSnapshot = serde_json::from_value(json!({
        "global_message": {"visible": true, "title": "Mise à jour", "message": "Redémarrez"}
    }))
    .unwrap();
    assert!(store.save_local_cache(&snapshot));

    let text = std::fs::read_to_string(&fx.cache).unwrap();
    assert!(text.contains("Mise à jour"));
    assert!(text.contains("\n  \"app\""));
}

#[test]
fn save_failure_reports_false() {
    let fx = Fixture::new();
    // A directory where the cache file should be makes the rename fail.
    std::fs::create_dir_all(&fx.cache).unwrap();
    std::fs::write(fx.cache.join("occupant"), b"x").unwrap();
    assert!(!fx.store().save_local_cache(&RemoteConfigSnapshot::default()));
}

// ── Checking ────────────────────────────────────────────────────

#[tokio::test]
async fn first_check_applies_and_notifies() {
    let fx = Fixture::new();
    fx.source.serve(full_doc());
    let mut store = fx.store();

    assert!(store.check_for_updates(false).await);
    assert_eq!(
        fx.recorder.take(),
        vec!["update:2.4.0", "message:Hello", "feature:ai_chat=true"]
    );
    assert_eq!(store.snapshot().app.version.as_deref(), Some("2.4.0"));
    assert!(fx.cache.exists());
    assert_eq!(store.last_check(), Some(T0));
}

#[tokio::test]
async fn unchanged_remote_is_idempotent() {
    let fx = Fixture::new();
    fx.source.serve(full_doc());
    let mut store = fx.store();

    assert!(store.check_for_updates(true).await);
    fx.recorder.take();

    assert!(!store.check_for_updates(true).await);
    assert!(fx.recorder.take().is_empty());
}

#[tokio::test]
async fn interval_gates_unforced_checks() {
    let fx = Fixture::new();
    fx.source.serve(full_doc());
    let mut store = fx.store();

    assert!(store.check_for_updates(false).await);
    fx.clock.advance(3599);
    assert!(!store.check_for_updates(false).await);
    assert_eq!(fx.source.calls(), 1);

    fx.clock.advance(1);
    store.check_for_updates(false).await;
    assert_eq!(fx.source.calls(), 2);
}

#[tokio::test]
async fn force_bypasses_interval() {
    let fx = Fixture::new();
    fx.source.serve(full_doc());
    let mut store = fx.store();

    store.check_for_updates(false).await;
    store.check_for_updates(true).await;
    assert_eq!(fx.source.calls(), 2);
}

#[tokio::test]
async fn fetch_failure_goes_offline_and_still_advances_last_check() {
    let fx = Fixture::new();
    fx.source.go_offline();
    let mut store = fx.store();

    assert!(!store.check_for_updates(false).await);
    assert!(store.is_offline());
    assert_eq!(store.last_check(), Some(T0));

    // Backoff applies to failures too.
    fx.clock.advance(60);
    fx.source.serve(full_doc());
    assert!(!store.check_for_updates(false).await);
    assert_eq!(fx.source.calls(), 1);

    assert!(store.check_for_updates(true).await);
    assert!(!store.is_offline());
}

#[tokio::test]
async fn diffs_against_previous_snapshot() {
    let fx = Fixture::new();
    fx.source.serve(full_doc());
    let mut store = fx.store();
    store.check_for_updates(true).await;
    fx.recorder.take();

    let mut next = full_doc();
    next["app"]["version"] = json!("2.10.0");
    next["features"]["export"] = json!(true);
    next["global_message"]["visible"] = json!(false);
    fx.source.serve(next);
    assert!(store.check_for_updates(true).await);
    assert_eq!(fx.recorder.take(), vec!["update:2.10.0", "feature:export=true"]);

    // A lexicographically larger but numerically older version is not a bump.
    let mut older = full_doc();
    older["app"]["version"] = json!("2.9.0");
    older["features"]["export"] = json!(true);
    older["global_message"]["visible"] = json!(false);
    fx.source.serve(older);
    assert!(store.check_for_updates(true).await);
    assert!(fx.recorder.take().is_empty());
}

#[tokio::test]
async fn cached_snapshot_suppresses_repeat_signals() {
    let fx = Fixture::new();
    fx.source.serve(full_doc());
    {
        let mut store = fx.store();
        store.check_for_updates(true).await;
    }
    fx.recorder.take();

    let mut restarted = fx.store();
    restarted.load_local_cache();
    assert!(!restarted.check_for_updates(true).await);
    assert!(fx.recorder.take().is_empty());
}

// ── Accessors ───────────────────────────────────────────────────

#[tokio::test]
async fn accessors_read_current_snapshot() {
    let fx = Fixture::new();
    fx.source.serve(full_doc());
    let mut store = fx.store();
    store.check_for_updates(true).await;

    assert!(store.is_feature_enabled("ai_chat"));
    assert!(!store.is_feature_enabled("export"));
    assert!(!store.is_feature_enabled("unknown"));

    assert_eq!(store.global_message().unwrap().message, "Welcome");
    assert_eq!(store.setting("autosave_secs", 0u32), 30);
    assert_eq!(store.setting("editor.font", String::new()), "Inter");
    assert_eq!(store.setting("editor.missing", 7i64), 7);
    assert_eq!(store.setting("autosave_secs", "fallback".to_string()), "fallback");

    let pending = store.pending_notifications();
    let ids: Vec<_> = pending.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["n2"]);
}

#[test]
fn hidden_message_is_not_returned() {
    let fx = Fixture::new();
    let store = fx.store();
    assert!(store.global_message().is_none());
}

#[tokio::test]
async fn local_override_wins_and_silences_toggles() {
    let fx = Fixture::new();
    fx.source.serve(full_doc());
    let mut store = fx.store();
    store.set_local_override("ai_chat", false);
    store.check_for_updates(true).await;

    assert!(!store.is_feature_enabled("ai_chat"));
    assert!(!fx.recorder.take().iter().any(|e| e.starts_with("feature:ai_chat")));

    assert_eq!(store.clear_local_override("ai_chat"), Some(false));
    assert!(store.is_feature_enabled("ai_chat"));
}

//! `docflow config`

use super::remote_store;
use anyhow::{bail, Context, Result};
use docflow_config::RemoteConfigSnapshot;
use docflow_service::{
    build_config_store, build_fetcher, build_protector, LogSink, NotifyingObserver, Secrets,
    ServiceConfig,
};
use docflow_types::SystemClock;
use serde_json::Value;
use std::sync::Arc;

/// Fetches the remote configuration and refreshes the local cache.
pub async fn check(config: &ServiceConfig, secrets: &Secrets, force: bool) -> Result<String> {
    let remote = remote_store(config, secrets)?;
    let protector = build_protector(config, secrets)?;
    let fetcher = build_fetcher(config, remote, protector)?;

    let mut store = build_config_store(config, fetcher, Arc::new(SystemClock));
    store.load_local_cache();
    store.subscribe(Arc::new(NotifyingObserver::new(Arc::new(LogSink), config.version()?)));

    let updated = store.check_for_updates(force).await;
    if store.is_offline() {
        bail!(
            "remote configuration unavailable, cached copy kept at {}",
            store.cache_path().display()
        );
    }
    Ok(summary(store.snapshot(), updated))
}

/// Prints the cached snapshot, or the value at a dotted key.
pub fn show(config: &ServiceConfig, key: Option<&str>) -> Result<String> {
    let path = config.config_cache_path();
    let bytes = std::fs::read(&path)
        .with_context(|| format!("no cached configuration at {}", path.display()))?;
    let snapshot: RemoteConfigSnapshot =
        serde_json::from_slice(&bytes).context("cached configuration is corrupt")?;

    let value = serde_json::to_value(&snapshot)?;
    let selected = match key {
        Some(key) => lookup(&value, key)
            .with_context(|| format!("no key '{key}' in the cached configuration"))?,
        None => &value,
    };
    Ok(serde_json::to_string_pretty(selected)?)
}

fn lookup<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .try_fold(value, |current, part| current.get(part))
}

fn summary(snapshot: &RemoteConfigSnapshot, updated: bool) -> String {
    let enabled = snapshot.features.values().filter(|on| **on).count();
    let mut lines = vec![
        format!("updated:   {}", if updated { "yes" } else { "no" }),
        format!(
            "version:   {}",
            snapshot.app.version.as_deref().unwrap_or("(not announced)")
        ),
        format!("features:  {enabled}/{} enabled", snapshot.features.len()),
        format!("licences:  {}", snapshot.licences.len()),
    ];
    if snapshot.global_message.visible {
        lines.push(format!("message:   {}", snapshot.global_message.title));
    }
    lines.join("\n")
}

//! Subcommand implementations. Each returns the text to print.

pub mod config;
pub mod license;
pub mod run;
pub mod update;

use anyhow::{Context, Result};
use docflow_remote::{DriveConfig, DriveStore, RemoteStore};
use docflow_service::{Secrets, ServiceConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Loads the configuration file, or the defaults if it does not exist.
pub fn load_config(path: &Path) -> Result<ServiceConfig> {
    if path.exists() {
        ServiceConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
    } else {
        debug!(path = %path.display(), "No configuration file, using defaults");
        Ok(ServiceConfig::default())
    }
}

/// The Drive-backed remote store.
pub fn remote_store(config: &ServiceConfig, secrets: &Secrets) -> Result<Arc<dyn RemoteStore>> {
    let drive = DriveStore::new(DriveConfig {
        api_base_url: config.remote.api_base_url.clone(),
        access_token: secrets.access_token()?.to_string(),
        ..DriveConfig::default()
    })?;
    Ok(Arc::new(drive))
}

//! `docflow run`

use super::remote_store;
use anyhow::Result;
use docflow_service::{LogSink, Secrets, ServiceConfig, ServiceEvent, UpdateService};
use docflow_types::SystemClock;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the service until Ctrl-C.
pub async fn run(config: &ServiceConfig, secrets: &Secrets) -> Result<()> {
    let remote = remote_store(config, secrets)?;
    let service = UpdateService::new(config, secrets, remote, Arc::new(LogSink), Arc::new(SystemClock))?;
    let (handle, mut events) = service.spawn();
    info!("docflow service running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ServiceEvent::Stopped) | None => break,
                Some(event) => log_event(&event),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                handle.shutdown().await?;
            }
        }
    }
    Ok(())
}

fn log_event(event: &ServiceEvent) {
    match event {
        ServiceEvent::ConfigChecked { updated, offline } => {
            info!(updated, offline, "Configuration checked");
        }
        ServiceEvent::UpdateAvailable(meta) => {
            info!(version = %meta.version, size = meta.size, "Update available");
        }
        ServiceEvent::UpToDate => info!("No update available"),
        ServiceEvent::UpdateCheckFailed(reason) => warn!(%reason, "Update check failed"),
        ServiceEvent::LicenseChecked {
            email,
            verification,
            remaining_days,
        } => info!(
            %email,
            valid = verification.valid,
            reason = %verification.reason,
            remaining_days,
            "License checked"
        ),
        ServiceEvent::DownloadStarted { version } => info!(%version, "Download started"),
        ServiceEvent::DownloadFinished { path } => {
            info!(path = %path.display(), "Download finished");
        }
        ServiceEvent::DownloadCancelled => info!("Download cancelled"),
        ServiceEvent::DownloadFailed(reason) => warn!(%reason, "Download failed"),
        ServiceEvent::InstallFinished(outcome) => {
            info!(success = outcome.success, message = %outcome.message, "Install finished");
        }
        ServiceEvent::RollbackFinished { success, message } => {
            info!(success, %message, "Rollback finished");
        }
        ServiceEvent::CleanupFinished(Ok(report)) => info!(
            backups = report.backups_removed,
            staged = report.staged_removed,
            "Cleanup finished"
        ),
        ServiceEvent::CleanupFinished(Err(reason)) => warn!(%reason, "Cleanup failed"),
        ServiceEvent::Busy(reason) => warn!(%reason, "Command refused"),
        ServiceEvent::Stopped => info!("Service stopped"),
    }
}

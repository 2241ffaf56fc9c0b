//! The background update service.
//!
//! One task owns the configuration store and runs a cycle every
//! `check_interval_secs`: refresh the remote configuration, look for a newer
//! package, re-verify the active license. Callers talk to it through a
//! [`ServiceHandle`] and receive results as [`ServiceEvent`]s. Cycles,
//! downloads and installs run on their own tasks so the loop keeps answering
//! commands while the remote is slow.

use crate::config::{Secrets, ServiceConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{NotificationKind, NotificationSink, NotifyingObserver, DEFAULT_DURATION_MS};
use crate::source::RemoteSnapshotSource;
use docflow_config::RemoteConfigStore;
use docflow_crypto::{FileProtector, KdfParams, PassphraseProtector};
use docflow_license::{
    remaining_days, LicenseCodec, LicenseStore, LicenseVerifier, Verification, VerifyReason,
};
use docflow_remote::RemoteStore;
use docflow_types::{Clock, Version};
use docflow_update::{
    CleanupReport, InstallOutcome, UpdateFetcher, UpdateInstaller, UpdatePackageMetadata,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Requests accepted by the service task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    /// Run a cycle now. `force` bypasses the configuration check interval.
    CheckNow { force: bool },
    /// Download and install the newest available package.
    InstallLatest,
    /// Install an already staged package.
    InstallPackage(PathBuf),
    /// Abandon the download in progress.
    CancelDownload,
    /// Restore the backup taken before installing this version.
    Rollback(String),
    /// Remove backups and staged packages past the retention window.
    Cleanup,
    Shutdown,
}

/// Results reported by the service task.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    ConfigChecked { updated: bool, offline: bool },
    UpdateAvailable(UpdatePackageMetadata),
    UpToDate,
    UpdateCheckFailed(String),
    LicenseChecked {
        email: String,
        verification: Verification,
        remaining_days: i64,
    },
    DownloadStarted { version: Version },
    DownloadFinished { path: PathBuf },
    DownloadCancelled,
    DownloadFailed(String),
    InstallFinished(InstallOutcome),
    RollbackFinished { success: bool, message: String },
    CleanupFinished(Result<CleanupReport, String>),
    /// A command was refused because conflicting work is running.
    Busy(String),
    Stopped,
}

/// Sends commands to a running service.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<ServiceCommand>,
}

impl ServiceHandle {
    pub async fn send(&self, command: ServiceCommand) -> ServiceResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServiceError::ChannelClosed)
    }

    pub async fn check_now(&self, force: bool) -> ServiceResult<()> {
        self.send(ServiceCommand::CheckNow { force }).await
    }

    pub async fn install_latest(&self) -> ServiceResult<()> {
        self.send(ServiceCommand::InstallLatest).await
    }

    pub async fn cancel_download(&self) -> ServiceResult<()> {
        self.send(ServiceCommand::CancelDownload).await
    }

    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.send(ServiceCommand::Shutdown).await
    }

    /// True while the service task is alive.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

struct LicenseCheck {
    email: String,
    store_path: PathBuf,
    verifier: LicenseVerifier,
    warning_days: u32,
}

struct DownloadTask {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// State owned by one check cycle. Moved onto the cycle task while it runs
/// and handed back to the loop when it finishes.
struct Cycle {
    current_version: Version,
    config_store: RemoteConfigStore,
    fetcher: Arc<UpdateFetcher>,
    license: Option<LicenseCheck>,
    license_cache: PathBuf,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    pending: Option<UpdatePackageMetadata>,
    announced: Option<Version>,
}

/// The update, configuration and license service.
pub struct UpdateService {
    current_version: Version,
    check_interval: Duration,
    retention_days: u32,
    fetcher: Arc<UpdateFetcher>,
    installer: Arc<UpdateInstaller>,
    sink: Arc<dyn NotificationSink>,
    cycle: Option<Cycle>,
    running: Option<JoinHandle<Cycle>>,
    queued_check: Option<bool>,
    install_queued: bool,
    download: Option<DownloadTask>,
}

impl UpdateService {
    /// Wires every component from `config`.
    ///
    /// The update passphrase is required. The license secret is required only
    /// when an active email is configured.
    pub fn new(
        config: &ServiceConfig,
        secrets: &Secrets,
        remote: Arc<dyn RemoteStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> ServiceResult<Self> {
        config.validate()?;
        let current_version = config.version()?;

        let protector = build_protector(config, secrets)?;
        let fetcher = build_fetcher(config, remote, Arc::clone(&protector))?;
        let mut config_store = build_config_store(config, Arc::clone(&fetcher), Arc::clone(&clock));
        config_store.load_local_cache();
        config_store.subscribe(Arc::new(NotifyingObserver::new(
            Arc::clone(&sink),
            current_version.clone(),
        )));
        let installer = Arc::new(build_installer(config, protector, Arc::clone(&clock))?);

        let license = match &config.license.active_email {
            Some(email) => Some(LicenseCheck {
                email: email.clone(),
                store_path: config.license_cache_path(),
                verifier: LicenseVerifier::new(LicenseCodec::new(secrets.license_secret()?)?),
                warning_days: config.license.expiry_warning_days,
            }),
            None => None,
        };

        let cycle = Cycle {
            current_version: current_version.clone(),
            config_store,
            fetcher: Arc::clone(&fetcher),
            license,
            license_cache: config.license_cache_path(),
            sink: Arc::clone(&sink),
            clock,
            pending: None,
            announced: None,
        };

        Ok(Self {
            current_version,
            check_interval: Duration::from_secs(config.check_interval_secs),
            retention_days: config.update.retention_days,
            fetcher,
            installer,
            sink,
            cycle: Some(cycle),
            running: None,
            queued_check: None,
            install_queued: false,
            download: None,
        })
    }

    /// Starts the service task. A first cycle runs immediately.
    pub fn spawn(self) -> (ServiceHandle, mpsc::Receiver<ServiceEvent>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(64);

        tokio::spawn(self.run(command_rx, event_tx));

        (ServiceHandle { commands: command_tx }, event_rx)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<ServiceCommand>, events: mpsc::Sender<ServiceEvent>) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(version = %self.current_version, interval = ?self.check_interval, "Update service started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.running.is_some() {
                        debug!("Previous cycle still running; tick skipped");
                    } else {
                        self.start_cycle(false, &events);
                    }
                }
                finished = join_cycle(&mut self.running), if self.running.is_some() => {
                    self.running = None;
                    match finished {
                        Ok(cycle) => self.cycle_finished(cycle, &events).await,
                        Err(e) => {
                            error!(error = %e, "Check cycle task failed");
                            break;
                        }
                    }
                }
                command = commands.recv() => match command {
                    Some(ServiceCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command, &events).await,
                },
            }
        }

        if let Some(running) = self.running.take() {
            running.abort();
        }
        self.cancel_download();
        info!("Update service stopped");
        emit(&events, ServiceEvent::Stopped).await;
    }

    async fn handle(&mut self, command: ServiceCommand, events: &mpsc::Sender<ServiceEvent>) {
        debug!(?command, "Service command");
        match command {
            ServiceCommand::CheckNow { force } => self.start_cycle(force, events),
            ServiceCommand::InstallLatest => self.install_latest(events).await,
            ServiceCommand::InstallPackage(path) => {
                let installer = Arc::clone(&self.installer);
                let sink = Arc::clone(&self.sink);
                let events = events.clone();
                tokio::spawn(async move {
                    let outcome = install(installer, path, sink.as_ref()).await;
                    emit(&events, ServiceEvent::InstallFinished(outcome)).await;
                });
            }
            ServiceCommand::CancelDownload => self.cancel_download(),
            ServiceCommand::Rollback(version) => {
                let installer = Arc::clone(&self.installer);
                let sink = Arc::clone(&self.sink);
                let events = events.clone();
                tokio::spawn(async move {
                    let (success, message) = rollback(installer, version).await;
                    let kind = if success {
                        NotificationKind::Success
                    } else {
                        NotificationKind::Error
                    };
                    sink.show_notification("Rollback", &message, kind, DEFAULT_DURATION_MS);
                    emit(&events, ServiceEvent::RollbackFinished { success, message }).await;
                });
            }
            ServiceCommand::Cleanup => {
                let installer = Arc::clone(&self.installer);
                let retention_days = self.retention_days;
                let events = events.clone();
                tokio::spawn(async move {
                    let result = tokio::task::spawn_blocking(move || {
                        installer.cleanup_old_updates(retention_days)
                    })
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|r| r.map_err(|e| e.to_string()));
                    emit(&events, ServiceEvent::CleanupFinished(result)).await;
                });
            }
            ServiceCommand::Shutdown => {}
        }
    }

    /// Runs a cycle on its own task, or queues one if a cycle is in flight.
    fn start_cycle(&mut self, force: bool, events: &mpsc::Sender<ServiceEvent>) {
        let Some(mut cycle) = self.cycle.take() else {
            let queued = self.queued_check.unwrap_or(false);
            self.queued_check = Some(queued || force);
            debug!(force, "Cycle in flight; check queued");
            return;
        };
        let events = events.clone();
        self.running = Some(tokio::spawn(async move {
            cycle.run(force, &events).await;
            cycle
        }));
    }

    async fn cycle_finished(&mut self, cycle: Cycle, events: &mpsc::Sender<ServiceEvent>) {
        self.cycle = Some(cycle);
        if let Some(force) = self.queued_check.take() {
            self.start_cycle(force, events);
        } else if std::mem::take(&mut self.install_queued) {
            self.install_latest(events).await;
        }
    }

    async fn install_latest(&mut self, events: &mpsc::Sender<ServiceEvent>) {
        if self.download.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            emit(
                events,
                ServiceEvent::Busy("an update is already being downloaded or installed".to_string()),
            )
            .await;
            return;
        }

        // The running cycle is about to learn what is pending.
        let Some(cycle) = self.cycle.as_ref() else {
            self.install_queued = true;
            debug!("Cycle in flight; install queued");
            return;
        };
        let known = cycle.pending.clone();

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let installer = Arc::clone(&self.installer);
        let sink = Arc::clone(&self.sink);
        let current_version = self.current_version.clone();
        let events = events.clone();

        let handle = tokio::spawn(async move {
            let meta = match known {
                Some(meta) => meta,
                None => {
                    let lookup = tokio::select! {
                        result = fetcher.check_for_updates(&current_version) => result,
                        _ = &mut cancel_rx => {
                            emit(&events, ServiceEvent::DownloadCancelled).await;
                            return;
                        }
                    };
                    match lookup {
                        Ok(Some(meta)) => {
                            emit(&events, ServiceEvent::UpdateAvailable(meta.clone())).await;
                            meta
                        }
                        Ok(None) => {
                            emit(&events, ServiceEvent::UpToDate).await;
                            return;
                        }
                        Err(e) => {
                            warn!(error = %e, "Update check failed");
                            emit(&events, ServiceEvent::UpdateCheckFailed(e.to_string())).await;
                            return;
                        }
                    }
                }
            };

            emit(
                &events,
                ServiceEvent::DownloadStarted {
                    version: meta.version.clone(),
                },
            )
            .await;

            // Dropping the download future removes its temp file.
            let staged = tokio::select! {
                result = fetcher.download_package(&meta) => result,
                _ = &mut cancel_rx => {
                    info!(version = %meta.version, "Download cancelled");
                    emit(&events, ServiceEvent::DownloadCancelled).await;
                    return;
                }
            };

            match staged {
                Ok(path) => {
                    emit(&events, ServiceEvent::DownloadFinished { path: path.clone() }).await;
                    let outcome = install(installer, path, sink.as_ref()).await;
                    emit(&events, ServiceEvent::InstallFinished(outcome)).await;
                }
                Err(e) => {
                    warn!(version = %meta.version, error = %e, "Download failed");
                    sink.show_notification(
                        "Update",
                        &format!("Download failed: {e}"),
                        NotificationKind::Error,
                        DEFAULT_DURATION_MS,
                    );
                    emit(&events, ServiceEvent::DownloadFailed(e.to_string())).await;
                }
            }
        });

        self.download = Some(DownloadTask {
            cancel: Some(cancel_tx),
            handle,
        });
    }

    fn cancel_download(&mut self) {
        if std::mem::take(&mut self.install_queued) {
            debug!("Queued install dropped");
        }
        match self.download.as_mut().and_then(|task| task.cancel.take()) {
            Some(cancel) => {
                if cancel.send(()).is_err() {
                    debug!("Download already finished");
                }
            }
            None => debug!("No download to cancel"),
        }
    }
}

impl Cycle {
    async fn run(&mut self, force: bool, events: &mpsc::Sender<ServiceEvent>) {
        let updated = self.config_store.check_for_updates(force).await;
        if updated {
            self.import_remote_licences();
        }
        emit(
            events,
            ServiceEvent::ConfigChecked {
                updated,
                offline: self.config_store.is_offline(),
            },
        )
        .await;

        self.check_packages(events).await;
        self.check_license(events).await;
    }

    async fn check_packages(&mut self, events: &mpsc::Sender<ServiceEvent>) {
        match self.fetcher.check_for_updates(&self.current_version).await {
            Ok(Some(meta)) => {
                if self.announced.as_ref() != Some(&meta.version) {
                    self.sink.show_notification(
                        "Update available",
                        &format!("Version {} is ready to download.", meta.version),
                        NotificationKind::Info,
                        DEFAULT_DURATION_MS,
                    );
                    self.announced = Some(meta.version.clone());
                }
                self.pending = Some(meta.clone());
                emit(events, ServiceEvent::UpdateAvailable(meta)).await;
            }
            Ok(None) => {
                self.pending = None;
                emit(events, ServiceEvent::UpToDate).await;
            }
            Err(e) => {
                warn!(error = %e, "Update check failed");
                emit(events, ServiceEvent::UpdateCheckFailed(e.to_string())).await;
            }
        }
    }

    async fn check_license(&self, events: &mpsc::Sender<ServiceEvent>) {
        let Some(check) = &self.license else {
            return;
        };
        let now = self.clock.unix_now();

        let verification = match LicenseStore::open(&check.store_path) {
            Ok(store) => match store.get(&check.email) {
                Some(blob) => check.verifier.verify_at(&check.email, blob, now),
                None => not_found(),
            },
            Err(e) => {
                warn!(error = %e, "License cache unreadable");
                not_found()
            }
        };
        let days = verification
            .ticket
            .as_ref()
            .map_or(0, |ticket| remaining_days(ticket, now));

        if !verification.valid {
            self.sink.show_notification(
                "License",
                &format!("Your license is not valid: {}.", verification.reason),
                NotificationKind::Error,
                DEFAULT_DURATION_MS * 2,
            );
        } else if verification
            .ticket
            .as_ref()
            .is_some_and(|t| t.expires_at.is_some())
            && days <= i64::from(check.warning_days)
        {
            self.sink.show_notification(
                "License",
                &format!("Your license expires in {days} day(s)."),
                NotificationKind::Warning,
                DEFAULT_DURATION_MS * 2,
            );
        }

        emit(
            events,
            ServiceEvent::LicenseChecked {
                email: check.email.clone(),
                verification,
                remaining_days: days,
            },
        )
        .await;
    }

    fn import_remote_licences(&self) {
        let licences = &self.config_store.snapshot().licences;
        if licences.is_empty() {
            return;
        }
        let mut store = match LicenseStore::open(&self.license_cache) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "License cache unreadable; remote licences not imported");
                return;
            }
        };
        let imported = store.sync_remote(licences);
        if imported > 0 {
            match store.save() {
                Ok(()) => info!(imported, "Imported remote licences"),
                Err(e) => warn!(error = %e, "Failed to save license cache"),
            }
        }
    }
}

/// The passphrase protector for update packages and the remote configuration.
pub fn build_protector(config: &ServiceConfig, secrets: &Secrets) -> ServiceResult<Arc<dyn FileProtector>> {
    Ok(Arc::new(PassphraseProtector::with_params(
        secrets.update_passphrase()?,
        KdfParams::with_iterations(config.update.kdf_iterations),
    )))
}

/// A fetcher over the configured updates folder, enforcing the release key if set.
pub fn build_fetcher(
    config: &ServiceConfig,
    remote: Arc<dyn RemoteStore>,
    protector: Arc<dyn FileProtector>,
) -> ServiceResult<Arc<UpdateFetcher>> {
    let mut fetcher = UpdateFetcher::new(
        remote,
        config.remote.updates_folder.clone(),
        config.staging_dir(),
        protector,
    );
    if let Some(key) = config.release_key()? {
        fetcher = fetcher.with_release_key(key);
    }
    Ok(Arc::new(fetcher))
}

/// A configuration store reading the encrypted document through `fetcher`.
///
/// The local cache is not loaded yet.
pub fn build_config_store(
    config: &ServiceConfig,
    fetcher: Arc<UpdateFetcher>,
    clock: Arc<dyn Clock>,
) -> RemoteConfigStore {
    let source = Arc::new(RemoteSnapshotSource::new(
        fetcher,
        config.remote.config_folder.clone(),
        config.remote.config_file.clone(),
    ));
    RemoteConfigStore::new(config.config_cache_path(), source, clock)
        .with_check_interval(config.check_interval_secs)
}

pub fn build_installer(
    config: &ServiceConfig,
    protector: Arc<dyn FileProtector>,
    clock: Arc<dyn Clock>,
) -> ServiceResult<UpdateInstaller> {
    Ok(UpdateInstaller::new(config.installer_config()?, protector, clock))
}

fn not_found() -> Verification {
    Verification {
        valid: false,
        reason: VerifyReason::NotFound,
        ticket: None,
    }
}

async fn install(
    installer: Arc<UpdateInstaller>,
    path: PathBuf,
    sink: &dyn NotificationSink,
) -> InstallOutcome {
    let outcome = match tokio::task::spawn_blocking(move || installer.install_outcome(&path)).await {
        Ok(outcome) => outcome,
        Err(e) => InstallOutcome {
            success: false,
            message: format!("install task failed: {e}"),
        },
    };
    let kind = if outcome.success {
        NotificationKind::Success
    } else {
        NotificationKind::Error
    };
    sink.show_notification("Update", &outcome.message, kind, DEFAULT_DURATION_MS);
    outcome
}

async fn rollback(installer: Arc<UpdateInstaller>, version: String) -> (bool, String) {
    let result = tokio::task::spawn_blocking(move || installer.rollback_update(&version)).await;
    match result {
        Ok(Ok(report)) => (
            true,
            format!("Restored the state from before version {}", report.version),
        ),
        Ok(Err(e)) => (false, e.to_string()),
        Err(e) => (false, format!("rollback task failed: {e}")),
    }
}

async fn join_cycle(running: &mut Option<JoinHandle<Cycle>>) -> Result<Cycle, tokio::task::JoinError> {
    match running {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn emit(events: &mpsc::Sender<ServiceEvent>, event: ServiceEvent) {
    if events.send(event).await.is_err() {
        debug!("Event receiver dropped");
    }
}

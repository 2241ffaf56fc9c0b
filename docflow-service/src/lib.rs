//! Background service tying docflow's components together.
//!
//! [`UpdateService`] owns the configuration store, the update fetcher and the
//! installer, runs the periodic check cycle on a tokio task and reports
//! through a channel of [`ServiceEvent`]s. User-facing messages go to an
//! injected [`NotificationSink`].

pub mod config;
pub mod error;
pub mod notify;
pub mod service;
pub mod source;

pub use config::{
    LicenseSection, RemoteSection, Secrets, ServiceConfig, UpdateSection, ACCESS_TOKEN_ENV,
    LICENSE_SECRET_ENV, UPDATE_PASSPHRASE_ENV,
};
pub use error::{ServiceError, ServiceResult};
pub use notify::{LogSink, NotificationKind, NotificationSink, NotifyingObserver, DEFAULT_DURATION_MS};
pub use service::{
    build_config_store, build_fetcher, build_installer, build_protector, ServiceCommand,
    ServiceEvent, ServiceHandle, UpdateService,
};
pub use source::RemoteSnapshotSource;

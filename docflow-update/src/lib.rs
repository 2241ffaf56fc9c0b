//! Update pipeline for docflow.
//!
//! - [`UpdateFetcher`] discovers packages in a remote folder, checks their
//!   release signature and checksum, decrypts them and stages the archive.
//! - [`UpdateInstaller`] backs up critical files, applies a staged archive
//!   according to its manifest, rolls back on failure and records history.
//! - [`PackageBuilder`] is the publisher side: it produces the sealed archive
//!   and the metadata the fetcher expects.

pub mod backup;
pub mod checksum;
pub mod error;
pub mod fetcher;
pub mod history;
pub mod installer;
pub mod manifest;
pub mod package;
pub mod signing;

pub use backup::{create_backup, restore_backup, verify_backup, BackupEntry, BackupIndex};
pub use checksum::{sha256_file, sha256_hex};
pub use error::{UpdateError, UpdateResult};
pub use fetcher::UpdateFetcher;
pub use history::{HistoryEntry, UpdateHistory};
pub use installer::{
    CleanupReport, InstallOutcome, InstallReport, InstallStage, InstallerConfig, RollbackReport,
    UpdateInstaller,
};
pub use manifest::{ManifestFile, SecuritySection, UpdateManifest};
pub use package::{BuiltPackage, PackageBuilder, UpdatePackageMetadata};
pub use signing::{KeyPair, SigningKey, VerifyingKey};

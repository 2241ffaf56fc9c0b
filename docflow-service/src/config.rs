//! Service configuration.
//!
//! Loaded from a TOML file where every field is optional. Secrets are never
//! read from the file; see [`Secrets`].

use crate::error::{ServiceError, ServiceResult};
use docflow_types::Version;
use docflow_update::{InstallerConfig, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Environment variable holding the license HMAC secret.
pub const LICENSE_SECRET_ENV: &str = "DOCFLOW_LICENSE_SECRET";
/// Environment variable holding the update passphrase.
pub const UPDATE_PASSPHRASE_ENV: &str = "DOCFLOW_UPDATE_PASSPHRASE";
/// Environment variable holding the remote API access token.
pub const ACCESS_TOKEN_ENV: &str = "DOCFLOW_ACCESS_TOKEN";

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Installation root; critical files and manifest paths are relative to it.
    pub app_root: PathBuf,
    /// Directory holding caches, staging, backups and history.
    pub data_dir: PathBuf,
    /// Version of the running application.
    pub current_version: String,
    /// Seconds between background cycles.
    pub check_interval_secs: u64,
    pub remote: RemoteSection,
    pub update: UpdateSection,
    pub license: LicenseSection,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            app_root: PathBuf::from("."),
            data_dir: PathBuf::from("data"),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            check_interval_secs: docflow_config::DEFAULT_CHECK_INTERVAL_SECS,
            remote: RemoteSection::default(),
            update: UpdateSection::default(),
            license: LicenseSection::default(),
        }
    }
}

/// Where remote artifacts live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub api_base_url: String,
    /// Folder holding the encrypted configuration document.
    pub config_folder: String,
    /// Name of the encrypted configuration artifact.
    pub config_file: String,
    /// Folder holding update packages.
    pub updates_folder: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com".to_string(),
            config_folder: String::new(),
            config_file: "config.json.enc".to_string(),
            updates_folder: String::new(),
        }
    }
}

/// Update install settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSection {
    /// Files backed up before every install, relative to `app_root`.
    pub critical_files: Vec<PathBuf>,
    /// Backups and staged packages older than this are removed by cleanup.
    pub retention_days: u32,
    /// Hex Ed25519 key; when set, unsigned packages are refused.
    pub release_public_key: Option<String>,
    /// PBKDF2 iterations used when sealing. Opening reads the count from the blob.
    pub kdf_iterations: u32,
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            critical_files: vec![
                PathBuf::from("data/clients.json"),
                PathBuf::from("data/users.json"),
                PathBuf::from("data/licenses.json"),
                PathBuf::from("config/settings.json"),
            ],
            retention_days: 30,
            release_public_key: None,
            kdf_iterations: docflow_crypto::DEFAULT_ITERATIONS,
        }
    }
}

/// License re-check settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseSection {
    /// The logged-in user, re-verified every cycle.
    pub active_email: Option<String>,
    /// Warn when fewer days than this remain.
    pub expiry_warning_days: u32,
}

impl Default for LicenseSection {
    fn default() -> Self {
        Self {
            active_email: None,
            expiry_warning_days: 7,
        }
    }
}

impl ServiceConfig {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: &Path) -> ServiceResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> ServiceResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde alone cannot.
    pub fn validate(&self) -> ServiceResult<()> {
        self.version()?;
        if self.check_interval_secs == 0 {
            return Err(ServiceError::Config(
                "check_interval_secs must be positive".to_string(),
            ));
        }
        if self.update.kdf_iterations == 0 {
            return Err(ServiceError::Config(
                "update.kdf_iterations must be positive".to_string(),
            ));
        }
        if self.update.kdf_iterations > docflow_crypto::MAX_ITERATIONS {
            return Err(ServiceError::Config(format!(
                "update.kdf_iterations must not exceed {}",
                docflow_crypto::MAX_ITERATIONS
            )));
        }
        self.release_key()?;
        Ok(())
    }

    /// The running version, parsed.
    pub fn version(&self) -> ServiceResult<Version> {
        Ok(Version::parse(&self.current_version)?)
    }

    /// The configured release key, if any.
    pub fn release_key(&self) -> ServiceResult<Option<VerifyingKey>> {
        match self.update.release_public_key.as_deref() {
            Some(hex_key) if !hex_key.trim().is_empty() => {
                Ok(Some(VerifyingKey::from_hex(hex_key.trim())?))
            }
            _ => Ok(None),
        }
    }

    /// Local mirror of the remote configuration.
    pub fn config_cache_path(&self) -> PathBuf {
        self.data_dir.join("remote_config.json")
    }

    /// Email to ticket cache.
    pub fn license_cache_path(&self) -> PathBuf {
        self.data_dir.join("licenses.json")
    }

    /// Verified packages waiting to be installed.
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("updates")
    }

    /// One timestamped directory per install.
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// JSON log of installed versions.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("update_history.json")
    }

    /// Installer settings derived from this configuration.
    pub fn installer_config(&self) -> ServiceResult<InstallerConfig> {
        Ok(InstallerConfig {
            app_root: self.app_root.clone(),
            critical_files: self.update.critical_files.clone(),
            backups_dir: self.backups_dir(),
            staging_dir: self.staging_dir(),
            history_path: self.history_path(),
            current_version: self.version()?,
        })
    }
}

/// Secrets supplied through the environment or command-line flags.
///
/// Buffers are wiped on drop.
#[derive(Default)]
pub struct Secrets {
    pub license_secret: Option<Zeroizing<String>>,
    pub update_passphrase: Option<Zeroizing<String>>,
    pub access_token: Option<Zeroizing<String>>,
}

impl Secrets {
    /// Reads the `DOCFLOW_*` variables. Empty values count as absent.
    pub fn from_env() -> Self {
        Self {
            license_secret: read_env(LICENSE_SECRET_ENV),
            update_passphrase: read_env(UPDATE_PASSPHRASE_ENV),
            access_token: read_env(ACCESS_TOKEN_ENV),
        }
    }

    pub fn license_secret(&self) -> ServiceResult<&str> {
        self.license_secret
            .as_deref()
            .map(String::as_str)
            .ok_or(ServiceError::MissingSecret(LICENSE_SECRET_ENV))
    }

    pub fn update_passphrase(&self) -> ServiceResult<&str> {
        self.update_passphrase
            .as_deref()
            .map(String::as_str)
            .ok_or(ServiceError::MissingSecret(UPDATE_PASSPHRASE_ENV))
    }

    pub fn access_token(&self) -> ServiceResult<&str> {
        self.access_token
            .as_deref()
            .map(String::as_str)
            .ok_or(ServiceError::MissingSecret(ACCESS_TOKEN_ENV))
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |s: &Option<Zeroizing<String>>| if s.is_some() { "[set]" } else { "[unset]" };
        f.debug_struct("Secrets")
            .field("license_secret", &state(&self.license_secret))
            .field("update_passphrase", &state(&self.update_passphrase))
            .field("access_token", &state(&self.access_token))
            .finish()
    }
}

fn read_env(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Zeroizing::new)
}

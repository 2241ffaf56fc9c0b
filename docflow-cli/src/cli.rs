//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use docflow_service::Secrets;
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "docflow", version)]
#[command(about = "docflow licensing, remote configuration and updates")]
pub struct Cli {
    /// Service configuration file
    #[arg(short, long, env = "DOCFLOW_CONFIG", default_value = "docflow.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub secrets: SecretArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Secrets, taken from flags or the environment. Never read from the config file.
#[derive(Args, Default)]
pub struct SecretArgs {
    /// HMAC secret used to sign license tickets
    #[arg(long, env = "DOCFLOW_LICENSE_SECRET", hide_env_values = true, global = true)]
    pub license_secret: Option<String>,

    /// Passphrase sealing update packages and the remote configuration
    #[arg(long, env = "DOCFLOW_UPDATE_PASSPHRASE", hide_env_values = true, global = true)]
    pub update_passphrase: Option<String>,

    /// Bearer token for the remote store
    #[arg(long, env = "DOCFLOW_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,
}

impl SecretArgs {
    pub fn into_secrets(self) -> Secrets {
        Secrets {
            license_secret: into_secret(self.license_secret),
            update_passphrase: into_secret(self.update_passphrase),
            access_token: into_secret(self.access_token),
        }
    }
}

impl fmt::Debug for SecretArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretArgs").finish_non_exhaustive()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Issue and verify license tickets
    #[command(subcommand)]
    License(LicenseCommand),

    /// Inspect and refresh the remote configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Build, fetch, install and roll back update packages
    #[command(subcommand)]
    Update(UpdateCommand),

    /// Run the background service until interrupted
    Run,
}

#[derive(Subcommand, Debug)]
pub enum LicenseCommand {
    /// Issue a signed ticket and print it
    Issue(IssueArgs),
    /// Verify a ticket for an email
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct IssueArgs {
    #[arg(long)]
    pub email: String,

    /// Days until expiry; omit for a ticket that never expires
    #[arg(long)]
    pub days: Option<u32>,

    /// Extra ticket field as KEY=VALUE; JSON values are kept typed (repeatable)
    #[arg(long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,

    /// Also store the ticket in the local license cache
    #[arg(long)]
    pub save: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[arg(long)]
    pub email: String,

    /// Ticket to verify; defaults to the one cached for the email
    #[arg(long)]
    pub ticket: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Fetch the remote configuration and update the local cache
    Check {
        /// Ignore the check interval
        #[arg(long)]
        force: bool,
    },
    /// Print the cached configuration, or one dotted key of it
    Show {
        #[arg(long)]
        key: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum UpdateCommand {
    /// Look for a package newer than the running version
    Check,
    /// Build a sealed update package
    Pack(PackArgs),
    /// Install a package (sealed `.enc` or staged `.zip`)
    Install { package: PathBuf },
    /// Restore the state from before an installed version
    Rollback { version: String },
    /// Remove old backups and staged packages
    Cleanup {
        /// Overrides `update.retention_days`
        #[arg(long)]
        retention_days: Option<u32>,
    },
    /// Generate a release signing keypair
    Keygen,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Version of the package
    #[arg(long)]
    pub package_version: String,

    /// Oldest application version the package installs over
    #[arg(long)]
    pub min_app_version: Option<String>,

    /// Payload file as DEST=SOURCE, DEST relative to the app root (repeatable)
    #[arg(long = "file", value_parser = parse_file)]
    pub files: Vec<(String, PathBuf)>,

    /// Like --file, but the payload is sealed inside the archive too
    #[arg(long = "sensitive-file", value_parser = parse_file)]
    pub sensitive_files: Vec<(String, PathBuf)>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,

    /// Hex Ed25519 release signing key
    #[arg(long, env = "DOCFLOW_SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,
}

fn into_secret(value: Option<String>) -> Option<Zeroizing<String>> {
    value.filter(|v| !v.is_empty()).map(Zeroizing::new)
}

fn split_key_value(input: &str) -> Result<(String, &str), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value)),
        _ => Err(format!("expected KEY=VALUE, got '{input}'")),
    }
}

/// Parses `KEY=VALUE`.
pub fn parse_field(input: &str) -> Result<(String, String), String> {
    split_key_value(input).map(|(key, value)| (key, value.to_string()))
}

/// Parses `DEST=SOURCE`.
pub fn parse_file(input: &str) -> Result<(String, PathBuf), String> {
    split_key_value(input).map(|(key, value)| (key, PathBuf::from(value)))
}

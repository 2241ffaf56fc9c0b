//! docflow command-line tool.
//!
//! Usage:
//!   docflow license issue --email user@example.com --days 365
//!   docflow update pack --package-version 2.4.0 --file app/main.py=build/main.py
//!   docflow run
//!
//! Secrets come from `--license-secret`, `--update-passphrase` and
//! `--access-token` or the matching `DOCFLOW_*` environment variables.

use anyhow::Result;
use clap::Parser;
use docflow_cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    docflow_cli::execute(cli).await
}

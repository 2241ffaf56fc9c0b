//! The `docflow` command-line tool.
//!
//! Admin and operator surface over the docflow crates: issuing and checking
//! licenses, refreshing the remote configuration, building and installing
//! update packages, and running the background service.

pub mod cli;
pub mod commands;

pub use cli::Cli;

use anyhow::{bail, Result};
use cli::{Command, ConfigCommand, LicenseCommand, UpdateCommand};
use commands::{config, license, load_config, run, update};

/// Runs the parsed command, printing its output to stdout.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let secrets = cli.secrets.into_secrets();

    match cli.command {
        Command::License(LicenseCommand::Issue(args)) => {
            println!("{}", license::issue(&args, &config, &secrets)?);
        }
        Command::License(LicenseCommand::Verify(args)) => {
            let now = chrono::Utc::now().timestamp();
            let verification = license::verify(&args, &config, &secrets, now)?;
            println!("{}", license::describe(&verification, now));
            if !verification.valid {
                bail!("license is not valid: {}", verification.reason);
            }
        }
        Command::Config(ConfigCommand::Check { force }) => {
            println!("{}", config::check(&config, &secrets, force).await?);
        }
        Command::Config(ConfigCommand::Show { key }) => {
            println!("{}", config::show(&config, key.as_deref())?);
        }
        Command::Update(UpdateCommand::Check) => {
            println!("{}", update::check(&config, &secrets).await?);
        }
        Command::Update(UpdateCommand::Pack(args)) => {
            println!("{}", update::pack(&args, &config, &secrets)?);
        }
        Command::Update(UpdateCommand::Install { package }) => {
            println!("{}", update::install(&package, &config, &secrets).await?);
        }
        Command::Update(UpdateCommand::Rollback { version }) => {
            println!("{}", update::rollback(version, &config, &secrets).await?);
        }
        Command::Update(UpdateCommand::Cleanup { retention_days }) => {
            println!("{}", update::cleanup(retention_days, &config, &secrets).await?);
        }
        Command::Update(UpdateCommand::Keygen) => println!("{}", update::keygen()),
        Command::Run => run::run(&config, &secrets).await?,
    }
    Ok(())
}

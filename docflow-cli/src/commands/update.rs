//! `docflow update`

use super::remote_store;
use crate::cli::PackArgs;
use anyhow::{Context, Result};
use docflow_crypto::FileProtector;
use docflow_service::{build_fetcher, build_installer, build_protector, Secrets, ServiceConfig};
use docflow_types::{write_atomic, write_json_atomic, SystemClock, Version};
use docflow_update::{KeyPair, PackageBuilder, SigningKey};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Reports the newest package available for the running version.
pub async fn check(config: &ServiceConfig, secrets: &Secrets) -> Result<String> {
    let remote = remote_store(config, secrets)?;
    let fetcher = build_fetcher(config, remote, build_protector(config, secrets)?)?;
    let current = config.version()?;

    Ok(match fetcher.check_for_updates(&current).await? {
        Some(meta) => format!(
            "Update {} available ({} bytes, published {})",
            meta.version,
            meta.size,
            meta.modified_at.format("%Y-%m-%d %H:%M")
        ),
        None => format!("Up to date ({current})"),
    })
}

/// Builds a sealed package and its properties file in `args.out`.
pub fn pack(args: &PackArgs, config: &ServiceConfig, secrets: &Secrets) -> Result<String> {
    let protector = build_protector(config, secrets)?;

    let mut builder = PackageBuilder::new(Version::parse(&args.package_version)?);
    if let Some(min) = &args.min_app_version {
        builder = builder.min_app_version(Version::parse(min)?);
    }
    let files = args.files.iter().map(|(dest, src)| (dest, src, false));
    let sensitive = args.sensitive_files.iter().map(|(dest, src)| (dest, src, true));
    for (dest, source, is_sensitive) in files.chain(sensitive) {
        let data = std::fs::read(source)
            .with_context(|| format!("cannot read {}", source.display()))?;
        builder = builder.add_file(dest, data, is_sensitive);
    }
    if let Some(key) = &args.signing_key {
        let key = SigningKey::from_hex(key.trim()).context("invalid signing key")?;
        builder = builder.sign(&key);
    }

    let built = builder.build(protector.as_ref(), protector.as_ref())?;
    let package_path = args.out.join(built.file_name());
    let properties_path = args.out.join(format!("{}.properties.json", built.file_name()));
    write_atomic(&package_path, &built.bytes)?;
    write_json_atomic(&properties_path, &built.properties())?;
    info!(version = %built.version, path = %package_path.display(), "Package built");

    Ok(format!(
        "package:    {}\nchecksum:   {}\nsignature:  {}\nproperties: {}",
        package_path.display(),
        built.checksum,
        built.signature.as_deref().unwrap_or("(unsigned)"),
        properties_path.display()
    ))
}

/// Installs a sealed (`.enc`) or already staged package.
pub async fn install(package: &Path, config: &ServiceConfig, secrets: &Secrets) -> Result<String> {
    let protector = build_protector(config, secrets)?;
    let staged = if package.extension().is_some_and(|ext| ext == "enc") {
        stage_sealed(package, config, protector.as_ref())?
    } else {
        package.to_path_buf()
    };

    let installer = build_installer(config, protector, Arc::new(SystemClock))?;
    let report = tokio::task::spawn_blocking(move || installer.install(&staged)).await??;
    Ok(format!(
        "Update {} installed: {} file(s), backup at {}",
        report.version,
        report.files_applied,
        report.backup_dir.display()
    ))
}

pub async fn rollback(version: String, config: &ServiceConfig, secrets: &Secrets) -> Result<String> {
    let installer = build_installer(config, build_protector(config, secrets)?, Arc::new(SystemClock))?;
    let report = tokio::task::spawn_blocking(move || installer.rollback_update(&version)).await??;
    Ok(format!(
        "Restored {} from {}; replaced state saved to {}",
        report.version,
        report.restored_from.display(),
        report.safety_backup.display()
    ))
}

pub async fn cleanup(
    retention_days: Option<u32>,
    config: &ServiceConfig,
    secrets: &Secrets,
) -> Result<String> {
    let days = retention_days.unwrap_or(config.update.retention_days);
    let installer = build_installer(config, build_protector(config, secrets)?, Arc::new(SystemClock))?;
    let report = tokio::task::spawn_blocking(move || installer.cleanup_old_updates(days)).await??;
    Ok(format!(
        "Removed {} backup(s), {} staged file(s) and {} history entries; {} error(s)",
        report.backups_removed, report.staged_removed, report.history_pruned, report.errors
    ))
}

pub fn keygen() -> String {
    let pair = KeyPair::generate();
    format!(
        "signing key (keep secret):               {}\nverifying key (update.release_public_key): {}",
        pair.signing_key.to_hex(),
        pair.verifying_key.to_hex()
    )
}

fn stage_sealed(package: &Path, config: &ServiceConfig, protector: &dyn FileProtector) -> Result<PathBuf> {
    let sealed = std::fs::read(package)
        .with_context(|| format!("cannot read {}", package.display()))?;
    let archive = protector
        .unprotect(&sealed)
        .context("cannot decrypt package (wrong passphrase?)")?;
    let name = package
        .file_stem()
        .with_context(|| format!("invalid package path {}", package.display()))?;
    let staged = config.staging_dir().join(name);
    write_atomic(&staged, &archive)?;
    Ok(staged)
}

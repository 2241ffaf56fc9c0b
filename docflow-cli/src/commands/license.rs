//! `docflow license`

use crate::cli::{IssueArgs, VerifyArgs};
use anyhow::{Context, Result};
use docflow_license::{
    expiration_date_string, remaining_days, LicenseCodec, LicenseStore, LicenseVerifier,
    Verification,
};
use docflow_service::{Secrets, ServiceConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// Issues a ticket and returns the blob.
pub fn issue(args: &IssueArgs, config: &ServiceConfig, secrets: &Secrets) -> Result<String> {
    let codec = LicenseCodec::new(secrets.license_secret()?)?;
    let extra: BTreeMap<String, Value> = args
        .fields
        .iter()
        .map(|(key, raw)| (key.clone(), field_value(raw)))
        .collect();

    let blob = codec
        .encode(&args.email, args.days, &extra)
        .context("failed to issue license")?;

    if args.save {
        let mut store = LicenseStore::open(config.license_cache_path())?;
        let email = store.insert(&blob)?;
        store.save()?;
        info!(email = %email, path = %store.path().display(), "License saved");
    }
    Ok(blob)
}

/// Verifies the given or cached ticket as of `now`.
pub fn verify(
    args: &VerifyArgs,
    config: &ServiceConfig,
    secrets: &Secrets,
    now: i64,
) -> Result<Verification> {
    let verifier = LicenseVerifier::new(LicenseCodec::new(secrets.license_secret()?)?);
    let blob = match &args.ticket {
        Some(ticket) => ticket.clone(),
        None => {
            let store = LicenseStore::open(config.license_cache_path())?;
            store
                .get(&args.email)
                .map(str::to_string)
                .with_context(|| format!("no license cached for {}", args.email))?
        }
    };
    Ok(verifier.verify_at(&args.email, &blob, now))
}

pub fn describe(verification: &Verification, now: i64) -> String {
    let mut lines = vec![
        format!("valid:     {}", verification.valid),
        format!("reason:    {}", verification.reason),
    ];
    if let Some(ticket) = &verification.ticket {
        lines.push(format!("email:     {}", ticket.email));
        lines.push(format!("expires:   {}", expiration_date_string(ticket)));
        if ticket.expires_at.is_some() {
            lines.push(format!("remaining: {} day(s)", remaining_days(ticket, now)));
        }
    }
    lines.join("\n")
}

/// JSON literals keep their type; anything else is a string.
fn field_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

//! Ticket verification against an email.

use crate::codec::LicenseCodec;
use crate::ticket::{normalize_email, LicenseTicket, TicketData};
use chrono::{TimeZone, Utc};
use docflow_types::SECS_PER_DAY;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Returned by [`expiration_date_string`] for tickets without expiry.
pub const NO_EXPIRATION: &str = "no expiration";

/// Why a ticket was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyReason {
    /// The blob did not decode.
    InvalidFormat,
    /// The ticket was issued to another email.
    EmailMismatch,
    /// The payload does not match its signature.
    InvalidSignature,
    /// The ticket is authentic but past its expiry.
    Expired,
    /// No ticket is registered for the email.
    NotFound,
    /// The ticket authorizes the email.
    Valid,
}

impl VerifyReason {
    /// Short message suitable for direct display.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "Format de licence invalide",
            Self::EmailMismatch => "license not associated with this email",
            Self::InvalidSignature => "invalid signature",
            Self::Expired => "expired",
            Self::NotFound => "no license registered for this email",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for VerifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of verifying a ticket.
///
/// `ticket` is present for valid and expired tickets so callers can display
/// the expiry date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub valid: bool,
    pub reason: VerifyReason,
    pub ticket: Option<TicketData>,
}

impl Verification {
    pub(crate) fn rejected(reason: VerifyReason) -> Self {
        Self {
            valid: false,
            reason,
            ticket: None,
        }
    }
}

/// Decides whether a ticket authorizes an email at a given time.
#[derive(Debug, Clone)]
pub struct LicenseVerifier {
    codec: LicenseCodec,
}

impl LicenseVerifier {
    /// Creates a verifier sharing the issuer's secret through `codec`.
    #[must_use]
    pub fn new(codec: LicenseCodec) -> Self {
        Self { codec }
    }

    /// Verifies `blob` for `email` at the current time.
    #[must_use]
    pub fn verify(&self, email: &str, blob: &str) -> Verification {
        self.verify_at(email, blob, Utc::now().timestamp())
    }

    /// Verifies `blob` for `email` as if the current time were `now`.
    ///
    /// Pure: the result depends only on the arguments and the secret.
    #[must_use]
    pub fn verify_at(&self, email: &str, blob: &str, now: i64) -> Verification {
        let email = normalize_email(email);

        let ticket = match LicenseTicket::from_blob(blob) {
            Ok(ticket) => ticket,
            Err(_) => return Verification::rejected(VerifyReason::InvalidFormat),
        };

        if normalize_email(&ticket.data().email) != email {
            return Verification::rejected(VerifyReason::EmailMismatch);
        }

        if !self.codec.signature_matches(&ticket) {
            return Verification::rejected(VerifyReason::InvalidSignature);
        }

        let expired = ticket.data().expires_at.is_some_and(|exp| exp < now);
        Verification {
            valid: !expired,
            reason: if expired {
                VerifyReason::Expired
            } else {
                VerifyReason::Valid
            },
            ticket: Some(ticket.into_data()),
        }
    }
}

/// Whole days left before expiry; 0 when expired or without expiry.
#[must_use]
pub fn remaining_days(ticket: &TicketData, now: i64) -> i64 {
    match ticket.expires_at {
        Some(exp) if exp > now => (exp - now).div_euclid(SECS_PER_DAY),
        _ => 0,
    }
}

/// Formats the expiry date as `YYYY-MM-DD`, or [`NO_EXPIRATION`].
#[must_use]
pub fn expiration_date_string(ticket: &TicketData) -> String {
    ticket
        .expires_at
        .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
        .map_or_else(
            || NO_EXPIRATION.to_string(),
            |dt| dt.format("%Y-%m-%d").to_string(),
        )
}

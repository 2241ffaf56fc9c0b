//! License tickets for docflow.
//!
//! This crate handles:
//! - Issuing signed license tickets (admin side)
//! - Decoding and verifying tickets against an email at login/launch
//! - Expiry reporting (remaining days, display date)
//! - The local license cache, keyed by normalized email
//!
//! # Ticket Format
//!
//! A ticket is `base64(json)` where the JSON is `{"data": {...}, "signature": "<hex>"}`.
//! `data` always carries `email`, `created_at` and `expires_at` (seconds since
//! epoch, `null` for no expiry) plus any issuer-defined fields such as
//! `license_type`. The signature is HMAC-SHA256, keyed by the shared license
//! secret, over the canonical JSON of `data` (keys sorted, no whitespace).
//!
//! Tickets are immutable: changing any field of `data` invalidates the signature.

mod codec;
mod error;
mod store;
mod ticket;
mod verifier;

pub use codec::{LicenseCodec, RESERVED_FIELDS};
pub use error::{LicenseError, LicenseResult};
pub use store::LicenseStore;
pub use ticket::{canonical_json, normalize_email, LicenseTicket, TicketData};
pub use verifier::{
    expiration_date_string, remaining_days, LicenseVerifier, Verification, VerifyReason,
    NO_EXPIRATION,
};

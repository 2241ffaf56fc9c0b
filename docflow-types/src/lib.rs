//! Core type definitions for docflow.
//!
//! This crate provides the small set of types shared by every other crate:
//! - [`Version`]: dot-separated numeric versions compared segment by segment
//! - [`Clock`]: an injectable time source ([`SystemClock`], [`ManualClock`])
//! - Atomic file writes used for every piece of persisted state

mod atomic;
mod clock;
mod error;
mod version;

pub use atomic::{write_atomic, write_json_atomic};
pub use clock::{Clock, ManualClock, SystemClock, SECS_PER_DAY};
pub use error::VersionError;
pub use version::{is_newer, Version};

//! Error types for core types.

use thiserror::Error;

/// Errors produced while parsing a [`crate::Version`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The input was empty or only whitespace.
    #[error("version string is empty")]
    Empty,

    /// A dot-separated segment was not a non-negative integer.
    #[error("invalid version segment '{segment}' in '{input}'")]
    InvalidSegment { input: String, segment: String },
}

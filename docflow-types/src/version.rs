//! Dot-separated numeric versions.
//!
//! Versions compare segment by segment as integers, left to right, with
//! missing trailing segments treated as `0`. Under this ordering
//! `1.10.0 > 1.9.0` and `2.0 == 2.0.0`.

use crate::error::VersionError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A parsed application or package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    segments: Vec<u64>,
}

impl Version {
    /// Parses a dot-separated numeric version such as `"1.10.2"`.
    ///
    /// A leading `v` is accepted (`"v2.0"`).
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let segments = trimmed
            .split('.')
            .map(|segment| {
                let invalid = || VersionError::InvalidSegment {
                    input: input.to_string(),
                    segment: segment.to_string(),
                };
                // `u64::from_str` alone would also take a leading `+`.
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                segment.parse::<u64>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    /// Returns the numeric segments as parsed.
    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Segments with trailing zeros removed; equal versions share this form.
    fn significant(&self) -> &[u64] {
        let len = self
            .segments
            .iter()
            .rposition(|s| *s != 0)
            .map_or(0, |i| i + 1);
        &self.segments[..len]
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

/// Returns true if `candidate` is strictly newer than `current`.
///
/// Unparsable input on either side is never considered newer.
#[must_use]
pub fn is_newer(current: &str, candidate: &str) -> bool {
    match (Version::parse(current), Version::parse(candidate)) {
        (Ok(current), Ok(candidate)) => candidate > current,
        _ => false,
    }
}

//! WCAG conformance levels and version identifiers.

use crate::result::{AuditError, AuditResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// WCAG conformance level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConformanceLevel {
    /// Level A (minimum)
    A,
    /// Level AA
    AA,
    /// Level AAA (enhanced)
    AAA,
}

impl ConformanceLevel {
    /// All levels, lowest first
    pub const ALL: [Self; 3] = [Self::A, Self::AA, Self::AAA];

    /// Canonical label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AA => "AA",
            Self::AAA => "AAA",
        }
    }

    /// Whether an audit at `self` runs the rules of `other`
    #[must_use]
    pub fn includes(self, other: Self) -> bool {
        other <= self
    }

    /// Levels composed into `self`, lowest first
    pub fn composed(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |l| self.includes(*l))
    }
}

impl fmt::Display for ConformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConformanceLevel {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AA" => Ok(Self::AA),
            "AAA" => Ok(Self::AAA),
            _ => Err(AuditError::UnsupportedLevel {
                level: s.to_string(),
            }),
        }
    }
}

/// Check a WCAG version identifier and return it trimmed
pub fn validate_version(version: &str) -> AuditResult<&str> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return Err(AuditError::UnsupportedVersion {
            version: version.to_string(),
        });
    }
    Ok(trimmed)
}

//! Commit version identifiers
//!
//! Every committed transaction is assigned one commit version from a single
//! database-wide counter. All documents written by that transaction carry it.
//!
//! Version 0 is reserved: it never labels a stored document and stands for
//! "document did not exist" in transaction read sets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commit version of a stored document
///
/// ## Invariants
///
/// - Versions are monotonically increasing across commits
/// - All writes of one transaction share a version
/// - `Version::ZERO` never labels a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of an absent document
    pub const ZERO: Version = Version(0);

    /// Create a version from its raw value
    #[inline]
    pub const fn new(v: u64) -> Self {
        Version(v)
    }

    /// Get the numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if this is the absent-document version
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The version following this one
    #[inline]
    pub const fn next(&self) -> Self {
        Version(self.0 + 1)
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::ZERO
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Version(v)
    }
}

impl From<Version> for u64 {
    fn from(v: Version) -> Self {
        v.0
    }
}

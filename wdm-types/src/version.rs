//! Trait data versions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version counter of a trait instance's data.
///
/// Assigned and advanced by the backend whenever the instance's data
/// changes; callers can read and compare it but never set it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataVersion(u64);

impl DataVersion {
    /// The version reported for an instance that has never been synced.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the following version.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Returns true if this version is newer than `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self > other
    }
}

impl From<u64> for DataVersion {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for DataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

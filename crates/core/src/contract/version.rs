//! Per-entity version counter
//!
//! Every entity's chain is numbered `1..=N` with no gaps. `Version` is the
//! counter for one chain; it carries no meaning across entities.

use serde::{Deserialize, Serialize};

/// Position of a row inside its entity's version chain
///
/// ## Invariants
///
/// - A new entity starts at `Version::FIRST` (1)
/// - Each subsequent write for the same entity is exactly `latest.next()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of the row written by `create`
    pub const FIRST: Version = Version(1);

    /// Construct from a raw counter value
    ///
    /// Returns `None` for zero: chains are one-based.
    pub const fn new(n: u64) -> Option<Self> {
        if n == 0 {
            None
        } else {
            Some(Version(n))
        }
    }

    /// Raw counter value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The version that follows this one in the chain
    #[inline]
    pub const fn next(&self) -> Self {
        Version(self.0 + 1)
    }

    /// Whether this is the first version of a chain
    #[inline]
    pub const fn is_first(&self) -> bool {
        self.0 == 1
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::FIRST
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<Version> for u64 {
    fn from(v: Version) -> Self {
        v.0
    }
}

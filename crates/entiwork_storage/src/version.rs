//! Version tokens and stored state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque store-assigned version token.
///
/// Only equality is meaningful to callers. Stores hand out strictly
/// increasing values, but nothing outside a store may rely on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The first version a store hands out.
    pub const INITIAL: Version = Version(1);

    /// Creates a version from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the version after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What a store holds for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// Version of this state.
    pub version: Version,
    /// Encoded entity record.
    pub payload: Vec<u8>,
}

impl StoredState {
    /// Creates a stored state.
    pub fn new(version: Version, payload: Vec<u8>) -> Self {
        Self { version, payload }
    }
}

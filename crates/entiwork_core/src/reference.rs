//! Entity identity.

use std::fmt;
use uuid::Uuid;

/// Identity of an entity.
///
/// References are opaque strings that are:
/// - Compared, ordered, and hashed by value
/// - Immutable once assigned
/// - Never reused for another entity
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityReference(String);

impl EntityReference {
    /// Creates a reference from an identity string.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Creates a new random reference (a UUIDv4 string).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the reference and returns the identity string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityReference({})", self.0)
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for EntityReference {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

impl From<&str> for EntityReference {
    fn from(identity: &str) -> Self {
        Self(identity.to_string())
    }
}

impl From<EntityReference> for String {
    fn from(reference: EntityReference) -> Self {
        reference.0
    }
}

//! Change batches submitted to an entity store.

use crate::error::{StorageError, StorageResult};
use crate::version::Version;
use std::collections::HashSet;

/// One entity change inside a batch.
///
/// - `expected == None` with a payload is a create: the identity must be absent.
/// - `expected == Some(v)` with a payload is an update.
/// - `expected == Some(v)` without a payload is a removal (tombstone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Entity identity.
    pub identity: String,
    /// Version the writer loaded, if any.
    pub expected: Option<Version>,
    /// New encoded state, or `None` to remove the entity.
    pub payload: Option<Vec<u8>>,
}

impl Change {
    /// A change that creates a new entity.
    pub fn create(identity: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            identity: identity.into(),
            expected: None,
            payload: Some(payload),
        }
    }

    /// A change that overwrites an entity loaded at `expected`.
    pub fn update(identity: impl Into<String>, expected: Version, payload: Vec<u8>) -> Self {
        Self {
            identity: identity.into(),
            expected: Some(expected),
            payload: Some(payload),
        }
    }

    /// A change that removes an entity loaded at `expected`.
    pub fn remove(identity: impl Into<String>, expected: Version) -> Self {
        Self {
            identity: identity.into(),
            expected: Some(expected),
            payload: None,
        }
    }

    /// Returns true if this change removes the entity.
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// Returns true if the durable version `current` satisfies this change.
    pub fn matches(&self, current: Option<Version>) -> bool {
        self.expected == current
    }
}

/// A set of changes applied all-or-nothing, tagged for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeBatch {
    /// Changes in application order.
    pub changes: Vec<Change>,
    /// Name of the usecase that produced the batch.
    pub usecase: String,
    /// Identifier of the unit of work that produced the batch.
    pub unit_of_work: String,
}

impl ChangeBatch {
    /// Creates an empty batch.
    pub fn new(usecase: impl Into<String>, unit_of_work: impl Into<String>) -> Self {
        Self {
            changes: Vec::new(),
            usecase: usecase.into(),
            unit_of_work: unit_of_work.into(),
        }
    }

    /// Adds a change, builder style.
    #[must_use]
    pub fn with(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    /// Adds a change.
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Returns true if the batch has no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterates over the identities touched by this batch.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.identity.as_str())
    }

    /// Validates the batch against the durable versions reported by `current`.
    ///
    /// Every change is checked, so a conflict error names all offending
    /// identities rather than just the first.
    ///
    /// # Errors
    ///
    /// - `InvalidBatch` if an identity appears twice or a tombstone has no
    ///   expected version
    /// - `ConcurrentModification` if any change does not match its durable
    ///   version
    /// - any error returned by `current`
    pub fn verify_with<F>(&self, mut current: F) -> StorageResult<()>
    where
        F: FnMut(&str) -> StorageResult<Option<Version>>,
    {
        let mut seen = HashSet::with_capacity(self.changes.len());
        for change in &self.changes {
            if !seen.insert(change.identity.as_str()) {
                return Err(StorageError::invalid_batch(format!(
                    "identity {} appears more than once",
                    change.identity
                )));
            }
            if change.is_tombstone() && change.expected.is_none() {
                return Err(StorageError::invalid_batch(format!(
                    "removal of {} without an expected version",
                    change.identity
                )));
            }
        }

        let mut conflicts = Vec::new();
        for change in &self.changes {
            if !change.matches(current(&change.identity)?) {
                conflicts.push(change.identity.clone());
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(StorageError::concurrent_modification(conflicts))
        }
    }
}

/// Versions assigned by a successful `apply_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// New version per written identity. Removed identities are not listed.
    pub versions: Vec<(String, Version)>,
}

impl BatchOutcome {
    /// Returns the version assigned to `identity`, if it was written.
    pub fn version_of(&self, identity: &str) -> Option<Version> {
        self.versions
            .iter()
            .find(|(id, _)| id == identity)
            .map(|(_, v)| *v)
    }
}

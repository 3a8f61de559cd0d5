//! Entity store trait definition.

use crate::batch::{BatchOutcome, ChangeBatch};
use crate::error::StorageResult;
use crate::version::StoredState;

/// The persistence boundary behind a unit of work.
///
/// Entity stores are **opaque record stores** with optimistic concurrency.
/// They keep one encoded payload and one version per identity and never
/// interpret the payload.
///
/// # Invariants
///
/// - `apply_batch` is all-or-nothing: either every change is written or none
/// - the version check in `apply_batch` is atomic with the write
/// - a create requires absence; update and remove require the durable
///   version to equal the expected one
/// - every written identity gets a fresh version
/// - stores must be `Send + Sync`; they are shared behind `Arc`
///
/// # Implementors
///
/// - [`super::InMemoryEntityStore`] - For testing
/// - [`super::FileEntityStore`] - For persistent storage
pub trait EntityStore: Send + Sync {
    /// Loads the stored state for `identity`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load(&self, identity: &str) -> StorageResult<Option<StoredState>>;

    /// Validates and writes a batch atomically.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` naming every stale identity; nothing is written
    /// - `InvalidBatch` if the batch is malformed
    /// - an I/O error if persisting fails; nothing is written
    fn apply_batch(&self, batch: &ChangeBatch) -> StorageResult<BatchOutcome>;

    /// Validates a batch without writing it.
    ///
    /// The default implementation loads every identity in the batch.
    /// A successful check does not guarantee that a later `apply_batch`
    /// succeeds; the write re-validates.
    ///
    /// # Errors
    ///
    /// Same conflict and validation errors as `apply_batch`.
    fn check_versions(&self, batch: &ChangeBatch) -> StorageResult<()> {
        batch.verify_with(|identity| Ok(self.load(identity)?.map(|s| s.version)))
    }

    /// Returns true if the store holds a record for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn contains(&self, identity: &str) -> StorageResult<bool> {
        Ok(self.load(identity)?.is_some())
    }

    /// Lists every stored identity in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn identities(&self) -> StorageResult<Vec<String>>;
}

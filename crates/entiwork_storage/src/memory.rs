//! In-memory entity store for testing.

use crate::backend::EntityStore;
use crate::batch::{BatchOutcome, ChangeBatch};
use crate::error::StorageResult;
use crate::snapshot::Snapshot;
use crate::stats::StoreStats;
use crate::version::StoredState;
use parking_lot::RwLock;
use tracing::{debug, warn};

/// An in-memory entity store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral state that doesn't need persistence
///
/// # Thread Safety
///
/// Reads share a read lock. `apply_batch` holds the write lock for both the
/// version check and the write, which makes the check-and-set atomic.
///
/// # Example
///
/// ```rust
/// use entiwork_storage::{Change, ChangeBatch, EntityStore, InMemoryEntityStore};
///
/// let store = InMemoryEntityStore::new();
/// let batch = ChangeBatch::new("example", "uow-1").with(Change::create("a", b"state".to_vec()));
/// store.apply_batch(&batch).unwrap();
/// assert!(store.contains("a").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    snapshot: RwLock<Snapshot>,
    stats: StoreStats,
}

impl InMemoryEntityStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the operation counters.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Returns the number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.read().entities.len()
    }

    /// Returns true if the store holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every record. Versions keep increasing afterwards.
    pub fn clear(&self) {
        self.snapshot.write().entities.clear();
    }
}

impl EntityStore for InMemoryEntityStore {
    fn load(&self, identity: &str) -> StorageResult<Option<StoredState>> {
        self.stats.record_load();
        Ok(self.snapshot.read().entities.get(identity).cloned())
    }

    fn apply_batch(&self, batch: &ChangeBatch) -> StorageResult<BatchOutcome> {
        let mut snapshot = self.snapshot.write();
        match snapshot.apply(batch) {
            Ok(outcome) => {
                self.stats.record_applied();
                debug!(
                    usecase = %batch.usecase,
                    unit_of_work = %batch.unit_of_work,
                    changes = batch.len(),
                    "applied batch"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.stats.record_rejected();
                warn!(usecase = %batch.usecase, unit_of_work = %batch.unit_of_work, error = %e, "rejected batch");
                Err(e)
            }
        }
    }

    fn check_versions(&self, batch: &ChangeBatch) -> StorageResult<()> {
        self.snapshot.read().check(batch)
    }

    fn contains(&self, identity: &str) -> StorageResult<bool> {
        Ok(self.snapshot.read().entities.contains_key(identity))
    }

    fn identities(&self) -> StorageResult<Vec<String>> {
        Ok(self.snapshot.read().entities.keys().cloned().collect())
    }
}

//! The storage-side half of a unit of work.

use crate::error::{CoreError, CoreResult};
use crate::reference::EntityReference;
use crate::schema::EntityTypeRegistry;
use crate::state::{EntityState, EntityStatus};
use crate::types::{Timestamp, UnitOfWorkId};
use entiwork_codec::{decode_record, encode_record, CodecError};
use entiwork_storage::{BatchOutcome, Change, ChangeBatch, EntityStore};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A storage transaction.
///
/// Owns the entity-state cache of its unit of work: exactly one
/// [`EntityState`] per reference. Nothing reaches the store until
/// [`apply`](Self::apply) produces a [`StateCommitter`] and that committer is
/// committed.
pub struct EntityStoreUnitOfWork {
    id: UnitOfWorkId,
    usecase: String,
    current_time: Timestamp,
    validate_names: bool,
    store: Arc<dyn EntityStore>,
    registry: Arc<EntityTypeRegistry>,
    states: HashMap<EntityReference, EntityState>,
}

impl EntityStoreUnitOfWork {
    /// Creates an empty storage transaction.
    pub fn new(
        id: UnitOfWorkId,
        usecase: impl Into<String>,
        current_time: Timestamp,
        store: Arc<dyn EntityStore>,
        registry: Arc<EntityTypeRegistry>,
        validate_names: bool,
    ) -> Self {
        Self {
            id,
            usecase: usecase.into(),
            current_time,
            validate_names,
            store,
            registry,
            states: HashMap::new(),
        }
    }

    /// Returns the owning unit of work's identifier.
    #[must_use]
    pub fn id(&self) -> UnitOfWorkId {
        self.id
    }

    /// Returns the time stamped on new and updated entities.
    #[must_use]
    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    /// Allocates the state of a new entity.
    ///
    /// # Errors
    ///
    /// - `EntityAlreadyExists` if the reference is cached in this transaction
    ///   or stored
    /// - `NoSuchEntityType` if the type is not registered
    /// - a storage error if the store cannot be queried
    pub fn new_entity_state(
        &mut self,
        reference: EntityReference,
        entity_type: &str,
    ) -> CoreResult<&mut EntityState> {
        let descriptor = self.registry.get(entity_type)?;
        if self.states.contains_key(&reference) || self.store.contains(reference.as_str())? {
            return Err(CoreError::entity_already_exists(reference));
        }

        let state = EntityState::new_entity(
            reference.clone(),
            descriptor,
            self.current_time,
            self.validate_names,
        );
        Ok(self.states.entry(reference).or_insert(state))
    }

    /// Returns the cached state for `reference`, loading it on a miss.
    ///
    /// Cached states are returned whatever their status.
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` if neither the cache nor the store has it
    /// - `NoSuchEntityType` if the stored record names an unregistered type
    /// - a codec or storage error if loading fails
    pub fn entity_state_of(&mut self, reference: &EntityReference) -> CoreResult<&mut EntityState> {
        if !self.states.contains_key(reference) {
            let state = self.load(reference)?;
            self.states.insert(reference.clone(), state);
        }
        self.states
            .get_mut(reference)
            .ok_or_else(|| CoreError::entity_not_found(reference.clone()))
    }

    fn load(&self, reference: &EntityReference) -> CoreResult<EntityState> {
        let stored = self
            .store
            .load(reference.as_str())?
            .ok_or_else(|| CoreError::entity_not_found(reference.clone()))?;
        let record = decode_record(&stored.payload)?;
        if record.identity != reference.as_str() {
            return Err(CoreError::Codec(CodecError::decoding_failed(format!(
                "record stored under {reference} has identity {}",
                record.identity
            ))));
        }
        let descriptor = self.registry.get(&record.entity_type)?;
        Ok(EntityState::loaded(
            reference.clone(),
            descriptor,
            stored.version,
            record,
            self.validate_names,
        ))
    }

    /// Returns the cached state for `reference` without loading.
    #[must_use]
    pub fn cached(&self, reference: &EntityReference) -> Option<&EntityState> {
        self.states.get(reference)
    }

    /// Returns cached references in ascending order.
    #[must_use]
    pub fn cached_references(&self) -> Vec<EntityReference> {
        let mut references: Vec<_> = self.states.keys().cloned().collect();
        references.sort();
        references
    }

    /// Returns the number of cached states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns true if any cached state is new, updated, or removed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.states.values().any(|s| s.status().is_changed())
    }

    /// Drops one cached state.
    pub fn evict(&mut self, reference: &EntityReference) -> Option<EntityState> {
        self.states.remove(reference)
    }

    /// Drops every unmodified cached state and returns how many were dropped.
    pub fn prune_loaded(&mut self) -> usize {
        let before = self.states.len();
        self.states
            .retain(|_, state| state.status() != EntityStatus::Loaded);
        before - self.states.len()
    }

    /// Turns every new, updated, and removed state into one change batch and
    /// validates it against the store.
    ///
    /// Changes are ordered by reference. New and updated entities are
    /// stamped with the current time.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` naming every stale entity
    /// - a codec or storage error
    pub fn apply(&mut self) -> CoreResult<StateCommitter> {
        let mut changed: Vec<&mut EntityState> = self
            .states
            .values_mut()
            .filter(|s| s.status().is_changed())
            .collect();
        changed.sort_by(|a, b| a.reference().cmp(b.reference()));

        let mut batch = ChangeBatch::new(self.usecase.clone(), self.id.to_string());
        for state in changed {
            let identity = state.reference().as_str().to_string();
            let change = match (state.status(), state.version()) {
                (EntityStatus::New, _) => {
                    state.stamp(self.current_time);
                    Change::create(identity, encode_record(&state.to_record())?)
                }
                (EntityStatus::Updated, Some(version)) => {
                    state.stamp(self.current_time);
                    Change::update(identity, version, encode_record(&state.to_record())?)
                }
                (EntityStatus::Removed, Some(version)) => Change::remove(identity, version),
                (status, _) => {
                    return Err(CoreError::invalid_operation(format!(
                        "entity {identity} is {status} but has no stored version"
                    )))
                }
            };
            batch.push(change);
        }

        if let Err(e) = self.store.check_versions(&batch) {
            let err = CoreError::from(e);
            if err.is_conflict() {
                warn!(unit_of_work = %self.id, error = %err, "version check failed");
            }
            return Err(err);
        }
        debug!(unit_of_work = %self.id, changes = batch.len(), "applied changes");
        Ok(StateCommitter::new(Arc::clone(&self.store), batch))
    }

    /// Drops the whole cache. Never touches the store.
    pub fn discard(&mut self) {
        if !self.states.is_empty() {
            debug!(unit_of_work = %self.id, cached = self.states.len(), "discarding entity states");
        }
        self.states.clear();
    }
}

impl fmt::Debug for EntityStoreUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStoreUnitOfWork")
            .field("id", &self.id)
            .field("usecase", &self.usecase)
            .field("current_time", &self.current_time)
            .field("cached", &self.states.len())
            .finish_non_exhaustive()
    }
}

/// A validated change batch waiting to be committed or cancelled.
///
/// Both [`commit`](Self::commit) and [`cancel`](Self::cancel) consume the
/// committer, so it resolves at most once. Dropping it unresolved writes
/// nothing and logs a warning.
#[must_use = "a state committer must be committed or cancelled"]
pub struct StateCommitter {
    store: Arc<dyn EntityStore>,
    batch: ChangeBatch,
    resolved: bool,
}

impl StateCommitter {
    fn new(store: Arc<dyn EntityStore>, batch: ChangeBatch) -> Self {
        Self {
            store,
            batch,
            resolved: false,
        }
    }

    /// Returns the batch this committer will write.
    #[must_use]
    pub fn batch(&self) -> &ChangeBatch {
        &self.batch
    }

    /// Writes the batch. The store re-validates every version atomically.
    ///
    /// An empty batch is not sent to the store.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if another writer got there first
    /// - a storage error if the write fails
    pub fn commit(mut self) -> CoreResult<BatchOutcome> {
        self.resolved = true;
        if self.batch.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let outcome = self.store.apply_batch(&self.batch)?;
        debug!(unit_of_work = %self.batch.unit_of_work, changes = self.batch.len(), "committed");
        Ok(outcome)
    }

    /// Abandons the batch without writing.
    pub fn cancel(mut self) {
        self.resolved = true;
        debug!(unit_of_work = %self.batch.unit_of_work, "cancelled commit");
    }
}

impl fmt::Debug for StateCommitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCommitter")
            .field("batch", &self.batch)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

impl Drop for StateCommitter {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(
                unit_of_work = %self.batch.unit_of_work,
                changes = self.batch.len(),
                "state committer dropped without commit or cancel"
            );
        }
    }
}

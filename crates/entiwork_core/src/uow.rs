//! The application-facing unit of work.

use crate::callback::{CallbackHandle, CompletionStatus, UnitOfWorkCallback};
use crate::error::{CoreError, CoreResult};
use crate::reference::EntityReference;
use crate::state::{EntityState, EntityStatus};
use crate::store_uow::EntityStoreUnitOfWork;
use crate::types::{Timestamp, UnitOfWorkId, UnitOfWorkState};
use crate::usecase::Usecase;
use entiwork_codec::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use tracing::{debug, warn};

/// A transaction over entity state.
///
/// Entities are created, fetched, and removed through the unit of work and
/// mutated through the returned [`EntityState`]. Nothing is written until
/// [`complete`](Self::complete) succeeds, and then every change is written as
/// one atomic batch. A second unit of work that changed the same entities
/// from the same starting versions fails with `ConcurrentModification`.
///
/// Dropping an open unit of work discards it.
pub struct UnitOfWork {
    id: UnitOfWorkId,
    usecase: Usecase,
    state: UnitOfWorkState,
    paused: bool,
    prune_on_pause: bool,
    metadata: BTreeMap<String, Value>,
    callbacks: Vec<(CallbackHandle, Box<dyn UnitOfWorkCallback>)>,
    next_callback: u64,
    entities: EntityStoreUnitOfWork,
}

impl UnitOfWork {
    pub(crate) fn new(
        usecase: Usecase,
        prune_on_pause: bool,
        entities: EntityStoreUnitOfWork,
    ) -> Self {
        let id = entities.id();
        debug!(unit_of_work = %id, usecase = %usecase, "unit of work created");
        Self {
            id,
            prune_on_pause: usecase.prune_on_pause().unwrap_or(prune_on_pause),
            usecase,
            state: UnitOfWorkState::Open,
            paused: false,
            metadata: BTreeMap::new(),
            callbacks: Vec::new(),
            next_callback: 0,
            entities,
        }
    }

    /// Returns the unique identifier.
    #[must_use]
    pub fn id(&self) -> UnitOfWorkId {
        self.id
    }

    /// Returns the usecase.
    #[must_use]
    pub fn usecase(&self) -> &Usecase {
        &self.usecase
    }

    /// Returns the time fixed at creation.
    #[must_use]
    pub fn current_time(&self) -> Timestamp {
        self.entities.current_time()
    }

    /// Returns the life-cycle state.
    #[must_use]
    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// Returns true while the unit of work accepts operations.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == UnitOfWorkState::Open
    }

    /// Returns true if the unit of work is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Creates a new entity of `entity_type`.
    ///
    /// A random reference is generated when `reference` is `None`.
    ///
    /// # Errors
    ///
    /// - `IllegalUnitOfWorkState` if not open or paused
    /// - `NoSuchEntityType` if the type is not registered
    /// - `EntityAlreadyExists` if the reference is in use
    pub fn new_entity(
        &mut self,
        entity_type: &str,
        reference: Option<EntityReference>,
    ) -> CoreResult<&mut EntityState> {
        self.ensure_usable("create an entity")?;
        let reference = reference.unwrap_or_else(EntityReference::generate);
        self.entities.new_entity_state(reference, entity_type)
    }

    /// Returns an entity, loading it from the store on first access.
    ///
    /// # Errors
    ///
    /// - `IllegalUnitOfWorkState` if not open or paused
    /// - `EntityNotFound` if it does not exist or was removed in this unit of work
    /// - a codec or storage error if loading fails
    pub fn get(&mut self, reference: &EntityReference) -> CoreResult<&mut EntityState> {
        self.ensure_usable("get an entity")?;
        let state = self.entities.entity_state_of(reference)?;
        if state.status() == EntityStatus::Removed {
            return Err(CoreError::entity_not_found(reference.clone()));
        }
        Ok(state)
    }

    /// Returns true if `reference` is cached and not removed.
    ///
    /// Never contacts the store.
    #[must_use]
    pub fn is_cached(&self, reference: &EntityReference) -> bool {
        self.entities
            .cached(reference)
            .is_some_and(|s| s.status() != EntityStatus::Removed)
    }

    /// Removes an entity previously created or fetched in this unit of work.
    ///
    /// Removing a new entity forgets it, so it never reaches the store.
    ///
    /// # Errors
    ///
    /// - `IllegalUnitOfWorkState` if not open or paused
    /// - `EntityNotFound` if it was never obtained here or is already removed
    pub fn remove(&mut self, reference: &EntityReference) -> CoreResult<()> {
        self.ensure_usable("remove an entity")?;
        let status = self
            .entities
            .cached(reference)
            .map(EntityState::status)
            .ok_or_else(|| CoreError::entity_not_found(reference.clone()))?;

        match status {
            EntityStatus::New => {
                self.entities.evict(reference);
            }
            EntityStatus::Loaded | EntityStatus::Updated => {
                self.entities.entity_state_of(reference)?.mark_removed();
            }
            EntityStatus::Removed => return Err(CoreError::entity_not_found(reference.clone())),
        }
        Ok(())
    }

    /// Returns true if completing would write anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.entities.has_changes()
    }

    /// Returns the references of all cached entities in ascending order.
    #[must_use]
    pub fn cached_references(&self) -> Vec<EntityReference> {
        self.entities.cached_references()
    }

    /// Returns a metadata value.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Sets a metadata value and returns the previous one.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.metadata.insert(key.into(), value.into())
    }

    /// Removes a metadata value.
    pub fn remove_metadata(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// Registers a completion callback.
    pub fn add_callback(&mut self, callback: Box<dyn UnitOfWorkCallback>) -> CallbackHandle {
        let handle = CallbackHandle(self.next_callback);
        self.next_callback += 1;
        self.callbacks.push((handle, callback));
        handle
    }

    /// Unregisters a completion callback.
    pub fn remove_callback(&mut self, handle: CallbackHandle) -> Option<Box<dyn UnitOfWorkCallback>> {
        let index = self.callbacks.iter().position(|(h, _)| *h == handle)?;
        Some(self.callbacks.remove(index).1)
    }

    /// Completes the unit of work.
    ///
    /// With no new, updated, or removed entities the store is not contacted.
    /// Otherwise the changes are validated, before-completion callbacks run,
    /// and the batch is committed. On success the state becomes `Closed`;
    /// on any failure it becomes `Discarded` and nothing is written.
    /// After-completion callbacks are notified either way.
    ///
    /// # Errors
    ///
    /// - `IllegalUnitOfWorkState` if not open or paused
    /// - `ConcurrentModification` if another unit of work wrote first
    /// - `CompletionFailed` for every other failure
    pub fn complete(&mut self) -> CoreResult<()> {
        self.ensure_usable("complete")?;
        self.state = UnitOfWorkState::Completing;

        let mut callbacks = mem::take(&mut self.callbacks);
        let result = self.complete_changes(&mut callbacks);
        self.callbacks = callbacks;
        self.entities.discard();

        match result {
            Ok(()) => {
                self.state = UnitOfWorkState::Closed;
                debug!(unit_of_work = %self.id, usecase = %self.usecase, "unit of work completed");
                self.notify_after(CompletionStatus::Completed);
                Ok(())
            }
            Err(e) => {
                self.state = UnitOfWorkState::Discarded;
                let err = e.into_completion_error(self.usecase.name());
                if err.is_conflict() {
                    warn!(unit_of_work = %self.id, error = %err, "unit of work lost a conflict");
                } else {
                    debug!(unit_of_work = %self.id, error = %err, "unit of work completion failed");
                }
                self.notify_after(CompletionStatus::Discarded);
                Err(err)
            }
        }
    }

    fn complete_changes(
        &mut self,
        callbacks: &mut [(CallbackHandle, Box<dyn UnitOfWorkCallback>)],
    ) -> CoreResult<()> {
        let committer = if self.entities.has_changes() {
            Some(self.entities.apply()?)
        } else {
            None
        };

        for (_, callback) in callbacks.iter_mut() {
            if let Err(e) = callback.before_completion(self) {
                if let Some(committer) = committer {
                    committer.cancel();
                }
                return Err(e);
            }
        }

        if let Some(committer) = committer {
            committer.commit()?;
        }
        Ok(())
    }

    /// Discards the unit of work without writing anything.
    ///
    /// Discarding a closed or discarded unit of work does nothing.
    pub fn discard(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = UnitOfWorkState::Discarded;
        self.paused = false;
        self.entities.discard();
        debug!(unit_of_work = %self.id, usecase = %self.usecase, "unit of work discarded");
        self.notify_after(CompletionStatus::Discarded);
    }

    /// Pauses the unit of work.
    ///
    /// With prune-on-pause enabled, unmodified entities are dropped from the
    /// cache and will be reloaded on next access.
    ///
    /// # Errors
    ///
    /// `IllegalUnitOfWorkState` if not open or already paused.
    pub fn pause(&mut self) -> CoreResult<()> {
        self.ensure_usable("pause")?;
        self.paused = true;
        let pruned = if self.prune_on_pause {
            self.entities.prune_loaded()
        } else {
            0
        };
        debug!(unit_of_work = %self.id, pruned, "unit of work paused");
        Ok(())
    }

    /// Resumes a paused unit of work.
    ///
    /// # Errors
    ///
    /// `IllegalUnitOfWorkState` if not open or not paused.
    pub fn resume(&mut self) -> CoreResult<()> {
        if self.state != UnitOfWorkState::Open || !self.paused {
            return Err(self.illegal_state("resume"));
        }
        self.paused = false;
        debug!(unit_of_work = %self.id, "unit of work resumed");
        Ok(())
    }

    fn notify_after(&mut self, status: CompletionStatus) {
        for (_, callback) in &mut self.callbacks {
            callback.after_completion(status);
        }
    }

    fn ensure_usable(&self, operation: &'static str) -> CoreResult<()> {
        if self.state == UnitOfWorkState::Open && !self.paused {
            Ok(())
        } else {
            Err(self.illegal_state(operation))
        }
    }

    fn illegal_state(&self, operation: &'static str) -> CoreError {
        CoreError::IllegalUnitOfWorkState {
            state: self.state,
            paused: self.paused,
            operation,
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("usecase", &self.usecase)
            .field("state", &self.state)
            .field("paused", &self.paused)
            .field("entities", &self.entities)
            .finish_non_exhaustive()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(unit_of_work = %self.id, usecase = %self.usecase, "open unit of work dropped; discarding");
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::factory::UnitOfWorkFactory;
    use crate::schema::{EntityDescriptor, EntityTypeRegistry};
    use entiwork_storage::{EntityStore, InMemoryEntityStore};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn registry() -> EntityTypeRegistry {
        EntityTypeRegistry::from_descriptors([EntityDescriptor::builder("Person")
            .property("name")
            .many_association("friends")
            .build()])
        .unwrap()
    }

    fn factory_with(config: Config) -> (Arc<InMemoryEntityStore>, UnitOfWorkFactory) {
        let store = Arc::new(InMemoryEntityStore::new());
        let factory = UnitOfWorkFactory::new(Arc::clone(&store) as Arc<dyn EntityStore>, registry(), config);
        (store, factory)
    }

    fn factory() -> (Arc<InMemoryEntityStore>, UnitOfWorkFactory) {
        factory_with(Config::default())
    }

    fn create(factory: &UnitOfWorkFactory, id: &str, name: &str) {
        let mut uow = factory.new_unit_of_work();
        uow.new_entity("Person", Some(id.into()))
            .unwrap()
            .set_property("name", name)
            .unwrap();
        uow.complete().unwrap();
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
        fail_before: bool,
    }

    impl UnitOfWorkCallback for Recorder {
        fn before_completion(&mut self, uow: &UnitOfWork) -> CoreResult<()> {
            self.events.lock().push(format!("before:{}", uow.state()));
            if self.fail_before {
                Err(CoreError::invalid_operation("vetoed"))
            } else {
                Ok(())
            }
        }

        fn after_completion(&mut self, status: CompletionStatus) {
            self.events.lock().push(format!("after:{status:?}"));
        }
    }

    #[test]
    fn read_your_writes() {
        let (_, factory) = factory();
        let mut uow = factory.new_unit_of_work();
        let reference = uow.new_entity("Person", None).unwrap().reference().clone();
        uow.get(&reference).unwrap().set_property("name", "foo").unwrap();
        assert_eq!(
            uow.get(&reference).unwrap().property("name"),
            Some(&Value::from("foo"))
        );
    }

    #[test]
    fn no_op_completion_skips_store() {
        let (store, factory) = factory();
        create(&factory, "p1", "foo");
        let applied = store.stats().batches_applied();

        let mut uow = factory.new_unit_of_work();
        uow.get(&"p1".into()).unwrap();
        uow.get(&"p1".into()).unwrap().set_property("name", "foo").unwrap();
        uow.complete().unwrap();

        assert_eq!(store.stats().batches_applied(), applied);
        assert_eq!(uow.state(), UnitOfWorkState::Closed);
    }

    #[test]
    fn discarded_unit_of_work_rejects_operations() {
        let (store, factory) = factory();
        let mut uow = factory.new_unit_of_work();
        uow.new_entity("Person", Some("p1".into())).unwrap();
        uow.discard();
        uow.discard();

        assert!(matches!(
            uow.get(&"p1".into()),
            Err(CoreError::IllegalUnitOfWorkState { state: UnitOfWorkState::Discarded, .. })
        ));
        assert!(matches!(
            uow.new_entity("Person", None),
            Err(CoreError::IllegalUnitOfWorkState { .. })
        ));
        assert!(uow.complete().is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_new_entity_evicts_it() {
        let (store, factory) = factory();
        let mut uow = factory.new_unit_of_work();
        let reference = EntityReference::new("p1");
        uow.new_entity("Person", Some(reference.clone())).unwrap();
        uow.remove(&reference).unwrap();

        assert!(!uow.is_cached(&reference));
        assert!(!uow.has_changes());
        uow.complete().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn removed_entity_is_not_found() {
        let (store, factory) = factory();
        create(&factory, "p1", "foo");

        let mut uow = factory.new_unit_of_work();
        let reference = EntityReference::new("p1");
        uow.get(&reference).unwrap();
        uow.remove(&reference).unwrap();

        assert!(matches!(uow.get(&reference), Err(CoreError::EntityNotFound { .. })));
        assert!(matches!(uow.remove(&reference), Err(CoreError::EntityNotFound { .. })));
        uow.complete().unwrap();
        assert!(!store.contains("p1").unwrap());
    }

    #[test]
    fn remove_requires_prior_access() {
        let (_, factory) = factory();
        create(&factory, "p1", "foo");

        let mut uow = factory.new_unit_of_work();
        assert!(matches!(
            uow.remove(&"p1".into()),
            Err(CoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn losing_completion_is_discarded() {
        let (_, factory) = factory();
        create(&factory, "p1", "foo");
        let reference = EntityReference::new("p1");

        let mut first = factory.new_unit_of_work_for("first".into());
        let mut second = factory.new_unit_of_work_for("second".into());
        first.get(&reference).unwrap().set_property("name", "x").unwrap();
        second.get(&reference).unwrap().set_property("name", "y").unwrap();

        first.complete().unwrap();
        match second.complete().unwrap_err() {
            CoreError::ConcurrentModification { identities, usecase } => {
                assert_eq!(identities, vec![reference.clone()]);
                assert_eq!(usecase.as_deref(), Some("second"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(second.state(), UnitOfWorkState::Discarded);

        let mut check = factory.new_unit_of_work();
        assert_eq!(
            check.get(&reference).unwrap().property("name"),
            Some(&Value::from("x"))
        );
    }

    #[test]
    fn callbacks_run_in_order() {
        let (_, factory) = factory();
        let recorder = Recorder::default();
        let mut uow = factory.new_unit_of_work();
        uow.add_callback(Box::new(recorder.clone()));
        uow.new_entity("Person", None).unwrap();
        uow.complete().unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["before:completing".to_string(), "after:Completed".to_string()]
        );
    }

    #[test]
    fn vetoing_callback_cancels_commit() {
        let (store, factory) = factory();
        let recorder = Recorder {
            fail_before: true,
            ..Recorder::default()
        };
        let mut uow = factory.new_unit_of_work_for("veto".into());
        uow.add_callback(Box::new(recorder.clone()));
        uow.new_entity("Person", None).unwrap();

        let err = uow.complete().unwrap_err();
        assert!(matches!(err, CoreError::CompletionFailed { ref usecase, .. } if usecase == "veto"));
        assert_eq!(uow.state(), UnitOfWorkState::Discarded);
        assert!(store.is_empty());
        assert_eq!(recorder.events.lock().last().map(String::as_str), Some("after:Discarded"));
    }

    #[test]
    fn removed_callback_is_not_called() {
        let (_, factory) = factory();
        let recorder = Recorder::default();
        let mut uow = factory.new_unit_of_work();
        let handle = uow.add_callback(Box::new(recorder.clone()));
        assert!(uow.remove_callback(handle).is_some());
        assert!(uow.remove_callback(handle).is_none());
        uow.complete().unwrap();
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn discard_notifies_once() {
        let (_, factory) = factory();
        let recorder = Recorder::default();
        let mut uow = factory.new_unit_of_work();
        uow.add_callback(Box::new(recorder.clone()));
        uow.discard();
        uow.discard();
        drop(uow);
        assert_eq!(*recorder.events.lock(), vec!["after:Discarded".to_string()]);
    }

    #[test]
    fn drop_discards_open_unit_of_work() {
        let (store, factory) = factory();
        let recorder = Recorder::default();
        {
            let mut uow = factory.new_unit_of_work();
            uow.add_callback(Box::new(recorder.clone()));
            uow.new_entity("Person", None).unwrap();
        }
        assert!(store.is_empty());
        assert_eq!(*recorder.events.lock(), vec!["after:Discarded".to_string()]);
    }

    #[test]
    fn pause_and_resume() {
        let (_, factory) = factory();
        let mut uow = factory.new_unit_of_work();
        uow.pause().unwrap();
        assert!(uow.is_paused());
        assert!(matches!(
            uow.new_entity("Person", None),
            Err(CoreError::IllegalUnitOfWorkState { paused: true, .. })
        ));
        assert!(uow.pause().is_err());
        uow.resume().unwrap();
        assert!(uow.resume().is_err());
        uow.new_entity("Person", None).unwrap();
    }

    #[test]
    fn prune_on_pause_from_usecase_overrides_config() {
        let (_, factory) = factory();
        create(&factory, "p1", "foo");
        create(&factory, "p2", "bar");

        let mut uow = factory.new_unit_of_work_for(Usecase::new("prune").with_prune_on_pause(true));
        uow.get(&"p1".into()).unwrap();
        uow.get(&"p2".into()).unwrap().set_property("name", "baz").unwrap();
        uow.pause().unwrap();
        uow.resume().unwrap();

        assert_eq!(uow.cached_references(), vec![EntityReference::new("p2")]);
        // Pruned entities reload transparently.
        assert_eq!(uow.get(&"p1".into()).unwrap().property("name"), Some(&Value::from("foo")));
    }

    #[test]
    fn no_prune_by_default() {
        let (_, factory) = factory();
        create(&factory, "p1", "foo");

        let mut uow = factory.new_unit_of_work();
        uow.get(&"p1".into()).unwrap();
        uow.pause().unwrap();
        assert_eq!(uow.cached_references(), vec![EntityReference::new("p1")]);
    }

    #[test]
    fn metadata_bag() {
        let (_, factory) = factory();
        let mut uow = factory.new_unit_of_work();
        assert!(uow.set_metadata("user", "alice").is_none());
        assert_eq!(uow.metadata("user"), Some(&Value::from("alice")));
        assert_eq!(uow.remove_metadata("user"), Some(Value::from("alice")));
        assert!(uow.metadata("user").is_none());
    }

    #[test]
    fn current_time_stamps_entities() {
        let (store, factory) = factory();
        let mut uow = factory.new_unit_of_work_at(Usecase::default(), Timestamp::from_millis(42));
        uow.new_entity("Person", Some("p1".into())).unwrap();
        uow.complete().unwrap();

        let stored = store.load("p1").unwrap().unwrap();
        let record = entiwork_codec::decode_record(&stored.payload).unwrap();
        assert_eq!(record.last_modified, 42);
    }

    #[test]
    fn unit_of_work_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<UnitOfWork>();
    }
}

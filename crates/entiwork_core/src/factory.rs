//! Creates units of work bound to one store and one type registry.

use crate::config::Config;
use crate::schema::EntityTypeRegistry;
use crate::store_uow::EntityStoreUnitOfWork;
use crate::types::{Timestamp, UnitOfWorkId};
use crate::uow::UnitOfWork;
use crate::usecase::Usecase;
use entiwork_storage::EntityStore;
use std::fmt;
use std::sync::Arc;

/// Factory for [`UnitOfWork`]s.
///
/// Cheap to clone; clones share the store and the registry. Hand one clone
/// to each thread.
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    store: Arc<dyn EntityStore>,
    registry: Arc<EntityTypeRegistry>,
    config: Config,
}

impl UnitOfWorkFactory {
    /// Creates a factory.
    pub fn new(store: Arc<dyn EntityStore>, registry: EntityTypeRegistry, config: Config) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            config,
        }
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Returns the type registry.
    #[must_use]
    pub fn registry(&self) -> &EntityTypeRegistry {
        &self.registry
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts a unit of work for the default usecase at the current time.
    #[must_use]
    pub fn new_unit_of_work(&self) -> UnitOfWork {
        self.new_unit_of_work_for(Usecase::default())
    }

    /// Starts a unit of work for `usecase` at the current time.
    #[must_use]
    pub fn new_unit_of_work_for(&self, usecase: Usecase) -> UnitOfWork {
        self.new_unit_of_work_at(usecase, Timestamp::now())
    }

    /// Starts a unit of work for `usecase` with a fixed current time.
    #[must_use]
    pub fn new_unit_of_work_at(&self, usecase: Usecase, current_time: Timestamp) -> UnitOfWork {
        let entities = EntityStoreUnitOfWork::new(
            UnitOfWorkId::new(),
            usecase.name(),
            current_time,
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.config.validate_state_names,
        );
        UnitOfWork::new(usecase, self.config.prune_on_pause, entities)
    }
}

impl fmt::Debug for UnitOfWorkFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWorkFactory")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

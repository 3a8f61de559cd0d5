//! # EntiWork Core
//!
//! Units of work over pluggable entity stores.
//!
//! This crate provides:
//! - Entity identity and versioned entity state
//! - The storage-side transaction and its apply/commit protocol
//! - The application-facing [`UnitOfWork`] with optimistic concurrency
//! - Nested units of work through an explicit [`UnitOfWorkStack`]
//! - An opt-in retry helper for conflicts
//!
//! ## Example
//!
//! ```rust
//! use entiwork_core::{Config, EntityDescriptor, EntityTypeRegistry, UnitOfWorkFactory, Value};
//! use entiwork_storage::InMemoryEntityStore;
//! use std::sync::Arc;
//!
//! let mut registry = EntityTypeRegistry::new();
//! registry
//!     .register(EntityDescriptor::builder("Person").property("name").build())
//!     .unwrap();
//! let factory = UnitOfWorkFactory::new(
//!     Arc::new(InMemoryEntityStore::new()),
//!     registry,
//!     Config::default(),
//! );
//!
//! let mut uow = factory.new_unit_of_work();
//! let person = uow.new_entity("Person", None).unwrap();
//! person.set_property("name", "foo").unwrap();
//! let reference = person.reference().clone();
//! uow.complete().unwrap();
//!
//! let mut uow = factory.new_unit_of_work();
//! assert_eq!(
//!     uow.get(&reference).unwrap().property("name"),
//!     Some(&Value::from("foo"))
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod callback;
mod config;
mod error;
mod factory;
mod propagation;
mod reference;
mod retry;
mod schema;
mod state;
mod store_uow;
mod types;
mod uow;
mod usecase;

pub use callback::{CallbackHandle, CompletionStatus, UnitOfWorkCallback};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use factory::UnitOfWorkFactory;
pub use propagation::{Propagation, UnitOfWorkStack};
pub use reference::EntityReference;
pub use retry::{retry_on_conflict, RetryPolicy};
pub use schema::{EntityDescriptor, EntityDescriptorBuilder, EntityTypeRegistry};
pub use state::{EntityState, EntityStatus};
pub use store_uow::{EntityStoreUnitOfWork, StateCommitter};
pub use types::{Timestamp, UnitOfWorkId, UnitOfWorkState};
pub use uow::UnitOfWork;
pub use usecase::{Usecase, DEFAULT_USECASE};

pub use entiwork_codec::Value;
pub use entiwork_storage::{EntityStore, Version};

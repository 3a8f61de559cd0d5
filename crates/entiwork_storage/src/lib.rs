//! # EntiWork Storage
//!
//! The entity store contract and reference implementations for EntiWork.
//!
//! An entity store keeps one opaque payload and one version per identity.
//! Writes arrive as [`ChangeBatch`]es that are validated and applied
//! atomically: if any change was made against a stale version, the whole
//! batch is rejected with [`StorageError::ConcurrentModification`].
//!
//! ## Design Principles
//!
//! - Stores never interpret payloads
//! - The version check and the write happen under one lock
//! - Must be `Send + Sync` for shared access
//!
//! ## Available Stores
//!
//! - [`InMemoryEntityStore`] - For testing and ephemeral state
//! - [`FileEntityStore`] - Snapshot file in a locked directory
//!
//! ## Example
//!
//! ```rust
//! use entiwork_storage::{Change, ChangeBatch, EntityStore, InMemoryEntityStore};
//!
//! let store = InMemoryEntityStore::new();
//! let created = store
//!     .apply_batch(&ChangeBatch::new("example", "uow-1").with(Change::create("a", b"v1".to_vec())))
//!     .unwrap();
//! let version = created.version_of("a").unwrap();
//!
//! // A second writer holding the same version loses.
//! let first = ChangeBatch::new("example", "uow-2").with(Change::update("a", version, b"v2".to_vec()));
//! let second = ChangeBatch::new("example", "uow-3").with(Change::update("a", version, b"v3".to_vec()));
//! store.apply_batch(&first).unwrap();
//! assert!(store.apply_batch(&second).unwrap_err().is_conflict());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod error;
mod file;
mod memory;
mod snapshot;
mod stats;
mod version;

pub use backend::EntityStore;
pub use batch::{BatchOutcome, Change, ChangeBatch};
pub use error::{StorageError, StorageResult};
pub use file::{FileEntityStore, SNAPSHOT_FORMAT_VERSION};
pub use memory::InMemoryEntityStore;
pub use stats::StoreStats;
pub use version::{StoredState, Version};

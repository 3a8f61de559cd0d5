//! Error types for entity store operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during entity store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// One or more changes in a batch were made against a stale version.
    ///
    /// The whole batch was rejected; nothing was written.
    #[error("concurrent modification of {}", identities.join(", "))]
    ConcurrentModification {
        /// Identities whose durable version did not match the expected one.
        identities: Vec<String>,
    },

    /// The batch itself is malformed (duplicate identity, tombstone for a
    /// never-stored entity).
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// The store's persistent data is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Snapshot serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Another process holds the store's lock.
    #[error("store is locked by another process")]
    Locked,
}

impl StorageError {
    /// Create a concurrent modification error.
    pub fn concurrent_modification(identities: Vec<String>) -> Self {
        Self::ConcurrentModification { identities }
    }

    /// Create an invalid batch error.
    pub fn invalid_batch(msg: impl Into<String>) -> Self {
        Self::InvalidBatch(msg.into())
    }

    /// Create a corruption error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Returns true if this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

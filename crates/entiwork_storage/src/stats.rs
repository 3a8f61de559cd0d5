//! Store counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters kept by the reference stores.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    loads: AtomicU64,
    batches_applied: AtomicU64,
    batches_rejected: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        self.batches_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of `load` calls.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Number of batches written.
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied.load(Ordering::Relaxed)
    }

    /// Number of batches rejected by validation.
    pub fn batches_rejected(&self) -> u64 {
        self.batches_rejected.load(Ordering::Relaxed)
    }
}

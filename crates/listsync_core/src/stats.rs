//! Entity store statistics.
//!
//! All counters are atomic and can be read while writes are in progress.

use std::sync::atomic::{AtomicU64, Ordering};

/// Entity store counters.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Batches committed (one record-store flush each).
    flushes: AtomicU64,
    /// Batches rolled back after a storage failure.
    rollbacks: AtomicU64,
    /// List records written.
    lists_written: AtomicU64,
    /// Item records written.
    items_written: AtomicU64,
    /// Records deleted.
    deletes: AtomicU64,
    /// Orphaned items dropped on load.
    orphans_dropped: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_flush(&self, lists: u64, items: u64, deletes: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.lists_written.fetch_add(lists, Ordering::Relaxed);
        self.items_written.fetch_add(items, Ordering::Relaxed);
        self.deletes.fetch_add(deletes, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_orphans(&self, count: u64) {
        self.orphans_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of committed batches.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns the number of rolled-back batches.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of list records written.
    pub fn lists_written(&self) -> u64 {
        self.lists_written.load(Ordering::Relaxed)
    }

    /// Returns the number of item records written.
    pub fn items_written(&self) -> u64 {
        self.items_written.load(Ordering::Relaxed)
    }

    /// Returns the number of records deleted.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of orphaned items dropped on load.
    pub fn orphans_dropped(&self) -> u64 {
        self.orphans_dropped.load(Ordering::Relaxed)
    }
}

//! Record store trait definition.

use crate::error::StorageResult;
use crate::record::{Collection, Record, RecordKey, WriteBatch};

/// A transactional keyed record store.
///
/// Record stores hold **opaque payloads**. They do not know what a list or an
/// item is; the entity store owns all payload interpretation.
///
/// # Invariants
///
/// - `save` is atomic: after an error nothing from the batch is visible
/// - `fetch` returns records in key order
/// - Every successful `save` is exactly one flush
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryRecordStore`] - For testing
/// - [`super::FileRecordStore`] - For persistent storage
pub trait RecordStore: Send + Sync {
    /// Returns the container identifier this store was opened with.
    fn container(&self) -> &str;

    /// Returns every record matching `predicate`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn fetch(&self, predicate: &dyn Fn(&Record) -> bool) -> StorageResult<Vec<Record>>;

    /// Applies a batch atomically and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be made durable. In that case
    /// none of its operations are applied.
    fn save(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Returns the number of successful flushes since the store was opened.
    fn flush_count(&self) -> u64;

    /// Returns every record of one collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn fetch_collection(&self, collection: Collection) -> StorageResult<Vec<Record>> {
        self.fetch(&|record| record.key.collection == collection)
    }

    /// Returns a single record by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn get(&self, key: &RecordKey) -> StorageResult<Option<Record>> {
        Ok(self.fetch(&|record| &record.key == key)?.into_iter().next())
    }
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn container(&self) -> &str {
        (**self).container()
    }

    fn fetch(&self, predicate: &dyn Fn(&Record) -> bool) -> StorageResult<Vec<Record>> {
        (**self).fetch(predicate)
    }

    fn save(&self, batch: WriteBatch) -> StorageResult<()> {
        (**self).save(batch)
    }

    fn flush_count(&self) -> u64 {
        (**self).flush_count()
    }
}

//! In-memory record store for testing.

use crate::error::{StorageError, StorageResult};
use crate::record::{Record, RecordKey, RecordOp, WriteBatch};
use crate::store::RecordStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An in-memory record store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral replicas that don't need persistence
///
/// A write failure can be injected with [`fail_next_save`](Self::fail_next_save)
/// to exercise rollback paths.
///
/// # Example
///
/// ```rust
/// use listsync_storage::{Collection, InMemoryRecordStore, RecordKey, RecordStore, WriteBatch};
///
/// let store = InMemoryRecordStore::new();
/// let mut batch = WriteBatch::new();
/// batch.put(RecordKey::new(Collection::Items, "i1"), b"data".to_vec());
/// store.save(batch).unwrap();
/// assert_eq!(store.flush_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    container: String,
    records: RwLock<BTreeMap<RecordKey, Vec<u8>>>,
    flushes: AtomicU64,
    fail_next: AtomicBool,
}

impl InMemoryRecordStore {
    /// Creates a new empty store with an anonymous container.
    #[must_use]
    pub fn new() -> Self {
        Self::open("memory")
    }

    /// Creates a new empty store addressed by `container`.
    #[must_use]
    pub fn open(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..Self::default()
        }
    }

    /// Creates a store pre-populated with records.
    ///
    /// Useful for testing load-time repair.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(record.key, record.payload);
            }
        }
        store
    }

    /// Makes the next `save` fail with [`StorageError::Rejected`].
    pub fn fail_next_save(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn container(&self) -> &str {
        &self.container
    }

    fn fetch(&self, predicate: &dyn Fn(&Record) -> bool) -> StorageResult<Vec<Record>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .map(|(key, payload)| Record::new(key.clone(), payload.clone()))
            .filter(|record| predicate(record))
            .collect())
    }

    fn save(&self, batch: WriteBatch) -> StorageResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Rejected("injected failure".into()));
        }

        let mut records = self.records.write();
        for op in batch.into_ops() {
            match op {
                RecordOp::Put(record) => {
                    records.insert(record.key, record.payload);
                }
                RecordOp::Delete(key) => {
                    records.remove(&key);
                }
            }
        }
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Collection;

    fn key(id: &str) -> RecordKey {
        RecordKey::new(Collection::Lists, id)
    }

    #[test]
    fn save_and_fetch() {
        let store = InMemoryRecordStore::open("group.test");
        let mut batch = WriteBatch::new();
        batch.put(key("b"), vec![2]);
        batch.put(key("a"), vec![1]);
        batch.put(RecordKey::new(Collection::Items, "x"), vec![3]);
        store.save(batch).unwrap();

        let lists = store.fetch_collection(Collection::Lists).unwrap();
        assert_eq!(lists.len(), 2);
        // Key order
        assert_eq!(lists[0].key.id, "a");
        assert_eq!(store.container(), "group.test");
    }

    #[test]
    fn delete_absent_is_noop() {
        let store = InMemoryRecordStore::new();
        let mut batch = WriteBatch::new();
        batch.delete(key("missing"));
        store.save(batch).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn injected_failure_applies_nothing() {
        let store = InMemoryRecordStore::new();
        store.fail_next_save();

        let mut batch = WriteBatch::new();
        batch.put(key("a"), vec![1]);
        let result = store.save(batch);

        assert!(matches!(result, Err(StorageError::Rejected(_))));
        assert!(store.is_empty());
        assert_eq!(store.flush_count(), 0);

        // Only the next save fails
        let mut batch = WriteBatch::new();
        batch.put(key("a"), vec![1]);
        store.save(batch).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_by_key() {
        let store = InMemoryRecordStore::with_records([Record::new(key("a"), vec![9])]);
        assert_eq!(store.get(&key("a")).unwrap().unwrap().payload, vec![9]);
        assert!(store.get(&key("b")).unwrap().is_none());
    }
}

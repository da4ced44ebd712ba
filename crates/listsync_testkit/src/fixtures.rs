//! Replica fixtures and snapshot builders.
//!
//! Every fixture runs on a [`ManualClock`], so timestamps only move when a
//! test moves them.

use listsync_core::{
    EntityStore, Item, List, ListId, ListSnapshot, ManualClock, Snapshot, StoreConfig, Timestamp,
};
use listsync_storage::{FileRecordStore, InMemoryRecordStore, RecordStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Where fixture clocks start: 2023-11-14T22:13:20Z.
pub const START: Timestamp = Timestamp::from_millis(1_700_000_000_000);

/// Container identifier used by file-backed fixtures.
pub const CONTAINER: &str = "group.lists.test";

/// A replica's entity store with its clock and record store at hand.
pub struct TestReplica {
    /// The entity store.
    pub store: Arc<EntityStore>,
    /// The clock the store bumps timestamps with.
    pub clock: Arc<ManualClock>,
    /// The record store behind the entity store.
    pub records: Arc<dyn RecordStore>,
    /// Set for in-memory replicas, to inject save failures.
    memory: Option<Arc<InMemoryRecordStore>>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestReplica {
    /// Creates a replica over an in-memory record store.
    pub fn memory() -> Self {
        let memory = Arc::new(InMemoryRecordStore::open(CONTAINER));
        let records: Arc<dyn RecordStore> = memory.clone();
        let clock = Arc::new(ManualClock::new(START));
        Self {
            store: open_store(records.clone(), clock.clone()),
            clock,
            records,
            memory: Some(memory),
            _temp_dir: None,
        }
    }

    /// Creates a replica over a file record store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let records: Arc<dyn RecordStore> = Arc::new(
            FileRecordStore::open(temp_dir.path(), CONTAINER).expect("Failed to open file store"),
        );
        let clock = Arc::new(ManualClock::new(START));
        Self {
            store: open_store(records.clone(), clock.clone()),
            clock,
            records,
            memory: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the root directory if file-based, None if in-memory.
    pub fn root(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns the container directory if file-based.
    pub fn container_path(&self) -> Option<PathBuf> {
        self.root().map(|root| root.join(CONTAINER))
    }

    /// Makes the next record store save fail. In-memory replicas only.
    pub fn fail_next_save(&self) {
        self.memory
            .as_ref()
            .expect("Save failures need an in-memory replica")
            .fail_next_save();
    }

    /// Opens a second entity store over the same records and clock, as a
    /// process restart would.
    ///
    /// File-backed replicas release their directory lock first.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            clock,
            records,
            memory,
            _temp_dir,
        } = self;
        drop(store);
        let records = match &_temp_dir {
            Some(temp_dir) => {
                drop(records);
                Arc::new(
                    FileRecordStore::open(temp_dir.path(), CONTAINER)
                        .expect("Failed to reopen file store"),
                ) as Arc<dyn RecordStore>
            }
            None => records,
        };
        Self {
            store: open_store(records.clone(), clock.clone()),
            clock,
            records,
            memory,
            _temp_dir,
        }
    }

    /// Stores every list and item of `snapshot` as given, in one batch.
    pub fn load(&self, snapshot: &Snapshot) {
        load_verbatim(&self.store, snapshot);
    }

    /// Moves the clock forward.
    pub fn advance(&self, millis: i64) {
        self.clock.advance(millis);
    }
}

impl std::ops::Deref for TestReplica {
    type Target = EntityStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn open_store(records: Arc<dyn RecordStore>, clock: Arc<ManualClock>) -> Arc<EntityStore> {
    Arc::new(EntityStore::open(records, clock, StoreConfig::default()).expect("Failed to open store"))
}

/// Stores every list and item of `snapshot` with their timestamps untouched.
pub fn load_verbatim(store: &EntityStore, snapshot: &Snapshot) {
    store
        .batch(|txn| {
            for entry in &snapshot.lists {
                txn.put_list(entry.list.clone());
            }
            for entry in &snapshot.lists {
                for item in &entry.items {
                    txn.put_item(item.clone())?;
                }
            }
            Ok(())
        })
        .expect("Failed to load snapshot");
}

/// Runs a test with a fresh in-memory replica.
pub fn with_replica<F, R>(f: F) -> R
where
    F: FnOnce(&TestReplica) -> R,
{
    let replica = TestReplica::memory();
    f(&replica)
}

/// Returns the time `millis` after [`START`].
pub fn at(millis: i64) -> Timestamp {
    Timestamp::from_millis(START.as_millis() + millis)
}

/// Builds snapshots with explicit timestamps.
///
/// ```rust
/// use listsync_testkit::SnapshotBuilder;
///
/// let snapshot = SnapshotBuilder::new()
///     .list("Groceries", 10)
///     .item("Milk", 20)
///     .item("Bread", 30)
///     .list("Hardware", 40)
///     .build();
/// assert_eq!(snapshot.len(), 2);
/// assert_eq!(snapshot.item_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    lists: Vec<ListSnapshot>,
}

impl SnapshotBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new list modified `millis` after [`START`].
    pub fn list(mut self, name: &str, millis: i64) -> Self {
        let order = self.lists.len() as u32;
        self.lists
            .push(ListSnapshot::new(List::new(name, order, at(millis)), Vec::new()));
        self
    }

    /// Adds an archived list modified `millis` after [`START`].
    pub fn archived_list(mut self, name: &str, millis: i64) -> Self {
        let order = self.lists.len() as u32;
        let mut list = List::new(name, order, at(millis));
        list.is_archived = true;
        self.lists.push(ListSnapshot::new(list, Vec::new()));
        self
    }

    /// Adds an item to the last list, modified `millis` after [`START`].
    ///
    /// # Panics
    ///
    /// Panics if no list has been started.
    pub fn item(mut self, title: &str, millis: i64) -> Self {
        let entry = self.lists.last_mut().expect("Start a list before adding items");
        let order = entry.items.len() as u32;
        entry.items.push(Item::new(entry.list.id, title, order, at(millis)));
        self
    }

    /// Adds `count` items titled `item N` to the last list.
    pub fn items(mut self, count: usize, millis: i64) -> Self {
        for n in 0..count {
            self = self.item(&format!("item {n}"), millis);
        }
        self
    }

    /// Returns the id of the last list started.
    pub fn last_list_id(&self) -> Option<ListId> {
        self.lists.last().map(|entry| entry.list.id)
    }

    /// Finishes the snapshot.
    pub fn build(self) -> Snapshot {
        Snapshot::new(self.lists)
    }
}

/// Returns a copy of `snapshot` keeping only the lists in `keep`.
pub fn keep_lists(snapshot: &Snapshot, keep: &[ListId]) -> Snapshot {
    Snapshot::new(
        snapshot
            .lists
            .iter()
            .filter(|entry| keep.contains(&entry.list.id))
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_core::Clock;

    #[test]
    fn memory_replica_starts_empty() {
        with_replica(|replica| {
            assert_eq!(replica.list_count(), 0);
            assert_eq!(replica.clock.now(), START);
        });
    }

    #[test]
    fn load_keeps_timestamps() {
        let replica = TestReplica::memory();
        let snapshot = SnapshotBuilder::new().list("Groceries", 10).item("Milk", 20).build();
        replica.load(&snapshot);
        assert_eq!(replica.snapshot(), snapshot);
    }

    #[test]
    fn file_replica_survives_reopen() {
        let replica = TestReplica::file();
        let list = replica.create_list("Groceries").unwrap();
        replica.create_item(list.id, "Milk").unwrap();
        assert!(replica.container_path().unwrap().exists());

        let reopened = replica.reopen();
        assert_eq!(reopened.list_count(), 1);
        assert_eq!(reopened.item_count(), 1);
    }

    #[test]
    fn memory_replica_survives_reopen() {
        let replica = TestReplica::memory();
        replica.create_list("Groceries").unwrap();
        let reopened = replica.reopen();
        assert_eq!(reopened.list_count(), 1);
    }
}

//! The entity store facade and load-time repair.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{Item, List, ListSnapshot, Snapshot};
use crate::stats::StoreStats;
use crate::transaction::{StoreTransaction, Upserted};
use crate::types::{ItemId, ListId};
use listsync_storage::{Collection, InMemoryRecordStore, RecordKey, RecordStore, WriteBatch};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Committed in-memory state.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) lists: HashMap<ListId, List>,
    pub(crate) items: HashMap<ItemId, Item>,
    /// Items owned by each list.
    pub(crate) children: HashMap<ListId, BTreeSet<ItemId>>,
}

impl StoreState {
    pub(crate) fn insert_list(&mut self, list: List) {
        self.children.entry(list.id).or_default();
        self.lists.insert(list.id, list);
    }

    pub(crate) fn insert_item(&mut self, item: Item) {
        if let Some(previous) = self.items.get(&item.id) {
            if previous.list_id != item.list_id {
                if let Some(children) = self.children.get_mut(&previous.list_id) {
                    children.remove(&item.id);
                }
            }
        }
        self.children.entry(item.list_id).or_default().insert(item.id);
        self.items.insert(item.id, item);
    }

    pub(crate) fn remove_item(&mut self, id: &ItemId) {
        if let Some(item) = self.items.remove(id) {
            if let Some(children) = self.children.get_mut(&item.list_id) {
                children.remove(id);
            }
        }
    }

    pub(crate) fn remove_list(&mut self, id: &ListId) {
        self.lists.remove(id);
        if let Some(children) = self.children.remove(id) {
            for item_id in children {
                self.items.remove(&item_id);
            }
        }
    }

    fn items_of(&self, list_id: &ListId) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .children
            .get(list_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.items.get(id).cloned())
            .collect();
        items.sort_by(|a, b| (a.order_number, a.id).cmp(&(b.order_number, b.id)));
        items
    }

    fn snapshot(&self, include_archived: bool) -> Snapshot {
        let mut lists: Vec<&List> = self
            .lists
            .values()
            .filter(|list| include_archived || !list.is_archived)
            .collect();
        lists.sort_by(|a, b| (a.order_number, a.id).cmp(&(b.order_number, b.id)));
        Snapshot::new(
            lists
                .into_iter()
                .map(|list| ListSnapshot::new(list.clone(), self.items_of(&list.id)))
                .collect(),
        )
    }
}

/// The authoritative local state of a replica.
///
/// `EntityStore` keeps every list and item in memory and persists changes to
/// a [`RecordStore`]. All writes go through [`EntityStore::batch`]:
///
/// - Writers are serialized by a single writer lock
/// - A batch is persisted with exactly one record-store flush
/// - If the flush fails nothing is applied and the batch is rolled back
/// - Readers see the state before or after a batch, never in between
///
/// # Example
///
/// ```rust
/// use listsync_core::EntityStore;
///
/// let store = EntityStore::open_in_memory().unwrap();
/// let list = store.create_list("Groceries").unwrap();
/// store.create_item(list.id, "Milk").unwrap();
///
/// let snapshot = store.snapshot();
/// assert_eq!(snapshot.len(), 1);
/// assert_eq!(snapshot.item_count(), 1);
/// ```
pub struct EntityStore {
    /// Configuration.
    config: StoreConfig,
    /// Backing record store.
    records: Arc<dyn RecordStore>,
    /// Time source for timestamp bumps.
    clock: Arc<dyn Clock>,
    /// Committed state.
    state: RwLock<StoreState>,
    /// Serializes writers.
    writer: Mutex<()>,
    /// Counters.
    stats: StoreStats,
    /// Incremented on every committed batch.
    revision: AtomicU64,
}

impl EntityStore {
    /// Opens a store over `records`, loading everything it holds.
    ///
    /// Items whose owning list is missing are dropped with a warning. With
    /// [`StoreConfig::repair_on_load`] their records are also deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store cannot be read, a record cannot
    /// be decoded, or the repair batch cannot be saved.
    pub fn open(
        records: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let mut state = StoreState::default();

        for record in records.fetch_collection(Collection::Lists)? {
            let list: List = serde_json::from_slice(&record.payload)?;
            state.insert_list(list);
        }

        let mut orphans = Vec::new();
        for record in records.fetch_collection(Collection::Items)? {
            let item: Item = serde_json::from_slice(&record.payload)?;
            if state.lists.contains_key(&item.list_id) {
                state.insert_item(item);
            } else {
                tracing::warn!(
                    item_id = %item.id,
                    list_id = %item.list_id,
                    "dropping orphaned item"
                );
                orphans.push(record.key);
            }
        }

        let stats = StoreStats::new();
        if !orphans.is_empty() {
            stats.record_orphans(orphans.len() as u64);
            if config.repair_on_load {
                let mut batch = WriteBatch::new();
                for key in orphans {
                    batch.delete(key);
                }
                records.save(batch)?;
            }
        }

        tracing::debug!(
            container = records.container(),
            lists = state.lists.len(),
            items = state.items.len(),
            "entity store opened"
        );

        Ok(Self {
            config,
            records,
            clock,
            state: RwLock::new(state),
            writer: Mutex::new(()),
            stats,
            revision: AtomicU64::new(0),
        })
    }

    /// Opens an empty store over an in-memory record store and the system clock.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`EntityStore::open`].
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(SystemClock),
            StoreConfig::default(),
        )
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the clock used for timestamp bumps.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the backing record store.
    pub fn record_store(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Returns the store counters.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Returns the number of batches committed since the store was opened.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Runs `f` in a transaction and commits everything it staged as one batch.
    ///
    /// If `f` returns an error nothing is written. If the record store fails
    /// to save the batch, nothing is applied in memory either. A transaction
    /// that stages nothing performs no flush.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or [`CoreError::Storage`] if the flush failed.
    pub fn batch<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut StoreTransaction<'_>) -> CoreResult<T>,
    {
        let _writer = self.writer.lock();

        let mut txn = StoreTransaction::new(self.state.read(), self.clock.as_ref());
        let value = f(&mut txn)?;
        if txn.is_empty() {
            return Ok(value);
        }

        // Dropping the transaction releases the read guard before I/O.
        let changes = txn.into_changes();
        let batch = changes.to_write_batch()?;
        if let Err(err) = self.records.save(batch) {
            self.stats.record_rollback();
            tracing::warn!(error = %err, "batch rolled back");
            return Err(CoreError::Storage(err));
        }

        let (lists, items, deletes) = changes.counts();
        {
            let mut state = self.state.write();
            changes.apply(&mut state);
        }
        self.stats.record_flush(lists, items, deletes);
        self.revision.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(lists, items, deletes, "batch committed");
        Ok(value)
    }

    // === Upserts and deletes ===

    /// Inserts or updates a list as a local edit.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be saved.
    pub fn upsert_list(&self, list: List) -> CoreResult<Upserted> {
        self.batch(|txn| Ok(txn.upsert_list(list)))
    }

    /// Inserts or updates an item as a local edit, deduplicating by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OrphanItem`] if the list does not exist, or a
    /// storage error if the batch cannot be saved.
    pub fn upsert_item(&self, item: Item) -> CoreResult<Upserted> {
        self.batch(|txn| txn.upsert_item(item))
    }

    /// Deletes a list and its items. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be saved.
    pub fn delete_list(&self, id: &ListId) -> CoreResult<bool> {
        self.batch(|txn| Ok(txn.delete_list(id)))
    }

    /// Deletes an item. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be saved.
    pub fn delete_item(&self, id: &ItemId) -> CoreResult<bool> {
        self.batch(|txn| Ok(txn.delete_item(id)))
    }

    // === Local edits ===

    /// Creates a list at the end of the active lists.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be saved.
    pub fn create_list(&self, name: &str) -> CoreResult<List> {
        self.batch(|txn| {
            let order = txn.active_lists().len() as u32;
            let list = List::new(name, order, txn.now());
            txn.upsert_list(list.clone());
            Ok(list)
        })
    }

    /// Renames a list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ListNotFound`] if the list does not exist.
    pub fn rename_list(&self, id: &ListId, name: &str) -> CoreResult<List> {
        self.edit_list(id, |list| list.name = name.to_string())
    }

    /// Archives or restores a list.
    ///
    /// Archived lists stay local; they are not sent to the remote replica
    /// and never removed because the remote lacks them.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ListNotFound`] if the list does not exist.
    pub fn set_archived(&self, id: &ListId, archived: bool) -> CoreResult<List> {
        self.batch(|txn| {
            let mut list = txn.list(id).cloned().ok_or(CoreError::ListNotFound(*id))?;
            if list.is_archived == archived {
                return Ok(list);
            }
            list.is_archived = archived;
            if !archived {
                list.order_number = txn.active_lists().len() as u32;
            }
            txn.upsert_list(list);
            txn.reindex_lists();
            txn.list(id).cloned().ok_or(CoreError::ListNotFound(*id))
        })
    }

    /// Applies `edit` to a list as a local edit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ListNotFound`] if the list does not exist.
    pub fn edit_list<F>(&self, id: &ListId, edit: F) -> CoreResult<List>
    where
        F: FnOnce(&mut List),
    {
        self.batch(|txn| {
            let mut list = txn.list(id).cloned().ok_or(CoreError::ListNotFound(*id))?;
            edit(&mut list);
            list.id = *id;
            txn.upsert_list(list);
            txn.list(id).cloned().ok_or(CoreError::ListNotFound(*id))
        })
    }

    /// Creates an item at the end of a list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ListNotFound`] if the list does not exist.
    pub fn create_item(&self, list_id: ListId, title: &str) -> CoreResult<Item> {
        self.batch(|txn| {
            if txn.list(&list_id).is_none() {
                return Err(CoreError::ListNotFound(list_id));
            }
            let order = txn.items_of(&list_id).len() as u32;
            let item = Item::new(list_id, title, order, txn.now());
            txn.upsert_item(item.clone())?;
            Ok(item)
        })
    }

    /// Applies `edit` to an item as a local edit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ItemNotFound`] if the item does not exist, or
    /// [`CoreError::OrphanItem`] if the edit points it at a missing list.
    pub fn edit_item<F>(&self, id: &ItemId, edit: F) -> CoreResult<Item>
    where
        F: FnOnce(&mut Item),
    {
        self.batch(|txn| {
            let mut item = txn.item(id).cloned().ok_or(CoreError::ItemNotFound(*id))?;
            edit(&mut item);
            item.id = *id;
            txn.upsert_item(item)?;
            txn.item(id).cloned().ok_or(CoreError::ItemNotFound(*id))
        })
    }

    /// Crosses an item out or back in.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ItemNotFound`] if the item does not exist.
    pub fn set_crossed_out(&self, id: &ItemId, crossed_out: bool) -> CoreResult<Item> {
        self.edit_item(id, |item| item.is_crossed_out = crossed_out)
    }

    /// Moves an active list to a new position.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is missing or archived.
    pub fn move_list(&self, id: &ListId, to_index: usize) -> CoreResult<()> {
        self.batch(|txn| txn.move_list(id, to_index))
    }

    /// Moves an item to a new position within its list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ItemNotFound`] if the item does not exist.
    pub fn move_item(&self, id: &ItemId, to_index: usize) -> CoreResult<()> {
        self.batch(|txn| txn.move_item(id, to_index))
    }

    /// Renumbers active lists densely from zero. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be saved.
    pub fn reindex_lists(&self) -> CoreResult<usize> {
        self.batch(|txn| Ok(txn.reindex_lists()))
    }

    /// Renumbers a list's items densely from zero. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ListNotFound`] if the list does not exist.
    pub fn reindex_items(&self, list_id: &ListId) -> CoreResult<usize> {
        self.batch(|txn| {
            if txn.list(list_id).is_none() {
                return Err(CoreError::ListNotFound(*list_id));
            }
            Ok(txn.reindex_items(list_id))
        })
    }

    // === Reads ===

    /// Returns a snapshot of every list, archived ones included.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().snapshot(true)
    }

    /// Returns a snapshot of the non-archived lists. This is what a replica
    /// sends to its peer.
    pub fn active_snapshot(&self) -> Snapshot {
        self.state.read().snapshot(false)
    }

    /// Returns a list by id.
    pub fn list(&self, id: &ListId) -> Option<List> {
        self.state.read().lists.get(id).cloned()
    }

    /// Returns an item by id.
    pub fn item(&self, id: &ItemId) -> Option<Item> {
        self.state.read().items.get(id).cloned()
    }

    /// Returns the items of a list in display order.
    pub fn items_of(&self, list_id: &ListId) -> Vec<Item> {
        self.state.read().items_of(list_id)
    }

    /// Returns the ids of a list's items in display order.
    pub fn item_ids(&self, list_id: &ListId) -> Vec<ItemId> {
        self.items_of(list_id).into_iter().map(|item| item.id).collect()
    }

    /// Returns the number of lists, archived ones included.
    pub fn list_count(&self) -> usize {
        self.state.read().lists.len()
    }

    /// Returns the number of items.
    pub fn item_count(&self) -> usize {
        self.state.read().items.len()
    }

    /// Returns true if the record store has a record for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store cannot be read.
    pub fn is_persisted(&self, key: &RecordKey) -> CoreResult<bool> {
        Ok(self.records.get(key)?.is_some())
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("container", &self.records.container())
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::Timestamp;

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn store_with(records: Arc<InMemoryRecordStore>, clock: Arc<ManualClock>) -> EntityStore {
        EntityStore::open(records, clock, StoreConfig::default()).unwrap()
    }

    fn fresh() -> (EntityStore, Arc<InMemoryRecordStore>, Arc<ManualClock>) {
        let records = Arc::new(InMemoryRecordStore::open("test"));
        let clock = Arc::new(ManualClock::new(ts(1_000)));
        (store_with(records.clone(), clock.clone()), records, clock)
    }

    #[test]
    fn create_and_read() {
        let (store, records, _) = fresh();
        let list = store.create_list("Groceries").unwrap();
        let item = store.create_item(list.id, "Milk").unwrap();

        assert_eq!(store.list(&list.id).unwrap().name, "Groceries");
        assert_eq!(store.item(&item.id).unwrap().title, "Milk");
        assert_eq!(store.item_ids(&list.id), vec![item.id]);
        assert_eq!(records.flush_count(), 2);
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn identical_upsert_is_a_no_op() {
        let (store, records, clock) = fresh();
        let list = store.create_list("A").unwrap();
        let flushes = records.flush_count();

        clock.advance(10);
        let current = store.list(&list.id).unwrap();
        assert_eq!(store.upsert_list(current.clone()).unwrap(), Upserted::Unchanged);
        assert_eq!(records.flush_count(), flushes);
        assert_eq!(store.list(&list.id).unwrap(), current);
    }

    #[test]
    fn upsert_item_dedups_and_bumps() {
        let (store, _, clock) = fresh();
        let list = store.create_list("A").unwrap();
        let item = store.create_item(list.id, "Milk").unwrap();
        let before = store.item(&item.id).unwrap();

        // Clock went backwards; the bump still moves forward one tick.
        clock.set(ts(500));
        let mut edited = before.clone();
        edited.title = "Oat milk".into();
        assert_eq!(store.upsert_item(edited).unwrap(), Upserted::Updated);

        let after = store.item(&item.id).unwrap();
        assert_eq!(store.item_count(), 1);
        assert_eq!(after.title, "Oat milk");
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.modified_at, before.modified_at.next_tick());
    }

    #[test]
    fn item_edit_touches_owning_list() {
        let (store, _, clock) = fresh();
        let list = store.create_list("A").unwrap();
        let item = store.create_item(list.id, "x").unwrap();
        let list_before = store.list(&list.id).unwrap();

        clock.advance(50);
        store.set_crossed_out(&item.id, true).unwrap();
        let list_after = store.list(&list.id).unwrap();
        assert_eq!(list_after.modified_at, ts(1_050));
        assert!(list_after.modified_at > list_before.modified_at);
    }

    #[test]
    fn moving_item_touches_both_lists() {
        let (store, _, clock) = fresh();
        let a = store.create_list("A").unwrap();
        let b = store.create_list("B").unwrap();
        let item = store.create_item(a.id, "x").unwrap();

        clock.advance(5);
        store.edit_item(&item.id, |item| item.list_id = b.id).unwrap();

        assert!(store.item_ids(&a.id).is_empty());
        assert_eq!(store.item_ids(&b.id), vec![item.id]);
        assert_eq!(store.list(&a.id).unwrap().modified_at, ts(1_005));
        assert_eq!(store.list(&b.id).unwrap().modified_at, ts(1_005));
    }

    #[test]
    fn upsert_item_into_missing_list_fails() {
        let (store, records, _) = fresh();
        let item = Item::new(ListId::new(), "x", 0, ts(0));
        let err = store.upsert_item(item).unwrap_err();
        assert!(matches!(err, CoreError::OrphanItem { .. }));
        assert_eq!(records.flush_count(), 0);
    }

    #[test]
    fn delete_list_cascades() {
        let (store, records, _) = fresh();
        let list = store.create_list("A").unwrap();
        for title in ["x", "y", "z"] {
            store.create_item(list.id, title).unwrap();
        }

        assert!(store.delete_list(&list.id).unwrap());
        assert_eq!(store.list_count(), 0);
        assert_eq!(store.item_count(), 0);
        assert!(records.fetch_collection(Collection::Items).unwrap().is_empty());
        assert!(!store.delete_list(&list.id).unwrap());
    }

    #[test]
    fn failed_flush_rolls_back() {
        let (store, records, _) = fresh();
        let list = store.create_list("A").unwrap();

        records.fail_next_save();
        let err = store.rename_list(&list.id, "B").unwrap_err();
        assert!(err.is_storage());
        assert_eq!(store.list(&list.id).unwrap().name, "A");
        assert_eq!(store.stats().rollbacks(), 1);

        store.rename_list(&list.id, "B").unwrap();
        assert_eq!(store.list(&list.id).unwrap().name, "B");
    }

    #[test]
    fn batch_is_one_flush() {
        let (store, records, _) = fresh();
        let list = store.create_list("A").unwrap();
        let flushes = records.flush_count();

        store
            .batch(|txn| {
                for i in 0..100 {
                    txn.upsert_item(Item::new(list.id, format!("item {i}"), i, txn.now()))?;
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(records.flush_count(), flushes + 1);
        assert_eq!(store.item_count(), 100);
    }

    #[test]
    fn failing_closure_writes_nothing() {
        let (store, records, _) = fresh();
        let result: CoreResult<()> = store.batch(|txn| {
            txn.upsert_list(List::new("A", 0, txn.now()));
            Err(CoreError::invalid_operation("abort"))
        });
        assert!(result.is_err());
        assert_eq!(store.list_count(), 0);
        assert_eq!(records.flush_count(), 0);
    }

    #[test]
    fn reload_drops_orphans() {
        let records = Arc::new(InMemoryRecordStore::open("test"));
        let clock = Arc::new(ManualClock::new(ts(0)));
        let list = List::new("A", 0, ts(0));
        let kept = Item::new(list.id, "kept", 0, ts(0));
        let orphan = Item::new(ListId::new(), "orphan", 0, ts(0));

        let mut batch = WriteBatch::new();
        batch.put(
            RecordKey::new(Collection::Lists, list.id.to_string()),
            serde_json::to_vec(&list).unwrap(),
        );
        for item in [&kept, &orphan] {
            batch.put(
                RecordKey::new(Collection::Items, item.id.to_string()),
                serde_json::to_vec(item).unwrap(),
            );
        }
        records.save(batch).unwrap();

        let store = store_with(records.clone(), clock);
        assert_eq!(store.item_count(), 1);
        assert!(store.item(&kept.id).is_some());
        assert_eq!(store.stats().orphans_dropped(), 1);
        assert!(!store
            .is_persisted(&RecordKey::new(Collection::Items, orphan.id.to_string()))
            .unwrap());
    }

    #[test]
    fn archived_lists_stay_out_of_active_snapshot() {
        let (store, _, _) = fresh();
        let a = store.create_list("A").unwrap();
        let b = store.create_list("B").unwrap();
        store.set_archived(&a.id, true).unwrap();

        let active = store.active_snapshot();
        assert_eq!(active.len(), 1);
        assert_eq!(active.lists[0].list.id, b.id);
        assert_eq!(active.lists[0].list.order_number, 0);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn move_and_reindex_keep_indices_dense() {
        let (store, _, _) = fresh();
        let list = store.create_list("A").unwrap();
        let ids: Vec<ItemId> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| store.create_item(list.id, t).unwrap().id)
            .collect();

        store.move_item(&ids[3], 0).unwrap();
        assert_eq!(store.item_ids(&list.id), vec![ids[3], ids[0], ids[1], ids[2]]);
        let orders: Vec<u32> = store.items_of(&list.id).iter().map(|i| i.order_number).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);

        store.delete_item(&ids[0]).unwrap();
        assert_eq!(store.reindex_items(&list.id).unwrap(), 2);
        assert_eq!(store.reindex_items(&list.id).unwrap(), 0);
    }

    proptest::proptest! {
        #[test]
        fn item_moves_keep_indices_dense(
            count in 1usize..12,
            moves in proptest::collection::vec((0usize..12, 0usize..14), 0..20),
        ) {
            let (store, _, _) = fresh();
            let list = store.create_list("A").unwrap();
            let ids: Vec<ItemId> = (0..count)
                .map(|i| store.create_item(list.id, &format!("item {i}")).unwrap().id)
                .collect();

            for (from, to) in moves {
                store.move_item(&ids[from % count], to).unwrap();
            }

            let orders: Vec<u32> = store.items_of(&list.id).iter().map(|i| i.order_number).collect();
            let expected: Vec<u32> = (0..count as u32).collect();
            proptest::prop_assert_eq!(orders, expected);
            proptest::prop_assert_eq!(store.item_count(), count);
        }
    }
}

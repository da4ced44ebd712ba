//! Write transactions over the entity store.
//!
//! A [`StoreTransaction`] stages changes on top of the committed state.
//! Reads inside the transaction see its own staged writes. Nothing becomes
//! visible to other readers until the whole transaction is committed by
//! [`EntityStore::batch`](crate::EntityStore::batch).

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::model::{Item, List, ListSnapshot, Snapshot};
use crate::store::StoreState;
use crate::types::{ItemId, ListId, Timestamp};
use listsync_storage::{Collection, RecordKey, WriteBatch};
use parking_lot::RwLockReadGuard;
use std::collections::{BTreeMap, HashSet};

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// The entity did not exist and was inserted.
    Inserted,
    /// The entity existed and its fields changed.
    Updated,
    /// The entity already had these values; nothing was written.
    Unchanged,
}

impl Upserted {
    /// Returns true if anything was staged.
    pub fn changed(self) -> bool {
        !matches!(self, Upserted::Unchanged)
    }
}

/// Staged changes of one transaction. `None` marks a deletion.
#[derive(Debug, Default)]
pub(crate) struct StagedChanges {
    pub(crate) lists: BTreeMap<ListId, Option<List>>,
    pub(crate) items: BTreeMap<ItemId, Option<Item>>,
}

impl StagedChanges {
    pub(crate) fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.items.is_empty()
    }

    /// Encodes the changes as one record-store batch.
    pub(crate) fn to_write_batch(&self) -> CoreResult<WriteBatch> {
        let mut batch = WriteBatch::new();
        for (id, list) in &self.lists {
            let key = RecordKey::new(Collection::Lists, id.to_string());
            match list {
                Some(list) => batch.put(key, serde_json::to_vec(list)?),
                None => batch.delete(key),
            }
        }
        for (id, item) in &self.items {
            let key = RecordKey::new(Collection::Items, id.to_string());
            match item {
                Some(item) => batch.put(key, serde_json::to_vec(item)?),
                None => batch.delete(key),
            }
        }
        Ok(batch)
    }

    /// Returns (lists written, items written, records deleted).
    pub(crate) fn counts(&self) -> (u64, u64, u64) {
        let lists = self.lists.values().filter(|l| l.is_some()).count() as u64;
        let items = self.items.values().filter(|i| i.is_some()).count() as u64;
        let deletes = (self.lists.len() + self.items.len()) as u64 - lists - items;
        (lists, items, deletes)
    }

    pub(crate) fn apply(self, state: &mut StoreState) {
        let mut removed_lists = Vec::new();
        for (id, list) in self.lists {
            match list {
                Some(list) => state.insert_list(list),
                None => removed_lists.push(id),
            }
        }
        for (id, item) in self.items {
            match item {
                Some(item) => state.insert_item(item),
                None => state.remove_item(&id),
            }
        }
        for id in removed_lists {
            state.remove_list(&id);
        }
    }
}

/// A write transaction.
///
/// Two families of writes are offered:
///
/// - `put_*` / `remove_*` store values verbatim. The merge engine uses these
///   so that remote timestamps are preserved.
/// - `upsert_*` / `delete_*` / `move_*` / `reindex_*` are local edits. They
///   bump `modified_at` per the monotonic rule and touch the owning list.
pub struct StoreTransaction<'a> {
    base: RwLockReadGuard<'a, StoreState>,
    now: Timestamp,
    staged: StagedChanges,
    touched: HashSet<ListId>,
}

impl<'a> StoreTransaction<'a> {
    pub(crate) fn new(base: RwLockReadGuard<'a, StoreState>, clock: &dyn Clock) -> Self {
        Self {
            base,
            now: clock.now(),
            staged: StagedChanges::default(),
            touched: HashSet::new(),
        }
    }

    pub(crate) fn into_changes(self) -> StagedChanges {
        self.staged
    }

    /// Returns the clock reading taken when the transaction began.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Returns true if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    // === Reads ===

    /// Returns a list, including staged changes.
    pub fn list(&self, id: &ListId) -> Option<&List> {
        match self.staged.lists.get(id) {
            Some(staged) => staged.as_ref(),
            None => self.base.lists.get(id),
        }
    }

    /// Returns an item, including staged changes.
    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        match self.staged.items.get(id) {
            Some(staged) => staged.as_ref(),
            None => self.base.items.get(id),
        }
    }

    /// Returns all lists ordered by `(order_number, id)`.
    pub fn lists(&self) -> Vec<&List> {
        let mut lists: Vec<&List> = self
            .base
            .lists
            .values()
            .filter(|list| !self.staged.lists.contains_key(&list.id))
            .chain(self.staged.lists.values().flatten())
            .collect();
        lists.sort_by(|a, b| (a.order_number, a.id).cmp(&(b.order_number, b.id)));
        lists
    }

    /// Returns non-archived lists ordered by `(order_number, id)`.
    pub fn active_lists(&self) -> Vec<&List> {
        self.lists().into_iter().filter(|l| !l.is_archived).collect()
    }

    /// Returns the items of a list ordered by `(order_number, id)`.
    pub fn items_of(&self, list_id: &ListId) -> Vec<&Item> {
        let mut items: Vec<&Item> = Vec::new();
        if let Some(children) = self.base.children.get(list_id) {
            items.extend(
                children
                    .iter()
                    .filter(|id| !self.staged.items.contains_key(id))
                    .filter_map(|id| self.base.items.get(id)),
            );
        }
        items.extend(
            self.staged
                .items
                .values()
                .flatten()
                .filter(|item| &item.list_id == list_id),
        );
        items.sort_by(|a, b| (a.order_number, a.id).cmp(&(b.order_number, b.id)));
        items
    }

    /// Returns every list with its items, as the transaction sees them.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.lists()
                .into_iter()
                .map(|list| {
                    let items = self.items_of(&list.id).into_iter().cloned().collect();
                    ListSnapshot::new(list.clone(), items)
                })
                .collect(),
        )
    }

    // === Verbatim writes ===

    /// Stores a list as given.
    pub fn put_list(&mut self, list: List) {
        self.staged.lists.insert(list.id, Some(list));
    }

    /// Stores an item as given.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OrphanItem`] if the owning list does not exist.
    pub fn put_item(&mut self, item: Item) -> CoreResult<()> {
        if self.list(&item.list_id).is_none() {
            return Err(CoreError::OrphanItem {
                item_id: item.id,
                list_id: item.list_id,
            });
        }
        self.staged.items.insert(item.id, Some(item));
        Ok(())
    }

    /// Removes a list and all of its items. Returns false if it was absent.
    pub fn remove_list(&mut self, id: &ListId) -> bool {
        if self.list(id).is_none() {
            return false;
        }
        let item_ids: Vec<ItemId> = self.items_of(id).iter().map(|item| item.id).collect();
        for item_id in item_ids {
            self.staged.items.insert(item_id, None);
        }
        self.staged.lists.insert(*id, None);
        true
    }

    /// Removes an item. Returns false if it was absent.
    pub fn remove_item(&mut self, id: &ItemId) -> bool {
        if self.item(id).is_none() {
            return false;
        }
        self.staged.items.insert(*id, None);
        true
    }

    // === Local edits ===

    /// Inserts or updates a list as a local edit.
    ///
    /// Writing the values a list already has is a no-op. Otherwise
    /// `modified_at` is bumped and `created_at` is preserved.
    pub fn upsert_list(&mut self, mut list: List) -> Upserted {
        let now = self.now;
        match self.list(&list.id) {
            Some(existing) if existing.same_content(&list) => Upserted::Unchanged,
            Some(existing) => {
                list.created_at = existing.created_at;
                list.modified_at = Timestamp::bumped(existing.modified_at, now).max(list.modified_at);
                self.touched.insert(list.id);
                self.put_list(list);
                Upserted::Updated
            }
            None => {
                list.modified_at = list.modified_at.max(now);
                self.touched.insert(list.id);
                self.put_list(list);
                Upserted::Inserted
            }
        }
    }

    /// Inserts or updates an item as a local edit.
    ///
    /// Deduplicates by identifier: an existing item with the same id is
    /// updated in place. The owning list (and the previous one, on a move)
    /// is touched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OrphanItem`] if the owning list does not exist.
    pub fn upsert_item(&mut self, mut item: Item) -> CoreResult<Upserted> {
        if self.list(&item.list_id).is_none() {
            return Err(CoreError::OrphanItem {
                item_id: item.id,
                list_id: item.list_id,
            });
        }

        let now = self.now;
        let (outcome, previous_list) = match self.item(&item.id) {
            Some(existing) if existing.same_content(&item) => return Ok(Upserted::Unchanged),
            Some(existing) => {
                item.created_at = existing.created_at;
                item.modified_at = Timestamp::bumped(existing.modified_at, now).max(item.modified_at);
                (Upserted::Updated, Some(existing.list_id))
            }
            None => {
                item.modified_at = item.modified_at.max(now);
                (Upserted::Inserted, None)
            }
        };

        let list_id = item.list_id;
        self.put_item(item)?;
        self.touch_list(&list_id);
        if let Some(previous) = previous_list.filter(|previous| previous != &list_id) {
            self.touch_list(&previous);
        }
        Ok(outcome)
    }

    /// Deletes a list and its items as a local edit.
    pub fn delete_list(&mut self, id: &ListId) -> bool {
        self.remove_list(id)
    }

    /// Deletes an item as a local edit, touching its list.
    pub fn delete_item(&mut self, id: &ItemId) -> bool {
        let Some(list_id) = self.item(id).map(|item| item.list_id) else {
            return false;
        };
        self.remove_item(id);
        self.touch_list(&list_id);
        true
    }

    /// Bumps a list's `modified_at`, at most once per transaction.
    pub fn touch_list(&mut self, id: &ListId) {
        if self.touched.contains(id) {
            return;
        }
        if let Some(list) = self.list(id) {
            let mut list = list.clone();
            list.modified_at = Timestamp::bumped(list.modified_at, self.now);
            self.touched.insert(*id);
            self.put_list(list);
        }
    }

    /// Renumbers active lists densely from zero, keeping their relative order.
    ///
    /// Returns the number of lists whose index changed.
    pub fn reindex_lists(&mut self) -> usize {
        let ordered: Vec<ListId> = self.active_lists().iter().map(|l| l.id).collect();
        self.renumber_lists(&ordered)
    }

    /// Moves an active list to `to_index` and renumbers the rest.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is missing or archived.
    pub fn move_list(&mut self, id: &ListId, to_index: usize) -> CoreResult<()> {
        match self.list(id) {
            None => return Err(CoreError::ListNotFound(*id)),
            Some(list) if list.is_archived => {
                return Err(CoreError::invalid_operation("cannot move an archived list"))
            }
            Some(_) => {}
        }
        let mut ordered: Vec<ListId> = self
            .active_lists()
            .iter()
            .map(|l| l.id)
            .filter(|other| other != id)
            .collect();
        ordered.insert(to_index.min(ordered.len()), *id);
        self.renumber_lists(&ordered);
        Ok(())
    }

    /// Renumbers a list's items densely from zero, keeping their order.
    ///
    /// Returns the number of items whose index changed.
    pub fn reindex_items(&mut self, list_id: &ListId) -> usize {
        let ordered: Vec<ItemId> = self.items_of(list_id).iter().map(|i| i.id).collect();
        self.renumber_items(list_id, &ordered)
    }

    /// Moves an item to `to_index` within its list and renumbers the rest.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ItemNotFound`] if the item is missing.
    pub fn move_item(&mut self, id: &ItemId, to_index: usize) -> CoreResult<()> {
        let list_id = self
            .item(id)
            .map(|item| item.list_id)
            .ok_or(CoreError::ItemNotFound(*id))?;
        let mut ordered: Vec<ItemId> = self
            .items_of(&list_id)
            .iter()
            .map(|i| i.id)
            .filter(|other| other != id)
            .collect();
        ordered.insert(to_index.min(ordered.len()), *id);
        self.renumber_items(&list_id, &ordered);
        Ok(())
    }

    fn renumber_lists(&mut self, ordered: &[ListId]) -> usize {
        let mut changed = 0;
        for (index, id) in ordered.iter().enumerate() {
            let index = index as u32;
            let Some(list) = self.list(id) else { continue };
            if list.order_number == index {
                continue;
            }
            let mut list = list.clone();
            list.order_number = index;
            self.upsert_list(list);
            changed += 1;
        }
        changed
    }

    fn renumber_items(&mut self, list_id: &ListId, ordered: &[ItemId]) -> usize {
        let mut changed = 0;
        for (index, id) in ordered.iter().enumerate() {
            let index = index as u32;
            let Some(item) = self.item(id) else { continue };
            if item.order_number == index {
                continue;
            }
            let mut item = item.clone();
            item.order_number = index;
            // The list exists: `ordered` came from `items_of(list_id)`.
            if self.upsert_item(item).is_ok() {
                changed += 1;
            }
        }
        if changed > 0 {
            self.touch_list(list_id);
        }
        changed
    }
}

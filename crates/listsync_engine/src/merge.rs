//! Reconciliation of a received snapshot into the entity store.
//!
//! A merge is computed as a [`MergePlan`] against the local state and then
//! applied through one [`EntityStore::batch`], so every change it makes lands
//! in a single flush.
//!
//! Rules:
//! - A received snapshot with no lists is not an update. Nothing is removed.
//! - Otherwise every non-archived local list that is neither received nor
//!   announced as omitted is removed, with its items.
//! - Received lists and items are upserted by identifier. When both sides
//!   hold a differing version, the [`ConflictPolicy`] picks one.
//! - Items of a received list that the remote no longer holds are removed,
//!   but only when the received list version wins. Item edits touch their
//!   list, so a stale list cannot remove newer items.
//! - An item carried by a list it does not claim is an integrity violation.
//!   It is dropped and the rest of the merge proceeds.
//! - Afterwards the active lists, and the items of each, are renumbered
//!   densely by `(order_number, id)`. Renumbering is a local edit, so the
//!   renumbered versions win on the peer and both replicas settle on the
//!   same order.

use crate::error::{SyncError, SyncResult};
use listsync_core::{
    CoreError, CoreResult, EntityStore, Item, ItemId, List, ListId, Snapshot, StoreTransaction,
};
use listsync_protocol::{Conflict, ConflictPolicy, ConflictResolution, ReceivedSnapshot};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A received item that does not belong where it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityViolation {
    /// The dropped item.
    pub item_id: ItemId,
    /// The list the item names as its owner.
    pub claimed_list_id: ListId,
    /// The list that carried it, or the claimed list if it was missing.
    pub list_id: ListId,
}

impl IntegrityViolation {
    /// Converts into the equivalent [`SyncError`].
    pub fn to_error(&self) -> SyncError {
        SyncError::IntegrityViolation {
            item_id: self.item_id,
            claimed_list_id: self.claimed_list_id,
            list_id: self.list_id,
        }
    }
}

/// What a merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// The received snapshot was empty and nothing was removed.
    pub guarded: bool,
    /// Lists inserted.
    pub lists_inserted: usize,
    /// Lists replaced by a winning remote version.
    pub lists_updated: usize,
    /// Lists removed because the remote no longer holds them.
    pub lists_removed: usize,
    /// Items inserted.
    pub items_inserted: usize,
    /// Items replaced by a winning remote version.
    pub items_updated: usize,
    /// Items removed because the remote no longer holds them.
    pub items_removed: usize,
    /// Lists and items renumbered to keep ordering indices dense.
    pub reordered: usize,
    /// Differing versions and how each was resolved.
    pub conflicts: Vec<Conflict>,
    /// Items dropped for integrity violations.
    pub violations: Vec<IntegrityViolation>,
}

impl MergeReport {
    /// Returns the number of entities written or removed.
    pub fn changes(&self) -> usize {
        self.lists_inserted
            + self.lists_updated
            + self.lists_removed
            + self.items_inserted
            + self.items_updated
            + self.items_removed
            + self.reordered
    }

    /// Returns true if the merge changed nothing.
    pub fn is_noop(&self) -> bool {
        self.changes() == 0
    }
}

/// The differences between local state and a received snapshot.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    /// Lists to store as received.
    pub list_puts: Vec<List>,
    /// Items to store as received.
    pub item_puts: Vec<Item>,
    /// Items to remove.
    pub item_removals: Vec<ItemId>,
    /// Lists to remove with their items.
    pub list_removals: Vec<ListId>,
    /// Counts, conflicts and violations found while planning.
    pub report: MergeReport,
}

impl MergePlan {
    /// Returns true if applying the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.list_puts.is_empty()
            && self.item_puts.is_empty()
            && self.item_removals.is_empty()
            && self.list_removals.is_empty()
    }
}

/// Merges received snapshots into an [`EntityStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine {
    policy: ConflictPolicy,
}

impl MergeEngine {
    /// Creates a merge engine resolving conflicts with `policy`.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Returns the conflict policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Computes the changes that merging `received` into `local` makes.
    ///
    /// `local` must hold every local list, archived ones included.
    pub fn plan(&self, local: &Snapshot, received: &ReceivedSnapshot) -> MergePlan {
        let mut plan = MergePlan::default();
        if received.snapshot.is_empty() {
            plan.report.guarded = true;
            return plan;
        }

        let local_lists: HashMap<ListId, &List> = local
            .lists
            .iter()
            .map(|entry| (entry.list.id, &entry.list))
            .collect();
        let local_items: HashMap<ItemId, &Item> = local
            .lists
            .iter()
            .flat_map(|entry| entry.items.iter())
            .map(|item| (item.id, item))
            .collect();

        let mut kept_lists: HashSet<ListId> = received.omitted_list_ids.iter().copied().collect();
        kept_lists.extend(received.snapshot.lists.iter().map(|entry| entry.list.id));
        let received_items: HashSet<ItemId> = received
            .snapshot
            .lists
            .iter()
            .flat_map(|entry| entry.items.iter().map(|item| item.id))
            .collect();

        for entry in &local.lists {
            let list = &entry.list;
            if !list.is_archived && !kept_lists.contains(&list.id) {
                plan.list_removals.push(list.id);
            }
        }

        let mut seen_lists = HashSet::new();
        let mut seen_items = HashSet::new();
        for entry in &received.snapshot.lists {
            let remote_list = &entry.list;
            if !seen_lists.insert(remote_list.id) {
                tracing::debug!(list_id = %remote_list.id, "ignoring repeated list");
                continue;
            }

            let remote_list_wins = match local_lists.get(&remote_list.id) {
                None => {
                    plan.list_puts.push(remote_list.clone());
                    plan.report.lists_inserted += 1;
                    false
                }
                Some(local_list) if *local_list == remote_list => false,
                Some(local_list) => {
                    let conflict = self.policy.conflict(*local_list, remote_list);
                    let wins = conflict.resolution == ConflictResolution::AcceptRemote;
                    if wins {
                        plan.list_puts.push(remote_list.clone());
                        plan.report.lists_updated += 1;
                    }
                    plan.report.conflicts.push(conflict);
                    wins
                }
            };

            for remote_item in &entry.items {
                if remote_item.list_id != remote_list.id {
                    plan.report.violations.push(IntegrityViolation {
                        item_id: remote_item.id,
                        claimed_list_id: remote_item.list_id,
                        list_id: remote_list.id,
                    });
                    continue;
                }
                if !seen_items.insert(remote_item.id) {
                    continue;
                }

                match local_items.get(&remote_item.id) {
                    None => {
                        plan.item_puts.push(remote_item.clone());
                        plan.report.items_inserted += 1;
                    }
                    Some(local_item) if *local_item == remote_item => {}
                    Some(local_item) => {
                        let conflict = self.policy.conflict(*local_item, remote_item);
                        if conflict.resolution == ConflictResolution::AcceptRemote {
                            plan.item_puts.push(remote_item.clone());
                            plan.report.items_updated += 1;
                        }
                        plan.report.conflicts.push(conflict);
                    }
                }
            }

            if remote_list_wins {
                if let Some(local_entry) = local.find(&remote_list.id) {
                    plan.item_removals.extend(
                        local_entry
                            .items
                            .iter()
                            .map(|item| item.id)
                            .filter(|id| !received_items.contains(id)),
                    );
                }
            }
        }

        plan
    }

    /// Merges `received` into `store` as one batch.
    ///
    /// The plan is computed inside the batch, against the state it applies
    /// to. Integrity violations are logged and reported, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StorageFailure`] if the flush failed. Nothing was
    /// applied in that case.
    pub fn reconcile(&self, store: &EntityStore, received: &ReceivedSnapshot) -> SyncResult<MergeReport> {
        let report = store.batch(|txn| {
            let plan = self.plan(&txn.snapshot(), received);
            apply_plan(txn, plan)
        })?;

        for violation in &report.violations {
            tracing::warn!(
                item_id = %violation.item_id,
                claimed_list_id = %violation.claimed_list_id,
                list_id = %violation.list_id,
                "dropping item with mismatched list"
            );
        }
        if report.guarded {
            tracing::info!("received empty snapshot; nothing removed");
        } else {
            tracing::debug!(
                lists_inserted = report.lists_inserted,
                lists_updated = report.lists_updated,
                lists_removed = report.lists_removed,
                reordered = report.reordered,
                items_inserted = report.items_inserted,
                items_updated = report.items_updated,
                items_removed = report.items_removed,
                conflicts = report.conflicts.len(),
                "merge applied"
            );
        }
        Ok(report)
    }
}

fn apply_plan(txn: &mut StoreTransaction<'_>, plan: MergePlan) -> CoreResult<MergeReport> {
    let MergePlan {
        list_puts,
        item_puts,
        item_removals,
        list_removals,
        mut report,
    } = plan;

    for list in list_puts {
        txn.put_list(list);
    }
    for item in item_puts {
        let inserted = txn.item(&item.id).is_none();
        match txn.put_item(item) {
            Ok(()) => {}
            Err(CoreError::OrphanItem { item_id, list_id }) => {
                if inserted {
                    report.items_inserted -= 1;
                } else {
                    report.items_updated -= 1;
                }
                report.violations.push(IntegrityViolation {
                    item_id,
                    claimed_list_id: list_id,
                    list_id,
                });
            }
            Err(err) => return Err(err),
        }
    }
    report.items_removed = item_removals
        .iter()
        .filter(|id| txn.remove_item(id))
        .count();
    report.lists_removed = list_removals
        .iter()
        .filter(|id| txn.remove_list(id))
        .count();
    if !report.guarded {
        report.reordered = reindex(txn);
    }
    Ok(report)
}

/// Renumbers active lists, then the items of each, from zero.
fn reindex(txn: &mut StoreTransaction<'_>) -> usize {
    let mut reordered = txn.reindex_lists();
    let active: Vec<ListId> = txn.active_lists().iter().map(|list| list.id).collect();
    for list_id in &active {
        reordered += txn.reindex_items(list_id);
    }
    reordered
}

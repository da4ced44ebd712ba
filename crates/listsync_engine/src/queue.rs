//! Persistent offline operation queue.

use crate::error::SyncResult;
use listsync_core::{Clock, CoreError, CoreResult, EntityStore, StoreTransaction, Timestamp};
use listsync_protocol::{
    ConflictPolicy, ConflictResolution, OperationLog, QueueEntry, QueuedOperation,
};
use listsync_storage::{Collection, RecordKey, RecordStore, WriteBatch};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// What a drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Operations that changed the store.
    pub replayed: usize,
    /// Operations that were already applied or lost to a newer version.
    pub skipped: usize,
    /// Item upserts whose list no longer exists.
    pub dropped: usize,
}

impl DrainReport {
    /// Returns the number of operations drained.
    pub fn total(&self) -> usize {
        self.replayed + self.skipped + self.dropped
    }
}

/// Buffers local operations while the remote is unavailable.
///
/// Operations are persisted to the record store when enqueued and replayed
/// in submission order by [`OfflineQueue::drain`]. Delivery is at least once:
/// a failure after the replay committed leaves the operations queued, and
/// replaying them again changes nothing.
///
/// Upserts are stamped with their enqueue time and replayed through the same
/// conflict rule as a merge, so an edit made offline does not overwrite a
/// newer version that arrived in the meantime.
pub struct OfflineQueue {
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    policy: ConflictPolicy,
    log: Mutex<OperationLog>,
}

impl OfflineQueue {
    /// Opens the queue held by `records`.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue records cannot be read or decoded.
    pub fn open(
        records: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        policy: ConflictPolicy,
    ) -> SyncResult<Self> {
        let stored = records
            .fetch_collection(Collection::Queue)
            .map_err(CoreError::from)?;
        let entries = stored
            .iter()
            .map(|record| serde_json::from_slice::<QueueEntry>(&record.payload))
            .collect::<Result<Vec<_>, _>>()
            .map_err(CoreError::from)?;

        if !entries.is_empty() {
            tracing::info!(pending = entries.len(), "loaded offline queue");
        }
        Ok(Self {
            records,
            clock,
            policy,
            log: Mutex::new(OperationLog::from_entries(entries)),
        })
    }

    /// Appends an operation and persists it. Returns its operation id.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be persisted. It is not
    /// queued in that case.
    pub fn enqueue(&self, operation: QueuedOperation) -> SyncResult<u64> {
        let now = self.clock.now();
        let operation = stamp(operation, now);

        let mut log = self.log.lock();
        let entry = QueueEntry {
            op_id: log.next_op_id(),
            enqueued_at: now,
            operation,
            acknowledged: false,
        };
        let mut batch = WriteBatch::new();
        batch.put(queue_key(entry.op_id), serde_json::to_vec(&entry).map_err(CoreError::from)?);
        self.records.save(batch).map_err(CoreError::from)?;

        let op_id = log.append(entry.operation, now).op_id;
        tracing::debug!(op_id, pending = log.pending_count(), "operation queued");
        Ok(op_id)
    }

    /// Returns the pending entries, oldest first.
    pub fn pending(&self) -> Vec<QueueEntry> {
        self.log.lock().pending().cloned().collect()
    }

    /// Returns the number of pending operations.
    pub fn len(&self) -> usize {
        self.log.lock().pending_count()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replays every pending operation into `store` as one batch, in
    /// submission order, then removes them from the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the replay batch or the queue cleanup cannot be
    /// saved. The operations stay queued either way.
    pub fn drain(&self, store: &EntityStore) -> SyncResult<DrainReport> {
        let mut log = self.log.lock();
        let entries: Vec<QueueEntry> = log.pending().cloned().collect();
        let Some(last) = entries.last().map(|entry| entry.op_id) else {
            return Ok(DrainReport::default());
        };

        let report = store.batch(|txn| {
            let mut report = DrainReport::default();
            for entry in &entries {
                match replay(txn, self.policy, &entry.operation)? {
                    Replay::Applied => report.replayed += 1,
                    Replay::Skipped => report.skipped += 1,
                    Replay::Dropped => {
                        tracing::warn!(
                            op_id = entry.op_id,
                            entity_id = %entry.operation.entity_id(),
                            "dropping queued item whose list no longer exists"
                        );
                        report.dropped += 1;
                    }
                }
            }
            Ok(report)
        })?;

        let mut cleanup = WriteBatch::new();
        for entry in &entries {
            cleanup.delete(queue_key(entry.op_id));
        }
        self.records.save(cleanup).map_err(CoreError::from)?;

        log.acknowledge_up_to(last);
        log.compact();
        tracing::info!(
            replayed = report.replayed,
            skipped = report.skipped,
            dropped = report.dropped,
            "offline queue drained"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("container", &self.records.container())
            .field("pending", &self.len())
            .finish()
    }
}

fn queue_key(op_id: u64) -> RecordKey {
    RecordKey::new(Collection::Queue, format!("{op_id:020}"))
}

/// Gives an upsert the timestamp of an edit made at `now`.
fn stamp(operation: QueuedOperation, now: Timestamp) -> QueuedOperation {
    match operation {
        QueuedOperation::UpsertList { mut list } => {
            list.modified_at = Timestamp::bumped(list.modified_at, now);
            QueuedOperation::UpsertList { list }
        }
        QueuedOperation::UpsertItem { mut item } => {
            item.modified_at = Timestamp::bumped(item.modified_at, now);
            QueuedOperation::UpsertItem { item }
        }
        other => other,
    }
}

enum Replay {
    Applied,
    Skipped,
    Dropped,
}

fn replay(
    txn: &mut StoreTransaction<'_>,
    policy: ConflictPolicy,
    operation: &QueuedOperation,
) -> CoreResult<Replay> {
    let outcome = match operation {
        QueuedOperation::UpsertList { list } => match txn.list(&list.id) {
            Some(current) if current == list => Replay::Skipped,
            Some(current) if policy.resolve(current, list) == ConflictResolution::KeepLocal => {
                Replay::Skipped
            }
            _ => {
                txn.put_list(list.clone());
                Replay::Applied
            }
        },
        QueuedOperation::UpsertItem { item } => {
            if txn.list(&item.list_id).is_none() {
                return Ok(Replay::Dropped);
            }
            match txn.item(&item.id) {
                Some(current) if current == item => Replay::Skipped,
                Some(current) if policy.resolve(current, item) == ConflictResolution::KeepLocal => {
                    Replay::Skipped
                }
                _ => {
                    let previous_list = txn.item(&item.id).map(|current| current.list_id);
                    txn.put_item(item.clone())?;
                    txn.touch_list(&item.list_id);
                    if let Some(previous) = previous_list.filter(|id| id != &item.list_id) {
                        txn.touch_list(&previous);
                    }
                    Replay::Applied
                }
            }
        }
        QueuedOperation::DeleteList { id } => {
            if txn.remove_list(id) {
                Replay::Applied
            } else {
                Replay::Skipped
            }
        }
        QueuedOperation::DeleteItem { id } => {
            let list_id = txn.item(id).map(|item| item.list_id);
            match list_id {
                Some(list_id) => {
                    txn.remove_item(id);
                    txn.touch_list(&list_id);
                    Replay::Applied
                }
                None => Replay::Skipped,
            }
        }
    };
    Ok(outcome)
}

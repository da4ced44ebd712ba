//! In-memory log of queued operations.

use crate::operation::QueuedOperation;
use listsync_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An entry in the operation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Position in submission order, starting at 1.
    pub op_id: u64,
    /// When the operation was queued.
    pub enqueued_at: Timestamp,
    /// The operation.
    pub operation: QueuedOperation,
    /// Whether the operation has been replayed.
    #[serde(default)]
    pub acknowledged: bool,
}

/// A FIFO log of operations waiting to be replayed.
///
/// # Invariants
///
/// - Operations are kept in submission order
/// - Operation ids strictly increase
/// - Acknowledged operations at the front can be compacted
#[derive(Debug)]
pub struct OperationLog {
    /// Entries, oldest first.
    entries: VecDeque<QueueEntry>,
    /// Next operation ID.
    next_op_id: u64,
}

impl OperationLog {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_op_id: 1,
        }
    }

    /// Rebuilds a log from persisted entries, in any order.
    pub fn from_entries(entries: impl IntoIterator<Item = QueueEntry>) -> Self {
        let mut entries: Vec<QueueEntry> = entries.into_iter().collect();
        entries.sort_by_key(|entry| entry.op_id);
        let next_op_id = entries.last().map_or(1, |entry| entry.op_id + 1);
        Self {
            entries: entries.into(),
            next_op_id,
        }
    }

    /// Appends an operation. Returns the entry that was added.
    pub fn append(&mut self, operation: QueuedOperation, now: Timestamp) -> &QueueEntry {
        let op_id = self.next_op_id;
        self.next_op_id += 1;
        self.entries.push_back(QueueEntry {
            op_id,
            enqueued_at: now,
            operation,
            acknowledged: false,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Returns pending (unacknowledged) entries, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter().filter(|e| !e.acknowledged)
    }

    /// Returns the number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Acknowledges entries up to and including `op_id`.
    pub fn acknowledge_up_to(&mut self, op_id: u64) {
        for entry in &mut self.entries {
            if entry.op_id <= op_id {
                entry.acknowledged = true;
            }
        }
    }

    /// Removes acknowledged entries from the front. Returns their ids.
    pub fn compact(&mut self) -> Vec<u64> {
        let mut removed = Vec::new();
        while let Some(entry) = self.entries.front() {
            if !entry.acknowledged {
                break;
            }
            removed.push(entry.op_id);
            self.entries.pop_front();
        }
        removed
    }

    /// Returns the next operation ID.
    pub fn next_op_id(&self) -> u64 {
        self.next_op_id
    }

    /// Returns the total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_core::ListId;

    fn delete(n: u128) -> QueuedOperation {
        QueuedOperation::DeleteList {
            id: ListId::from_u128(n),
        }
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let mut log = OperationLog::new();
        let now = Timestamp::from_millis(0);
        assert_eq!(log.append(delete(1), now).op_id, 1);
        assert_eq!(log.append(delete(2), now).op_id, 2);
        assert_eq!(log.next_op_id(), 3);
    }

    #[test]
    fn acknowledge_and_compact() {
        let mut log = OperationLog::new();
        let now = Timestamp::from_millis(0);
        for n in 1..=4 {
            log.append(delete(n), now);
        }

        log.acknowledge_up_to(2);
        assert_eq!(log.pending_count(), 2);
        assert_eq!(log.pending().next().unwrap().op_id, 3);
        assert_eq!(log.compact(), vec![1, 2]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn from_entries_restores_order_and_next_id() {
        let now = Timestamp::from_millis(0);
        let mut log = OperationLog::new();
        let entries: Vec<QueueEntry> = (1..=3).map(|n| log.append(delete(n), now).clone()).collect();

        let restored = OperationLog::from_entries(entries.into_iter().rev());
        let ids: Vec<u64> = restored.pending().map(|e| e.op_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(restored.next_op_id(), 4);
        assert!(OperationLog::from_entries(Vec::new()).is_empty());
    }
}

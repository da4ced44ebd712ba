//! Mutation intents buffered while the remote replica is unreachable.

use listsync_core::{Item, ItemId, List, ListId};
use serde::{Deserialize, Serialize};

/// Type of queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// Entity was created or updated.
    Upsert,
    /// Entity was deleted.
    Delete,
}

/// A local mutation waiting to be replayed.
///
/// Every variant is idempotent: replaying it after it already took effect
/// changes nothing. Upserts carry the full entity value, so replay goes
/// through the same last-write-wins path as a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum QueuedOperation {
    /// Insert or update a list.
    UpsertList {
        /// The list value.
        list: List,
    },
    /// Insert or update an item.
    UpsertItem {
        /// The item value.
        item: Item,
    },
    /// Delete a list and its items.
    DeleteList {
        /// The list.
        id: ListId,
    },
    /// Delete an item.
    DeleteItem {
        /// The item.
        id: ItemId,
    },
}

impl QueuedOperation {
    /// Returns the operation type.
    pub fn op_type(&self) -> OperationType {
        match self {
            QueuedOperation::UpsertList { .. } | QueuedOperation::UpsertItem { .. } => {
                OperationType::Upsert
            }
            QueuedOperation::DeleteList { .. } | QueuedOperation::DeleteItem { .. } => {
                OperationType::Delete
            }
        }
    }

    /// Returns the identifier of the affected entity.
    pub fn entity_id(&self) -> String {
        match self {
            QueuedOperation::UpsertList { list } => list.id.to_string(),
            QueuedOperation::UpsertItem { item } => item.id.to_string(),
            QueuedOperation::DeleteList { id } => id.to_string(),
            QueuedOperation::DeleteItem { id } => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_core::Timestamp;

    #[test]
    fn tagged_encoding() {
        let op = QueuedOperation::DeleteList {
            id: ListId::from_u128(1),
        };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(
            json,
            "{\"op\":\"deleteList\",\"id\":\"00000000-0000-0000-0000-000000000001\"}"
        );
        assert_eq!(op.op_type(), OperationType::Delete);
    }

    #[test]
    fn upsert_carries_full_value() {
        let list = List::new("A", 0, Timestamp::from_millis(5));
        let op = QueuedOperation::UpsertList { list: list.clone() };
        let decoded: QueuedOperation =
            serde_json::from_slice(&serde_json::to_vec(&op).unwrap()).unwrap();
        assert_eq!(decoded, op);
        assert_eq!(decoded.entity_id(), list.id.to_string());
        assert_eq!(decoded.op_type(), OperationType::Upsert);
    }
}

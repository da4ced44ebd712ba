//! Lists, items and snapshots.
//!
//! Field names and order follow the snapshot wire format, so these types
//! serialize directly into what replicas exchange.

use crate::types::{ItemId, ListId, Timestamp};
use serde::{Deserialize, Serialize};

/// A named, ordered list of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    /// Identifier, immutable after creation.
    pub id: ListId,
    /// Display name.
    pub name: String,
    /// Position among active lists.
    pub order_number: u32,
    /// Archived lists are local-only and never removed by absence.
    pub is_archived: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time. Never decreases.
    pub modified_at: Timestamp,
}

impl List {
    /// Creates an active list created and modified at `now`.
    pub fn new(name: impl Into<String>, order_number: u32, now: Timestamp) -> Self {
        Self {
            id: ListId::new(),
            name: name.into(),
            order_number,
            is_archived: false,
            created_at: now,
            modified_at: now,
        }
    }

    /// Returns true if the user-visible fields match, ignoring timestamps.
    pub fn same_content(&self, other: &List) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.order_number == other.order_number
            && self.is_archived == other.is_archived
    }
}

/// An entry in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Identifier, immutable after creation.
    pub id: ItemId,
    /// Title.
    pub title: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_description: Option<String>,
    /// Optional quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    /// Whether the item has been ticked off.
    pub is_crossed_out: bool,
    /// Position within the owning list.
    pub order_number: u32,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time. Never decreases.
    pub modified_at: Timestamp,
    /// Owning list.
    pub list_id: ListId,
}

impl Item {
    /// Creates an item in `list_id` created and modified at `now`.
    pub fn new(list_id: ListId, title: impl Into<String>, order_number: u32, now: Timestamp) -> Self {
        Self {
            id: ItemId::new(),
            title: title.into(),
            item_description: None,
            quantity: None,
            is_crossed_out: false,
            order_number,
            created_at: now,
            modified_at: now,
            list_id,
        }
    }

    /// Returns true if the user-visible fields match, ignoring timestamps.
    pub fn same_content(&self, other: &Item) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.item_description == other.item_description
            && self.quantity == other.quantity
            && self.is_crossed_out == other.is_crossed_out
            && self.order_number == other.order_number
            && self.list_id == other.list_id
    }
}

/// A list together with its items, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSnapshot {
    /// The list.
    #[serde(flatten)]
    pub list: List,
    /// Items owned by the list.
    pub items: Vec<Item>,
}

impl ListSnapshot {
    /// Creates a list snapshot.
    pub fn new(list: List, items: Vec<Item>) -> Self {
        Self { list, items }
    }

    /// Returns the identifiers of the owned items, in order.
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }
}

/// A point-in-time view of a replica's lists and items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Lists in display order.
    pub lists: Vec<ListSnapshot>,
}

impl Snapshot {
    /// Creates a snapshot from lists.
    pub fn new(lists: Vec<ListSnapshot>) -> Self {
        Self { lists }
    }

    /// Creates an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the snapshot carries no lists.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Returns the number of lists.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Returns the total number of items across all lists.
    pub fn item_count(&self) -> usize {
        self.lists.iter().map(|entry| entry.items.len()).sum()
    }

    /// Finds a list by identifier.
    pub fn find(&self, id: &ListId) -> Option<&ListSnapshot> {
        self.lists.iter().find(|entry| &entry.list.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn list_wire_shape() {
        let list = List {
            id: ListId::from_u128(1),
            name: "Groceries".into(),
            order_number: 0,
            is_archived: false,
            created_at: ts(0),
            modified_at: ts(1),
        };
        let mut item = Item::new(list.id, "Milk", 0, ts(0));
        item.id = ItemId::from_u128(2);
        item.quantity = Some(2);

        let snapshot = Snapshot::new(vec![ListSnapshot::new(list, vec![item])]);
        let json = serde_json::to_string(&snapshot).unwrap();

        assert!(json.starts_with(
            "{\"lists\":[{\"id\":\"00000000-0000-0000-0000-000000000001\",\"name\":\"Groceries\",\"orderNumber\":0,\"isArchived\":false,"
        ));
        assert!(json.contains("\"quantity\":2"));
        assert!(!json.contains("itemDescription"));
        assert!(json.contains("\"listId\":\"00000000-0000-0000-0000-000000000001\""));

        let decoded: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn same_content_ignores_timestamps() {
        let a = List::new("A", 0, ts(5));
        let mut b = a.clone();
        b.modified_at = ts(99);
        assert!(a.same_content(&b));
        b.name = "B".into();
        assert!(!a.same_content(&b));
    }

    #[test]
    fn snapshot_counts() {
        let list = List::new("A", 0, ts(0));
        let items = vec![Item::new(list.id, "x", 0, ts(0)), Item::new(list.id, "y", 1, ts(0))];
        let snapshot = Snapshot::new(vec![ListSnapshot::new(list.clone(), items)]);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.item_count(), 2);
        assert_eq!(snapshot.find(&list.id).unwrap().item_ids().len(), 2);
        assert!(Snapshot::empty().is_empty());
    }
}

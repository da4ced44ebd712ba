//! Property-based test generators using proptest.
//!
//! Generated snapshots are well formed: every item sits in the list it
//! names, identifiers are unique, and `modified_at >= created_at`.

use crate::fixtures::START;
use listsync_core::{Item, ItemId, List, ListId, ListSnapshot, Snapshot, Timestamp};
use listsync_protocol::QueuedOperation;
use proptest::prelude::*;

/// Strategy for identifiers. Drawn from a wide range so collisions are
/// vanishingly rare.
pub fn list_id_strategy() -> impl Strategy<Value = ListId> {
    any::<u128>().prop_map(ListId::from_u128)
}

/// Strategy for item identifiers.
pub fn item_id_strategy() -> impl Strategy<Value = ItemId> {
    any::<u128>().prop_map(ItemId::from_u128)
}

/// Strategy for timestamps within `spread` milliseconds after the fixture
/// start. A small spread makes ties likely.
pub fn timestamp_strategy(spread: i64) -> impl Strategy<Value = Timestamp> {
    (0..spread.max(1)).prop_map(|offset| Timestamp::from_millis(START.as_millis() + offset))
}

/// Strategy for display names and titles, including non-ASCII text.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-zA-Z0-9 ]{1,24}").expect("Invalid regex"),
        prop::string::string_regex("[à-ÿ€✓ ]{1,8}").expect("Invalid regex"),
    ]
}

/// Strategy for a list whose timestamps fall within `spread`.
pub fn list_strategy(spread: i64) -> impl Strategy<Value = List> {
    (
        list_id_strategy(),
        text_strategy(),
        0u32..64,
        timestamp_strategy(spread),
        0..spread.max(1),
    )
        .prop_map(|(id, name, order_number, created_at, age)| List {
            id,
            name,
            order_number,
            is_archived: false,
            created_at,
            modified_at: Timestamp::from_millis(created_at.as_millis() + age),
        })
}

/// Strategy for an item in `list_id`.
pub fn item_strategy(list_id: ListId, spread: i64) -> impl Strategy<Value = Item> {
    (
        item_id_strategy(),
        text_strategy(),
        prop::option::of(text_strategy()),
        prop::option::of(0i64..100),
        any::<bool>(),
        0u32..256,
        timestamp_strategy(spread),
        0..spread.max(1),
    )
        .prop_map(
            move |(id, title, item_description, quantity, is_crossed_out, order_number, created_at, age)| Item {
                id,
                title,
                item_description,
                quantity,
                is_crossed_out,
                order_number,
                created_at,
                modified_at: Timestamp::from_millis(created_at.as_millis() + age),
                list_id,
            },
        )
}

/// Strategy for a list with up to `max_items` items.
pub fn list_snapshot_strategy(max_items: usize, spread: i64) -> impl Strategy<Value = ListSnapshot> {
    list_strategy(spread).prop_flat_map(move |list| {
        let id = list.id;
        prop::collection::vec(item_strategy(id, spread), 0..=max_items)
            .prop_map(move |items| ListSnapshot::new(list.clone(), items))
    })
}

/// Strategy for an active snapshot with up to `max_lists` lists.
pub fn snapshot_strategy(max_lists: usize, max_items: usize, spread: i64) -> impl Strategy<Value = Snapshot> {
    prop::collection::vec(list_snapshot_strategy(max_items, spread), 0..=max_lists)
        .prop_map(|lists| Snapshot::new(dedup_ids(lists)))
}

/// Strategy for the same snapshot as edited elsewhere: each list and item
/// keeps its identity and owner but may get new content and a timestamp in
/// the same window, so some edits win, some lose and some tie.
pub fn diverged_strategy(base: Snapshot, spread: i64) -> impl Strategy<Value = Snapshot> {
    let entities = base.len() + base.item_count();
    prop::collection::vec((any::<bool>(), text_strategy(), timestamp_strategy(spread)), entities)
        .prop_map(move |edits| {
            let mut edits = edits.into_iter();
            let mut diverged = base.clone();
            for entry in &mut diverged.lists {
                if let Some((edit, name, modified_at)) = edits.next() {
                    if edit {
                        entry.list.name = name;
                        entry.list.modified_at = modified_at.max(entry.list.created_at);
                    }
                }
                for item in &mut entry.items {
                    if let Some((edit, title, modified_at)) = edits.next() {
                        if edit {
                            item.title = title;
                            item.is_crossed_out = !item.is_crossed_out;
                            item.modified_at = modified_at.max(item.created_at);
                        }
                    }
                }
            }
            diverged
        })
}

/// Strategy for an offline edit against one of `lists`: an item upsert,
/// a list rename, or an item delete.
pub fn queued_operation_strategy(lists: Vec<ListSnapshot>, spread: i64) -> impl Strategy<Value = QueuedOperation> {
    let count = lists.len().max(1);
    (0..count, 0u8..3, text_strategy(), timestamp_strategy(spread), item_id_strategy()).prop_map(
        move |(index, kind, text, now, fresh_id)| {
            let Some(entry) = lists.get(index) else {
                return QueuedOperation::DeleteItem { id: fresh_id };
            };
            match (kind, entry.items.first()) {
                (1, _) => {
                    let mut list = entry.list.clone();
                    list.name = text;
                    list.modified_at = now.max(list.modified_at);
                    QueuedOperation::UpsertList { list }
                }
                (2, Some(item)) => QueuedOperation::DeleteItem { id: item.id },
                _ => {
                    let mut item = Item::new(entry.list.id, text, entry.items.len() as u32, now);
                    item.id = fresh_id;
                    QueuedOperation::UpsertItem { item }
                }
            }
        },
    )
}

/// Drops lists and items whose identifier already appeared.
fn dedup_ids(lists: Vec<ListSnapshot>) -> Vec<ListSnapshot> {
    let mut list_ids = std::collections::HashSet::new();
    let mut item_ids = std::collections::HashSet::new();
    lists
        .into_iter()
        .filter(|entry| list_ids.insert(entry.list.id))
        .map(|mut entry| {
            entry.items.retain(|item| item_ids.insert(item.id));
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn snapshots_are_well_formed(snapshot in snapshot_strategy(6, 6, 1_000)) {
            for entry in &snapshot.lists {
                prop_assert!(entry.list.modified_at >= entry.list.created_at);
                for item in &entry.items {
                    prop_assert_eq!(item.list_id, entry.list.id);
                    prop_assert!(item.modified_at >= item.created_at);
                }
            }
        }

        #[test]
        fn diverged_keeps_identity(
            (base, diverged) in snapshot_strategy(4, 4, 100)
                .prop_flat_map(|base| (Just(base.clone()), diverged_strategy(base, 100)))
        ) {
            prop_assert_eq!(base.len(), diverged.len());
            for (a, b) in base.lists.iter().zip(&diverged.lists) {
                prop_assert_eq!(a.list.id, b.list.id);
                prop_assert_eq!(a.item_ids(), b.item_ids());
            }
        }
    }
}

//! Shared data for the listsync benchmarks.
//!
//! Identifiers and timestamps are derived from positions, so every run
//! measures the same bytes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use listsync_core::{Item, ItemId, List, ListId, ListSnapshot, Snapshot, Timestamp};

/// Base time of generated entities.
pub const BASE: Timestamp = Timestamp::from_millis(1_700_000_000_000);

/// Builds `lists` lists of `items` items each.
pub fn snapshot(lists: usize, items: usize) -> Snapshot {
    snapshot_at(lists, items, 0)
}

/// Builds the same lists and items as [`snapshot`], modified `offset`
/// milliseconds later and with every item crossed out.
pub fn edited(lists: usize, items: usize, offset: i64) -> Snapshot {
    let mut snapshot = snapshot_at(lists, items, offset);
    for entry in &mut snapshot.lists {
        for item in &mut entry.items {
            item.is_crossed_out = true;
        }
    }
    snapshot
}

fn snapshot_at(lists: usize, items: usize, offset: i64) -> Snapshot {
    let now = Timestamp::from_millis(BASE.as_millis() + offset);
    Snapshot::new(
        (0..lists)
            .map(|l| {
                let mut list = List::new(format!("List {l}"), l as u32, BASE);
                list.id = ListId::from_u128(l as u128 + 1);
                list.modified_at = now;
                let entries = (0..items)
                    .map(|i| {
                        let mut item = Item::new(list.id, format!("Item {i} of list {l}"), i as u32, BASE);
                        item.id = ItemId::from_u128(((l as u128 + 1) << 32) | i as u128);
                        item.quantity = Some((i % 7) as i64);
                        item.modified_at = now;
                        item
                    })
                    .collect();
                ListSnapshot::new(list, entries)
            })
            .collect(),
    )
}

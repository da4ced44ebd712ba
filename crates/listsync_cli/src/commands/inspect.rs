//! Inspect command implementation.

use crate::Format;
use listsync_core::{ListId, Snapshot, Timestamp};
use serde::Serialize;
use std::path::PathBuf;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Number of files read.
    pub units: usize,
    /// Total bytes read.
    pub total_bytes: usize,
    /// Number of lists.
    pub list_count: usize,
    /// Number of archived lists.
    pub archived_count: usize,
    /// Number of items.
    pub item_count: usize,
    /// Number of crossed-out items.
    pub crossed_out_count: usize,
    /// Latest modification time across lists and items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    /// Lists the sender could not transmit.
    pub omitted_list_ids: Vec<ListId>,
    /// Per-list details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lists: Option<Vec<ListSummary>>,
}

/// Summary of a single list.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    /// List id.
    pub id: ListId,
    /// List name.
    pub name: String,
    /// Whether it is archived.
    pub is_archived: bool,
    /// Number of items.
    pub item_count: usize,
    /// Last modification time.
    pub modified_at: Timestamp,
}

/// Runs the inspect command.
pub fn run(files: &[PathBuf], show_lists: bool, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = super::load(files)?;
    let mut result = summarize(&loaded.received.snapshot, show_lists);
    result.units = loaded.unit_sizes.len();
    result.total_bytes = loaded.unit_sizes.iter().sum();
    result.omitted_list_ids = loaded.received.omitted_list_ids;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Computes counts for a snapshot.
pub fn summarize(snapshot: &Snapshot, show_lists: bool) -> InspectResult {
    let items = snapshot.lists.iter().flat_map(|entry| entry.items.iter());
    let last_modified = snapshot
        .lists
        .iter()
        .map(|entry| entry.list.modified_at)
        .chain(items.clone().map(|item| item.modified_at))
        .max();

    InspectResult {
        units: 0,
        total_bytes: 0,
        list_count: snapshot.len(),
        archived_count: snapshot.lists.iter().filter(|entry| entry.list.is_archived).count(),
        item_count: snapshot.item_count(),
        crossed_out_count: items.filter(|item| item.is_crossed_out).count(),
        last_modified,
        omitted_list_ids: Vec::new(),
        lists: show_lists.then(|| {
            snapshot
                .lists
                .iter()
                .map(|entry| ListSummary {
                    id: entry.list.id,
                    name: entry.list.name.clone(),
                    is_archived: entry.list.is_archived,
                    item_count: entry.items.len(),
                    modified_at: entry.list.modified_at,
                })
                .collect()
        }),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Snapshot");
    println!("========");
    println!("Units:          {}", result.units);
    println!("Total size:     {} bytes", result.total_bytes);
    println!("Lists:          {} ({} archived)", result.list_count, result.archived_count);
    println!("Items:          {} ({} crossed out)", result.item_count, result.crossed_out_count);
    if let Some(last) = result.last_modified {
        println!("Last modified:  {last}");
    }
    if !result.omitted_list_ids.is_empty() {
        println!("Omitted lists:  {}", result.omitted_list_ids.len());
        for id in &result.omitted_list_ids {
            println!("  {id}");
        }
    }

    if let Some(lists) = &result.lists {
        println!();
        println!("Lists");
        println!("-----");
        for list in lists {
            let archived = if list.is_archived { " [archived]" } else { "" };
            println!("  {} {:>5} items  {}{archived}", list.id, list.item_count, list.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_core::{Item, List, ListSnapshot};

    #[test]
    fn summarize_counts() {
        let mut archived = List::new("Old", 1, Timestamp::from_millis(5));
        archived.is_archived = true;
        let list = List::new("Groceries", 0, Timestamp::from_millis(10));
        let mut milk = Item::new(list.id, "Milk", 0, Timestamp::from_millis(20));
        milk.is_crossed_out = true;
        let bread = Item::new(list.id, "Bread", 1, Timestamp::from_millis(15));

        let snapshot = Snapshot::new(vec![
            ListSnapshot::new(list, vec![milk, bread]),
            ListSnapshot::new(archived, Vec::new()),
        ]);
        let result = summarize(&snapshot, true);

        assert_eq!(result.list_count, 2);
        assert_eq!(result.archived_count, 1);
        assert_eq!(result.item_count, 2);
        assert_eq!(result.crossed_out_count, 1);
        assert_eq!(result.last_modified, Some(Timestamp::from_millis(20)));
        assert_eq!(result.lists.unwrap()[0].item_count, 2);
    }
}

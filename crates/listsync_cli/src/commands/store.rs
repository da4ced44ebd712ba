//! Store command implementation.

use crate::Format;
use listsync_core::{EntityStore, StoreConfig, SystemClock};
use listsync_engine::OfflineQueue;
use listsync_protocol::{ConflictPolicy, QueueEntry};
use listsync_storage::{FileRecordStore, RecordStore};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Container summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResult {
    /// Container directory.
    pub path: String,
    /// Number of lists.
    pub list_count: usize,
    /// Number of active lists.
    pub active_list_count: usize,
    /// Number of items.
    pub item_count: usize,
    /// Items dropped on load because their list is missing.
    pub orphans_dropped: u64,
    /// Operations waiting in the offline queue.
    pub queued: Vec<QueuedSummary>,
}

/// One queued operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedSummary {
    /// Operation id.
    pub op_id: u64,
    /// Operation kind.
    pub kind: String,
    /// Affected entity.
    pub entity_id: String,
}

impl From<&QueueEntry> for QueuedSummary {
    fn from(entry: &QueueEntry) -> Self {
        let kind = match &entry.operation {
            listsync_protocol::QueuedOperation::UpsertList { .. } => "upsertList",
            listsync_protocol::QueuedOperation::UpsertItem { .. } => "upsertItem",
            listsync_protocol::QueuedOperation::DeleteList { .. } => "deleteList",
            listsync_protocol::QueuedOperation::DeleteItem { .. } => "deleteItem",
        };
        Self {
            op_id: entry.op_id,
            kind: kind.to_string(),
            entity_id: entry.operation.entity_id(),
        }
    }
}

/// Runs the store command.
pub fn run(root: &Path, container: &str, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = summarize(root, container)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Opens a container without repairing it and summarizes what it holds.
pub fn summarize(root: &Path, container: &str) -> Result<StoreResult, Box<dyn std::error::Error>> {
    let file_store = FileRecordStore::open(root, container)?;
    let path = file_store.path().display().to_string();
    let records: Arc<dyn RecordStore> = Arc::new(file_store);
    let clock = Arc::new(SystemClock);

    let store = EntityStore::open(
        records.clone(),
        clock.clone(),
        StoreConfig::default().repair_on_load(false),
    )?;
    let queue = OfflineQueue::open(records, clock, ConflictPolicy::default())?;

    Ok(StoreResult {
        path,
        list_count: store.list_count(),
        active_list_count: store.active_snapshot().len(),
        item_count: store.item_count(),
        orphans_dropped: store.stats().orphans_dropped(),
        queued: queue.pending().iter().map(QueuedSummary::from).collect(),
    })
}

fn print_text_output(result: &StoreResult) {
    println!("Container");
    println!("=========");
    println!("Path:     {}", result.path);
    println!("Lists:    {} ({} active)", result.list_count, result.active_list_count);
    println!("Items:    {}", result.item_count);
    if result.orphans_dropped > 0 {
        println!("Orphans:  {}", result.orphans_dropped);
    }
    println!("Queued:   {}", result.queued.len());
    for op in &result.queued {
        println!("  #{:<6} {:<11} {}", op.op_id, op.kind, op.entity_id);
    }
}

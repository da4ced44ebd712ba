//! Verify command implementation.

use listsync_core::Snapshot;
use listsync_protocol::SnapshotCodec;
use std::collections::HashSet;
use std::path::PathBuf;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of lists checked.
    pub lists_checked: usize,
    /// Number of items checked.
    pub items_checked: usize,
    /// Problems that would make a merge drop or reject data.
    pub errors: Vec<String>,
    /// Problems a sync tolerates.
    pub warnings: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(files: &[PathBuf], ceiling: usize) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = super::load(files)?;
    println!(
        "Verifying snapshot ({} units, {} bytes)",
        loaded.unit_sizes.len(),
        loaded.unit_sizes.iter().sum::<usize>()
    );
    println!();

    let result = check(&loaded.received.snapshot, ceiling)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Snapshot verification passed");
        Ok(())
    } else {
        println!("✗ Snapshot verification failed");
        Err("Verification failed".into())
    }
}

/// Checks a snapshot for problems a receiving replica would hit.
pub fn check(snapshot: &Snapshot, ceiling: usize) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    let mut list_ids = HashSet::new();
    let mut item_ids = HashSet::new();

    for entry in &snapshot.lists {
        let list = &entry.list;
        result.lists_checked += 1;
        if !list_ids.insert(list.id) {
            result.errors.push(format!("List {} appears more than once", list.id));
        }
        if list.modified_at < list.created_at {
            result.warnings.push(format!(
                "List {} was modified ({}) before it was created ({})",
                list.id, list.modified_at, list.created_at
            ));
        }

        for item in &entry.items {
            result.items_checked += 1;
            if item.list_id != list.id {
                result.errors.push(format!(
                    "Item {} claims list {} but is carried by list {}",
                    item.id, item.list_id, list.id
                ));
            }
            if !item_ids.insert(item.id) {
                result.errors.push(format!("Item {} appears more than once", item.id));
            }
            if item.modified_at < item.created_at {
                result.warnings.push(format!(
                    "Item {} was modified ({}) before it was created ({})",
                    item.id, item.modified_at, item.created_at
                ));
            }
        }
    }

    let batch = SnapshotCodec::new(ceiling).encode_for_transport(snapshot)?;
    for skipped in &batch.skipped {
        result.warnings.push(format!(
            "List {} needs {} bytes and would not be sent under a {ceiling}-byte ceiling",
            skipped.list_id, skipped.size
        ));
    }

    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("Lists checked: {}", result.lists_checked);
    println!("Items checked: {}", result.items_checked);

    if !result.warnings.is_empty() {
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!("  - {error}");
        }
    }
}

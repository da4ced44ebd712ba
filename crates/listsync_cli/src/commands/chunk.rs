//! Chunk command implementation.

use listsync_protocol::{SnapshotCodec, TransportBatch};
use std::path::{Path, PathBuf};

/// Runs the chunk command.
pub fn run(file: &Path, out: &Path, ceiling: usize) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = super::load(&[file.to_path_buf()])?;
    let batch = SnapshotCodec::new(ceiling).encode_for_transport(&loaded.received.snapshot)?;
    let written = write_units(&batch, out)?;

    match batch.session_id {
        Some(session_id) => println!("Session {session_id}: {} chunks", batch.len()),
        None => println!("Snapshot fits in one unit"),
    }
    for (path, unit) in written.iter().zip(&batch.units) {
        println!("  {} ({} bytes)", path.display(), unit.len());
    }
    for skipped in &batch.skipped {
        println!(
            "  skipped list {} ({} bytes over a {ceiling}-byte ceiling)",
            skipped.list_id, skipped.size
        );
    }
    Ok(())
}

/// Writes each unit to `out` as `chunk-NNN.json`, creating the directory.
pub fn write_units(batch: &TransportBatch, out: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out)?;
    let mut written = Vec::with_capacity(batch.len());
    for (index, unit) in batch.units.iter().enumerate() {
        let path = out.join(format!("chunk-{index:03}.json"));
        std::fs::write(&path, unit)?;
        written.push(path);
    }
    Ok(written)
}

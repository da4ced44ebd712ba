//! CLI command implementations.

pub mod chunk;
pub mod inspect;
pub mod simulate;
pub mod store;
pub mod verify;

use listsync_engine::{Inbound, Received};
use listsync_protocol::{ReceivedSnapshot, SnapshotCodec, DEFAULT_CHUNK_TIMEOUT};
use std::path::PathBuf;
use std::time::Instant;

/// A snapshot read from disk, with the raw sizes of the files it came from.
pub struct Loaded {
    /// The rebuilt snapshot.
    pub received: ReceivedSnapshot,
    /// Size of each file, in order.
    pub unit_sizes: Vec<usize>,
}

/// Reads a whole snapshot, or every chunk of one session.
pub fn load(files: &[PathBuf]) -> Result<Loaded, Box<dyn std::error::Error>> {
    let mut units = Vec::with_capacity(files.len());
    for file in files {
        units.push(std::fs::read(file).map_err(|err| format!("{}: {err}", file.display()))?);
    }
    let unit_sizes = units.iter().map(Vec::len).collect();

    let inbound = Inbound::new(SnapshotCodec::default(), DEFAULT_CHUNK_TIMEOUT);
    match inbound.receive(&units, Instant::now())? {
        Received::Complete(received) => Ok(Loaded {
            received,
            unit_sizes,
        }),
        Received::Pending { session_id } => {
            Err(format!("chunk session {session_id} is incomplete; pass every chunk file").into())
        }
        Received::Nothing => Err("no input files".into()),
    }
}

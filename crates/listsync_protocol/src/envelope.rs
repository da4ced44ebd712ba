//! Transmitted units.

use listsync_core::{ListId, Snapshot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One chunk of a snapshot that was too large to send whole.
///
/// The payload is a sub-snapshot made of whole lists. Concatenating the
/// payloads of a session in `chunk_index` order gives back the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEnvelope {
    /// Identifies the chunk session.
    pub session_id: Uuid,
    /// Position of this chunk, from zero.
    pub chunk_index: u32,
    /// Total number of chunks in the session.
    pub chunk_count: u32,
    /// The lists carried by this chunk.
    pub payload: Snapshot,
    /// Lists the sender holds but could not fit in any chunk. The receiver
    /// must not treat them as deleted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omitted_list_ids: Vec<ListId>,
}

impl ChunkEnvelope {
    /// Creates a chunk envelope.
    pub fn new(session_id: Uuid, chunk_index: u32, chunk_count: u32, payload: Snapshot) -> Self {
        Self {
            session_id,
            chunk_index,
            chunk_count,
            payload,
            omitted_list_ids: Vec::new(),
        }
    }

    /// Sets the ids of lists left out of the session.
    #[must_use]
    pub fn with_omitted(mut self, omitted_list_ids: Vec<ListId>) -> Self {
        self.omitted_list_ids = omitted_list_ids;
        self
    }

    /// Returns true if this is the last chunk of its session.
    pub fn is_last(&self) -> bool {
        self.chunk_index + 1 == self.chunk_count
    }
}

/// A decoded transmitted unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A snapshot small enough to travel whole.
    Snapshot(Snapshot),
    /// One chunk of a larger snapshot.
    Chunk(ChunkEnvelope),
}

/// A snapshot rebuilt from one or more received units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedSnapshot {
    /// The lists received.
    pub snapshot: Snapshot,
    /// Lists the sender holds but could not send.
    pub omitted_list_ids: Vec<ListId>,
}

impl ReceivedSnapshot {
    /// Wraps a snapshot that arrived whole.
    pub fn whole(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            omitted_list_ids: Vec::new(),
        }
    }
}

impl From<Snapshot> for ReceivedSnapshot {
    fn from(snapshot: Snapshot) -> Self {
        Self::whole(snapshot)
    }
}

/// A list left out of a transmission because it alone exceeds the ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedList {
    /// The list.
    pub list_id: ListId,
    /// Size of the smallest unit that could have carried it.
    pub size: usize,
}

/// The units a snapshot is sent as.
#[derive(Debug, Clone, Default)]
pub struct TransportBatch {
    /// Chunk session, if the snapshot was chunked.
    pub session_id: Option<Uuid>,
    /// Encoded units, in send order.
    pub units: Vec<Vec<u8>>,
    /// Lists that could not be sent.
    pub skipped: Vec<SkippedList>,
}

impl TransportBatch {
    /// Returns true if the snapshot was split into chunks.
    pub fn is_chunked(&self) -> bool {
        self.session_id.is_some()
    }

    /// Returns the number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if there are no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns the total number of bytes across all units.
    pub fn total_bytes(&self) -> usize {
        self.units.iter().map(Vec::len).sum()
    }

    /// Returns the size of the largest unit.
    pub fn largest_unit(&self) -> usize {
        self.units.iter().map(Vec::len).max().unwrap_or(0)
    }
}

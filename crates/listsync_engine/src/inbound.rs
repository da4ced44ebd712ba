//! Decoding and reassembly of received units.

use crate::error::SyncResult;
use listsync_protocol::{Frame, Reassembler, ReceivedSnapshot, SnapshotCodec};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// The outcome of receiving a sequence of units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// No units arrived.
    Nothing,
    /// Chunks arrived but their session is still incomplete.
    Pending {
        /// The incomplete session.
        session_id: Uuid,
    },
    /// A snapshot is ready to merge.
    Complete(ReceivedSnapshot),
}

/// Turns received units into snapshots.
///
/// Whole snapshots are returned as they are. Chunks are held per session
/// until the last one arrives. Sessions older than the chunk timeout are
/// dropped, unapplied, before each batch of units is looked at.
pub struct Inbound {
    codec: SnapshotCodec,
    reassembler: Mutex<Reassembler>,
}

impl Inbound {
    /// Creates an inbound side decoding with `codec`.
    pub fn new(codec: SnapshotCodec, chunk_timeout: Duration) -> Self {
        Self {
            codec,
            reassembler: Mutex::new(Reassembler::new(chunk_timeout)),
        }
    }

    /// Returns the number of incomplete chunk sessions held.
    pub fn pending_sessions(&self) -> usize {
        self.reassembler.lock().pending()
    }

    /// Decodes `units` received at `now`.
    ///
    /// If the units complete more than one snapshot, the last one wins. A
    /// complete snapshot is never displaced by chunks of an unfinished
    /// session, and chunks of a session that already completed are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Decoding`](crate::SyncError::Decoding) for a unit
    /// that is neither a snapshot nor a chunk or an inconsistent chunk, and
    /// [`SyncError::PartialChunkTimeout`](crate::SyncError::PartialChunkTimeout)
    /// for a chunk of a session that already timed out.
    pub fn receive(&self, units: &[Vec<u8>], now: Instant) -> SyncResult<Received> {
        let mut reassembler = self.reassembler.lock();
        reassembler.expire(now);

        let mut outcome = Received::Nothing;
        for unit in units {
            match self.codec.decode_frame(unit)? {
                Frame::Snapshot(snapshot) => {
                    outcome = Received::Complete(ReceivedSnapshot::whole(snapshot));
                }
                Frame::Chunk(envelope) => {
                    let session_id = envelope.session_id;
                    match reassembler.accept(envelope, now)? {
                        Some(received) => outcome = Received::Complete(received),
                        None if reassembler.is_completed(&session_id) => {}
                        None if matches!(outcome, Received::Complete(_)) => {}
                        None => outcome = Received::Pending { session_id },
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Drops an incomplete session without applying it.
    pub fn discard(&self, session_id: Uuid) {
        if self.reassembler.lock().discard(&session_id) {
            tracing::warn!(%session_id, "discarding incomplete chunk session");
        }
    }
}

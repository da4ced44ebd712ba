//! Receiver-side chunk session reassembly.

use crate::envelope::{ChunkEnvelope, ReceivedSnapshot};
use crate::error::{ProtocolError, ProtocolResult};
use listsync_core::{ListId, Snapshot};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a chunk session may stay incomplete before it is discarded.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// A chunk session that was discarded without being applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredSession {
    /// The session.
    pub session_id: Uuid,
    /// Chunks received before it expired.
    pub received: usize,
    /// Chunks the session announced.
    pub expected: u32,
}

#[derive(Debug)]
struct PartialSession {
    chunk_count: u32,
    started: Instant,
    chunks: BTreeMap<u32, Snapshot>,
    omitted: Vec<ListId>,
}

impl PartialSession {
    fn is_complete(&self) -> bool {
        self.chunks.len() == self.chunk_count as usize
    }

    fn into_received(self) -> ReceivedSnapshot {
        let lists = self.chunks.into_values().flat_map(|chunk| chunk.lists).collect();
        ReceivedSnapshot {
            snapshot: Snapshot::new(lists),
            omitted_list_ids: self.omitted,
        }
    }
}

/// Collects chunks by session until each session is complete.
///
/// Time is passed in explicitly so callers and tests control expiry.
///
/// # Invariants
///
/// - A session yields a snapshot only once all of its chunks arrived
/// - A session older than the timeout never yields a snapshot
/// - Receiving the same chunk twice has no further effect, also after its
///   session completed
#[derive(Debug)]
pub struct Reassembler {
    timeout: Duration,
    sessions: HashMap<Uuid, PartialSession>,
    completed: HashMap<Uuid, Instant>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_TIMEOUT)
    }
}

impl Reassembler {
    /// Creates a reassembler that discards sessions older than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: HashMap::new(),
            completed: HashMap::new(),
        }
    }

    /// Returns the number of incomplete sessions.
    pub fn pending(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if `session_id` completed within the timeout.
    pub fn is_completed(&self, session_id: &Uuid) -> bool {
        self.completed.contains_key(session_id)
    }

    /// Accepts one chunk received at `now`.
    ///
    /// Returns the rebuilt snapshot when this chunk completes its session.
    /// Chunks of a session that already completed are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidChunk`] for an out-of-range index or a
    /// count that disagrees with earlier chunks (the session is dropped), and
    /// [`ProtocolError::SessionExpired`] if the session already timed out.
    pub fn accept(
        &mut self,
        envelope: ChunkEnvelope,
        now: Instant,
    ) -> ProtocolResult<Option<ReceivedSnapshot>> {
        let ChunkEnvelope {
            session_id,
            chunk_index,
            chunk_count,
            payload,
            omitted_list_ids,
        } = envelope;

        if chunk_count == 0 || chunk_index >= chunk_count {
            return Err(ProtocolError::invalid_chunk(format!(
                "chunk {chunk_index} of {chunk_count} in session {session_id}"
            )));
        }

        if self.completed.contains_key(&session_id) {
            tracing::trace!(%session_id, chunk_index, "ignoring chunk of completed session");
            return Ok(None);
        }

        if let Some(session) = self.sessions.get(&session_id) {
            if now.saturating_duration_since(session.started) >= self.timeout {
                self.sessions.remove(&session_id);
                tracing::warn!(%session_id, "chunk arrived after its session timed out");
                return Err(ProtocolError::SessionExpired { session_id });
            }
            let announced = session.chunk_count;
            if announced != chunk_count {
                self.sessions.remove(&session_id);
                return Err(ProtocolError::invalid_chunk(format!(
                    "session {session_id} announced {announced} chunks, chunk {chunk_index} says {chunk_count}"
                )));
            }
        }

        let session = self
            .sessions
            .entry(session_id)
            .or_insert_with(|| PartialSession {
                chunk_count,
                started: now,
                chunks: BTreeMap::new(),
                omitted: omitted_list_ids,
            });
        session.chunks.insert(chunk_index, payload);
        tracing::trace!(%session_id, chunk_index, chunk_count, "chunk accepted");

        if !session.is_complete() {
            return Ok(None);
        }
        self.completed.insert(session_id, now);
        Ok(self
            .sessions
            .remove(&session_id)
            .map(PartialSession::into_received))
    }

    /// Discards every session older than the timeout at `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<ExpiredSession> {
        let timeout = self.timeout;
        self.completed
            .retain(|_, finished| now.saturating_duration_since(*finished) < timeout);
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|(_, session)| now.saturating_duration_since(session.started) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|session_id| {
                let session = self.sessions.remove(&session_id)?;
                tracing::warn!(
                    %session_id,
                    received = session.chunks.len(),
                    expected = session.chunk_count,
                    "discarding incomplete chunk session"
                );
                Some(ExpiredSession {
                    session_id,
                    received: session.chunks.len(),
                    expected: session.chunk_count,
                })
            })
            .collect()
    }

    /// Discards one incomplete session. Returns false if it was not held.
    pub fn discard(&mut self, session_id: &Uuid) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Discards every incomplete session.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

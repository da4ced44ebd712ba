//! The responding side of an exchange.

use crate::error::SyncResult;
use crate::inbound::{Inbound, Received};
use crate::merge::{MergeEngine, MergeReport};
use listsync_core::EntityStore;
use listsync_protocol::{ConflictPolicy, SnapshotCodec};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A replica answering exchanges started by another replica.
///
/// Each exchange merges what arrived under the same rules as the initiator
/// and replies with the responder's active snapshot. While a chunked
/// snapshot is still incomplete the reply is empty, which the initiator
/// treats as "no update".
pub struct SyncPeer {
    store: Arc<EntityStore>,
    merge: MergeEngine,
    codec: SnapshotCodec,
    inbound: Inbound,
    last_report: Mutex<Option<MergeReport>>,
}

impl SyncPeer {
    /// Creates a responder over `store`.
    pub fn new(
        store: Arc<EntityStore>,
        codec: SnapshotCodec,
        policy: ConflictPolicy,
        chunk_timeout: Duration,
    ) -> Self {
        Self {
            store,
            merge: MergeEngine::new(policy),
            codec,
            inbound: Inbound::new(codec, chunk_timeout),
            last_report: Mutex::new(None),
        }
    }

    /// Creates a responder with default codec, policy and chunk timeout.
    pub fn with_defaults(store: Arc<EntityStore>) -> Self {
        Self::new(
            store,
            SnapshotCodec::default(),
            ConflictPolicy::default(),
            listsync_protocol::DEFAULT_CHUNK_TIMEOUT,
        )
    }

    /// Returns the responder's store.
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Returns the report of the last merge this responder applied.
    pub fn last_report(&self) -> Option<MergeReport> {
        self.last_report.lock().clone()
    }

    /// Handles one exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the units cannot be decoded, the merge cannot be
    /// saved, or the reply cannot be encoded.
    pub fn respond(&self, units: &[Vec<u8>]) -> SyncResult<Vec<Vec<u8>>> {
        match self.inbound.receive(units, Instant::now())? {
            Received::Pending { session_id } => {
                tracing::debug!(%session_id, "waiting for remaining chunks");
                return Ok(Vec::new());
            }
            Received::Nothing => {}
            Received::Complete(received) => {
                let report = self.merge.reconcile(&self.store, &received)?;
                *self.last_report.lock() = Some(report);
            }
        }

        let batch = self.codec.encode_for_transport(&self.store.active_snapshot())?;
        Ok(batch.units)
    }
}

impl std::fmt::Debug for SyncPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPeer")
            .field("store", &self.store)
            .field("codec", &self.codec)
            .field("pending_sessions", &self.inbound.pending_sessions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_core::{List, ListSnapshot, Snapshot, Timestamp};

    #[test]
    fn merges_and_replies_with_own_snapshot() {
        let store = Arc::new(EntityStore::open_in_memory().unwrap());
        let mine = store.create_list("Mine").unwrap();
        let peer = SyncPeer::with_defaults(store.clone());

        let theirs = List::new("Theirs", 1, Timestamp::from_millis(5));
        let incoming = Snapshot::new(vec![
            ListSnapshot::new(store.list(&mine.id).unwrap(), Vec::new()),
            ListSnapshot::new(theirs.clone(), Vec::new()),
        ]);
        let units = SnapshotCodec::default().encode_for_transport(&incoming).unwrap().units;

        let reply = peer.respond(&units).unwrap();
        assert_eq!(reply.len(), 1);
        let decoded = SnapshotCodec::default().decode(&reply[0]).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(peer.last_report().unwrap().lists_inserted, 1);
        assert!(store.list(&theirs.id).is_some());
    }

    #[test]
    fn empty_snapshot_keeps_responder_state() {
        let store = Arc::new(EntityStore::open_in_memory().unwrap());
        store.create_list("A").unwrap();
        store.create_list("B").unwrap();
        let peer = SyncPeer::with_defaults(store.clone());

        let units = SnapshotCodec::default().encode_for_transport(&Snapshot::empty()).unwrap().units;
        peer.respond(&units).unwrap();

        assert_eq!(store.list_count(), 2);
        assert!(peer.last_report().unwrap().guarded);
    }

    #[test]
    fn incomplete_chunks_get_an_empty_reply() {
        let store = Arc::new(EntityStore::open_in_memory().unwrap());
        let codec = SnapshotCodec::new(600);
        let peer = SyncPeer::new(store.clone(), codec, ConflictPolicy::default(), Duration::from_secs(30));

        let lists = (0..5)
            .map(|n| ListSnapshot::new(List::new("x".repeat(250), n, Timestamp::from_millis(1)), Vec::new()))
            .collect();
        let batch = codec.encode_for_transport(&Snapshot::new(lists)).unwrap();
        assert!(batch.len() > 1);

        assert!(peer.respond(&batch.units[..1]).unwrap().is_empty());
        assert_eq!(store.list_count(), 0);

        let reply = peer.respond(&batch.units[1..]).unwrap();
        assert!(!reply.is_empty());
        assert_eq!(store.list_count(), 5);
    }
}

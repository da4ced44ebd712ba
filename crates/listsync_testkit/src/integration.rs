//! A primary and a companion replica wired through the real engine.
//!
//! The primary drives sync cycles with a [`SyncEngine`]; the companion
//! answers through a [`SyncPeer`] behind a [`LoopbackRemote`]. Both sides
//! use the same codec ceiling, so chunking is exercised end to end.

use crate::fixtures::TestReplica;
use listsync_core::EntityStore;
use listsync_engine::{
    LoopbackRemote, RemoteStatus, SyncConfig, SyncEngine, SyncOutcome, SyncPeer, SyncResult,
};
use listsync_protocol::{ConflictPolicy, SnapshotCodec, DEFAULT_CHUNK_TIMEOUT};
use std::sync::Arc;

/// Two replicas and the engine that syncs them.
pub struct ReplicaPair {
    /// The replica that initiates syncs.
    pub primary: TestReplica,
    /// The replica that answers.
    pub companion: TestReplica,
    /// The primary's engine.
    pub engine: SyncEngine,
    /// The companion's responder.
    pub peer: Arc<SyncPeer>,
    /// The transport between them.
    pub remote: Arc<LoopbackRemote>,
}

impl ReplicaPair {
    /// Creates two empty in-memory replicas with the given transport ceiling.
    pub fn new(ceiling: usize) -> Self {
        Self::with_config(SyncConfig::default().with_size_ceiling(ceiling))
    }

    /// Creates two empty in-memory replicas with a custom engine config.
    pub fn with_config(config: SyncConfig) -> Self {
        let primary = TestReplica::memory();
        let companion = TestReplica::memory();
        let peer = Arc::new(SyncPeer::new(
            companion.store.clone(),
            SnapshotCodec::new(config.size_ceiling),
            ConflictPolicy::LastWriteWins,
            DEFAULT_CHUNK_TIMEOUT,
        ));
        let remote = Arc::new(LoopbackRemote::new(peer.clone()));
        let engine = SyncEngine::new(config, primary.store.clone(), remote.clone())
            .expect("Failed to create engine");
        Self {
            primary,
            companion,
            engine,
            peer,
            remote,
        }
    }

    /// Returns the primary's store.
    pub fn primary(&self) -> &EntityStore {
        &self.primary.store
    }

    /// Returns the companion's store.
    pub fn companion(&self) -> &EntityStore {
        &self.companion.store
    }

    /// Runs one forced sync cycle.
    pub async fn sync(&self) -> SyncResult<SyncOutcome> {
        self.engine.force_sync().await
    }

    /// Sets what the companion reports to status checks.
    pub fn set_companion_status(&self, status: RemoteStatus) {
        self.remote.set_status(status);
    }

    /// Moves both clocks forward.
    pub fn advance(&self, millis: i64) {
        self.primary.advance(millis);
        self.companion.advance(millis);
    }

    /// Returns true if both replicas hold the same active lists and items.
    pub fn is_converged(&self) -> bool {
        self.primary().active_snapshot() == self.companion().active_snapshot()
    }

    /// Asserts both replicas hold the same active lists and items.
    ///
    /// # Panics
    ///
    /// Panics with both snapshots if they differ.
    pub fn assert_converged(&self) {
        assert_eq!(
            self.primary().active_snapshot(),
            self.companion().active_snapshot(),
            "replicas diverged"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_protocol::SIZE_CEILING;

    #[tokio::test]
    async fn lists_reach_the_companion() {
        let pair = ReplicaPair::new(SIZE_CEILING);
        let list = pair.primary().create_list("Groceries").unwrap();
        pair.primary().create_item(list.id, "Milk").unwrap();

        pair.sync().await.unwrap();
        pair.assert_converged();
        assert_eq!(pair.companion().item_count(), 1);
    }

    #[tokio::test]
    async fn unavailable_companion_is_left_alone() {
        let pair = ReplicaPair::new(SIZE_CEILING);
        pair.primary().create_list("Groceries").unwrap();
        pair.set_companion_status(RemoteStatus::NoAccount);

        assert!(pair.sync().await.is_err());
        assert_eq!(pair.companion().list_count(), 0);
        assert!(!pair.is_converged());
    }
}

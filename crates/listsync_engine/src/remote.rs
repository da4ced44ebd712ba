//! The remote replica collaborator.

use crate::connectivity::RemoteStatus;
use crate::error::{SyncError, SyncResult};
use crate::peer::SyncPeer;
use async_trait::async_trait;
use listsync_core::Snapshot;
use listsync_protocol::SnapshotCodec;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The replica on the other side of a sync.
///
/// Both calls cross into another replica and may suspend. The engine bounds
/// each with a timeout.
#[async_trait]
pub trait RemoteReplica: Send + Sync {
    /// Reports whether the remote account can be used.
    async fn check_status(&self) -> SyncResult<RemoteStatus>;

    /// Sends the encoded local snapshot and returns the remote's, each as a
    /// sequence of transmitted units.
    async fn exchange(&self, units: Vec<Vec<u8>>) -> SyncResult<Vec<Vec<u8>>>;
}

/// A scripted remote for tests.
///
/// Reports [`RemoteStatus::Available`] and answers every exchange with an
/// empty snapshot until told otherwise.
pub struct MockRemote {
    status: Mutex<RemoteStatus>,
    status_error: Mutex<Option<SyncError>>,
    status_delay: Mutex<Option<Duration>>,
    response: Mutex<Vec<Vec<u8>>>,
    exchange_error: Mutex<Option<SyncError>>,
    exchange_delay: Mutex<Option<Duration>>,
    exchanges: AtomicUsize,
    received: Mutex<Vec<Vec<Vec<u8>>>>,
}

impl MockRemote {
    /// Creates a mock remote.
    pub fn new() -> Self {
        Self {
            status: Mutex::new(RemoteStatus::Available),
            status_error: Mutex::new(None),
            status_delay: Mutex::new(None),
            response: Mutex::new(vec![b"{\"lists\":[]}".to_vec()]),
            exchange_error: Mutex::new(None),
            exchange_delay: Mutex::new(None),
            exchanges: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Sets the reported status.
    pub fn set_status(&self, status: RemoteStatus) {
        *self.status.lock() = status;
    }

    /// Makes the next status check fail.
    pub fn fail_next_status(&self, error: SyncError) {
        *self.status_error.lock() = Some(error);
    }

    /// Delays every status check.
    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock() = Some(delay);
    }

    /// Sets the units every exchange answers with.
    pub fn set_response_units(&self, units: Vec<Vec<u8>>) {
        *self.response.lock() = units;
    }

    /// Answers every exchange with `snapshot`, chunked with the default codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded.
    pub fn set_response_snapshot(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let batch = SnapshotCodec::default().encode_for_transport(snapshot)?;
        self.set_response_units(batch.units);
        Ok(())
    }

    /// Makes the next exchange fail.
    pub fn fail_next_exchange(&self, error: SyncError) {
        *self.exchange_error.lock() = Some(error);
    }

    /// Delays every exchange.
    pub fn set_exchange_delay(&self, delay: Duration) {
        *self.exchange_delay.lock() = Some(delay);
    }

    /// Returns how many exchanges were started.
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Returns the units received by each exchange, oldest first.
    pub fn received(&self) -> Vec<Vec<Vec<u8>>> {
        self.received.lock().clone()
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteReplica for MockRemote {
    async fn check_status(&self) -> SyncResult<RemoteStatus> {
        let delay = *self.status_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.status_error.lock().take() {
            return Err(err);
        }
        Ok(*self.status.lock())
    }

    async fn exchange(&self, units: Vec<Vec<u8>>) -> SyncResult<Vec<Vec<u8>>> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.received.lock().push(units);

        let delay = *self.exchange_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.exchange_error.lock().take() {
            return Err(err);
        }
        Ok(self.response.lock().clone())
    }
}

/// Connects an engine to an in-process [`SyncPeer`].
///
/// Stands in for a companion device: every exchange is handled by the
/// peer's [`SyncPeer::respond`].
pub struct LoopbackRemote {
    peer: Arc<SyncPeer>,
    status: Mutex<RemoteStatus>,
}

impl LoopbackRemote {
    /// Creates a loopback remote for `peer`.
    pub fn new(peer: Arc<SyncPeer>) -> Self {
        Self {
            peer,
            status: Mutex::new(RemoteStatus::Available),
        }
    }

    /// Sets the reported status.
    pub fn set_status(&self, status: RemoteStatus) {
        *self.status.lock() = status;
    }

    /// Returns the peer.
    pub fn peer(&self) -> &Arc<SyncPeer> {
        &self.peer
    }
}

#[async_trait]
impl RemoteReplica for LoopbackRemote {
    async fn check_status(&self) -> SyncResult<RemoteStatus> {
        Ok(*self.status.lock())
    }

    async fn exchange(&self, units: Vec<Vec<u8>>) -> SyncResult<Vec<Vec<u8>>> {
        self.peer.respond(&units)
    }
}

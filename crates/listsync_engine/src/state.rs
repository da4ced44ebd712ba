//! Sync orchestrator.

use crate::config::SyncConfig;
use crate::connectivity::{AccountStatus, ConnectivityMonitor};
use crate::error::{SyncError, SyncResult};
use crate::inbound::{Inbound, Received};
use crate::merge::{MergeEngine, MergeReport};
use crate::queue::{DrainReport, OfflineQueue};
use crate::remote::RemoteReplica;
use listsync_core::{CoreError, EntityStore, Timestamp};
use listsync_protocol::{ConflictPolicy, QueuedOperation, SkippedList, SnapshotCodec};
use listsync_storage::{Collection, RecordKey, WriteBatch};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

const LAST_SYNC_KEY: &str = "lastSuccessfulSync";

/// Progress checkpoints of one cycle.
const STATUS_CHECKED: f64 = 0.1;
const QUEUE_DRAINED: f64 = 0.25;
const SNAPSHOT_ENCODED: f64 = 0.4;
const EXCHANGED: f64 = 0.7;
const MERGED: f64 = 0.95;

/// Statistics about sync operations.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Cycles that completed.
    pub cycles_completed: u64,
    /// Cycles that failed.
    pub cycles_failed: u64,
    /// Retries performed by [`SyncEngine::sync_with_retry`].
    pub retries: u64,
    /// Lists sent across all cycles.
    pub lists_sent: u64,
    /// Lists received across all cycles.
    pub lists_received: u64,
    /// Conflicts resolved by merges.
    pub conflicts_resolved: u64,
    /// Items dropped for integrity violations.
    pub integrity_violations: u64,
    /// Lists left out for exceeding the transport ceiling.
    pub oversized_lists: u64,
    /// Queued operations replayed.
    pub operations_replayed: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// What one completed sync cycle did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Offline operations replayed before sending.
    pub drained: DrainReport,
    /// Lists sent.
    pub lists_sent: usize,
    /// Units sent.
    pub units_sent: usize,
    /// Bytes sent.
    pub bytes_sent: usize,
    /// Lists too large to send.
    pub skipped: Vec<SkippedList>,
    /// The ceiling the skipped lists exceeded.
    pub size_ceiling: usize,
    /// Units received.
    pub units_received: usize,
    /// The merge of the received snapshot, if one arrived.
    pub merge: Option<MergeReport>,
    /// When the cycle finished.
    pub finished_at: Timestamp,
    /// How long the cycle took.
    pub duration_ms: u64,
}

impl SyncReport {
    /// Returns the per-list and per-item failures the cycle tolerated.
    pub fn warnings(&self) -> Vec<SyncError> {
        let mut warnings: Vec<SyncError> = self
            .skipped
            .iter()
            .map(|skipped| SyncError::SizeLimitExceeded {
                list_id: skipped.list_id,
                size: skipped.size,
                ceiling: self.size_ceiling,
            })
            .collect();
        if let Some(merge) = &self.merge {
            warnings.extend(merge.violations.iter().map(|violation| violation.to_error()));
        }
        warnings
    }
}

/// The result of a sync call that did not fail.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// A full cycle ran.
    Completed(SyncReport),
    /// Another sync was in flight. Nothing was done.
    AlreadySyncing,
    /// The last successful sync is within the freshness window.
    UpToDate,
}

impl SyncOutcome {
    /// Returns the report of a completed cycle.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// How a local operation was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOutcome {
    /// Written to the entity store.
    Applied,
    /// Buffered in the offline queue.
    Queued {
        /// The queued operation's id.
        op_id: u64,
    },
}

/// Marks a sync as in flight for as long as it lives.
///
/// Dropping it before [`InFlight::finish`] resets progress to zero, so an
/// error, a cancellation or a dropped future never leaves progress mid-way.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    progress: &'a watch::Sender<f64>,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, progress: &'a watch::Sender<f64>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        progress.send_replace(0.0);
        Some(Self {
            flag,
            progress,
            finished: false,
        })
    }

    fn finish(mut self) {
        self.progress.send_replace(1.0);
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.progress.send_replace(0.0);
        }
        self.flag.store(false, Ordering::Release);
    }
}

/// Coordinates syncs between the local entity store and a remote replica.
///
/// Every collaborator is passed in, so independent engines can run side by
/// side in one process.
pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<EntityStore>,
    remote: Arc<dyn RemoteReplica>,
    monitor: ConnectivityMonitor,
    queue: OfflineQueue,
    merge: MergeEngine,
    codec: SnapshotCodec,
    inbound: Inbound,
    in_flight: AtomicBool,
    cancelled: AtomicBool,
    progress: watch::Sender<f64>,
    last_successful_sync: RwLock<Option<Timestamp>>,
    stats: RwLock<SyncStats>,
}

impl SyncEngine {
    /// Creates an engine syncing `store` with `remote`.
    ///
    /// The offline queue and the last successful sync time are loaded from
    /// the store's record store.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted queue or sync time cannot be read.
    pub fn new(
        config: SyncConfig,
        store: Arc<EntityStore>,
        remote: Arc<dyn RemoteReplica>,
    ) -> SyncResult<Self> {
        let records = store.record_store().clone();
        let queue = OfflineQueue::open(records.clone(), store.clock().clone(), ConflictPolicy::default())?;

        let last_successful_sync = match records
            .get(&RecordKey::new(Collection::Meta, LAST_SYNC_KEY))
            .map_err(CoreError::from)?
        {
            Some(record) => Some(serde_json::from_slice(&record.payload).map_err(CoreError::from)?),
            None => None,
        };

        let codec = SnapshotCodec::new(config.size_ceiling);
        let (progress, _) = watch::channel(0.0);
        Ok(Self {
            monitor: ConnectivityMonitor::new(remote.clone(), config.status_timeout),
            merge: MergeEngine::default(),
            inbound: Inbound::new(codec, config.chunk_timeout),
            codec,
            queue,
            remote,
            store,
            config,
            in_flight: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            progress,
            last_successful_sync: RwLock::new(last_successful_sync),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the entity store.
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Returns the offline queue.
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Returns the last recorded remote status.
    pub fn status(&self) -> AccountStatus {
        self.monitor.status()
    }

    /// Checks the remote status now.
    pub async fn check_status(&self) -> AccountStatus {
        self.monitor.check().await
    }

    /// Subscribes to remote status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<AccountStatus> {
        self.monitor.subscribe()
    }

    /// Returns the progress of the current or last sync, in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    /// Subscribes to progress changes.
    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    /// Returns true while a sync is in flight.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns when the last sync completed.
    pub fn last_successful_sync(&self) -> Option<Timestamp> {
        *self.last_successful_sync.read()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Aborts the in-flight sync at its next checkpoint.
    ///
    /// Once the received snapshot has been merged the cycle runs to
    /// completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn checkpoint(&self, progress: f64) -> SyncResult<()> {
        self.check_cancelled()?;
        self.advance(progress);
        Ok(())
    }

    fn advance(&self, progress: f64) {
        self.progress.send_if_modified(|current| {
            if progress > *current {
                *current = progress;
                true
            } else {
                false
            }
        });
    }

    /// Applies a local operation, or queues it while the remote is not
    /// available.
    ///
    /// Operations are also queued while earlier ones are still waiting, so
    /// replay keeps submission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the operation or the queue
    /// cannot persist it.
    pub fn apply_local(&self, operation: QueuedOperation) -> SyncResult<LocalOutcome> {
        if !self.status().is_available() || !self.queue.is_empty() {
            let op_id = self.queue.enqueue(operation)?;
            return Ok(LocalOutcome::Queued { op_id });
        }

        match operation {
            QueuedOperation::UpsertList { list } => {
                self.store.upsert_list(list)?;
            }
            QueuedOperation::UpsertItem { item } => {
                self.store.upsert_item(item)?;
            }
            QueuedOperation::DeleteList { id } => {
                self.store.delete_list(&id)?;
            }
            QueuedOperation::DeleteItem { id } => {
                self.store.delete_item(&id)?;
            }
        }
        Ok(LocalOutcome::Applied)
    }

    /// Runs a sync unless one is in flight or the last one is still fresh.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the cycle. Local state is untouched
    /// unless the merge had already been committed.
    pub async fn sync(&self) -> SyncResult<SyncOutcome> {
        if self.is_fresh() {
            tracing::debug!("last sync is fresh; skipping");
            return Ok(SyncOutcome::UpToDate);
        }
        self.run().await
    }

    /// Runs a sync regardless of freshness. Still a no-op while another sync
    /// is in flight.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the cycle.
    pub async fn force_sync(&self) -> SyncResult<SyncOutcome> {
        self.run().await
    }

    /// Runs [`SyncEngine::force_sync`], retrying retryable failures with
    /// exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, the first
    /// non-retryable error, or [`SyncError::Cancelled`].
    pub async fn sync_with_retry(&self) -> SyncResult<SyncOutcome> {
        let retry = self.config.retry.clone();
        let attempts = retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying sync");
                tokio::time::sleep(delay).await;
                self.stats.write().retries += 1;
            }
            self.check_cancelled()?;

            match self.force_sync().await {
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    tracing::info!(error = %err, attempt, "sync attempt failed");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn is_fresh(&self) -> bool {
        let (Some(interval), Some(last)) = (self.config.min_sync_interval, self.last_successful_sync())
        else {
            return false;
        };
        let elapsed = self.store.clock().now().as_millis() - last.as_millis();
        elapsed >= 0 && (elapsed as u128) < interval.as_millis()
    }

    async fn run(&self) -> SyncResult<SyncOutcome> {
        let Some(guard) = InFlight::acquire(&self.in_flight, &self.progress) else {
            tracing::debug!("sync already in flight");
            return Ok(SyncOutcome::AlreadySyncing);
        };
        self.cancelled.store(false, Ordering::SeqCst);

        match self.cycle().await {
            Ok(report) => {
                guard.finish();
                self.record_success(&report);
                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => {
                drop(guard);
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    async fn cycle(&self) -> SyncResult<SyncReport> {
        let started = tokio::time::Instant::now();

        let status = self.monitor.check().await;
        if !status.is_available() {
            return Err(SyncError::AccountUnavailable(status));
        }
        self.checkpoint(STATUS_CHECKED)?;

        let drained = self.queue.drain(&self.store)?;
        self.checkpoint(QUEUE_DRAINED)?;

        let snapshot = self.store.active_snapshot();
        let batch = self.codec.encode_for_transport(&snapshot)?;
        let lists_sent = snapshot.len() - batch.skipped.len();
        let units_sent = batch.len();
        let bytes_sent = batch.total_bytes();
        self.checkpoint(SNAPSHOT_ENCODED)?;

        tracing::debug!(lists = lists_sent, units = units_sent, bytes = bytes_sent, "exchanging snapshot");
        let exchange = self.remote.exchange(batch.units);
        let reply = match tokio::time::timeout(self.config.exchange_timeout, exchange).await {
            Ok(reply) => reply?,
            Err(_) => {
                self.monitor.record(AccountStatus::TemporarilyUnavailable);
                return Err(SyncError::Timeout {
                    operation: "exchange",
                });
            }
        };
        self.checkpoint(EXCHANGED)?;

        let merge = match self.inbound.receive(&reply, std::time::Instant::now())? {
            Received::Nothing => None,
            Received::Pending { session_id } => {
                self.inbound.discard(session_id);
                return Err(SyncError::PartialChunkTimeout { session_id });
            }
            Received::Complete(received) => Some(self.merge.reconcile(&self.store, &received)?),
        };
        self.advance(MERGED);

        let finished_at = self.store.clock().now();
        self.persist_last_sync(finished_at);

        Ok(SyncReport {
            drained,
            lists_sent,
            units_sent,
            bytes_sent,
            skipped: batch.skipped,
            size_ceiling: self.codec.ceiling(),
            units_received: reply.len(),
            merge,
            finished_at,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn persist_last_sync(&self, at: Timestamp) {
        *self.last_successful_sync.write() = Some(at);

        let mut batch = WriteBatch::new();
        match serde_json::to_vec(&at) {
            Ok(payload) => batch.put(RecordKey::new(Collection::Meta, LAST_SYNC_KEY), payload),
            Err(err) => {
                tracing::warn!(error = %err, "could not encode last sync time");
                return;
            }
        }
        if let Err(err) = self.store.record_store().save(batch) {
            tracing::warn!(error = %err, "could not persist last sync time");
        }
    }

    fn record_success(&self, report: &SyncReport) {
        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        stats.lists_sent += report.lists_sent as u64;
        stats.oversized_lists += report.skipped.len() as u64;
        stats.operations_replayed += report.drained.replayed as u64;
        if let Some(merge) = &report.merge {
            stats.conflicts_resolved += merge.conflicts.len() as u64;
            stats.integrity_violations += merge.violations.len() as u64;
            stats.lists_received += (merge.lists_inserted + merge.lists_updated) as u64;
        }
        stats.last_error = None;

        tracing::info!(
            lists_sent = report.lists_sent,
            units_sent = report.units_sent,
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "sync completed"
        );
    }

    fn record_failure(&self, err: &SyncError) {
        {
            let mut stats = self.stats.write();
            stats.cycles_failed += 1;
            stats.last_error = Some(err.to_string());
        }
        match err {
            SyncError::AccountUnavailable(status) => {
                tracing::info!(%status, "sync skipped: remote account unavailable");
            }
            SyncError::Cancelled => tracing::info!("sync cancelled"),
            err if err.is_retryable() => tracing::warn!(error = %err, "sync failed"),
            err => tracing::error!(error = %err, "sync failed"),
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("status", &self.status())
            .field("syncing", &self.is_syncing())
            .field("progress", &self.progress())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use listsync_core::{Clock, ManualClock, StoreConfig};
    use listsync_storage::InMemoryRecordStore;
    use std::time::Duration;

    fn engine(remote: Arc<MockRemote>, config: SyncConfig) -> (SyncEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let store = EntityStore::open(
            Arc::new(InMemoryRecordStore::new()),
            clock.clone(),
            StoreConfig::default(),
        )
        .unwrap();
        let engine = SyncEngine::new(config, Arc::new(store), remote).unwrap();
        (engine, clock)
    }

    #[tokio::test]
    async fn completed_sync_pins_progress() {
        let remote = Arc::new(MockRemote::new());
        let (engine, _) = engine(remote.clone(), SyncConfig::default());
        engine.store().create_list("A").unwrap();

        let outcome = engine.sync().await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.lists_sent, 1);
        assert!(report.merge.as_ref().unwrap().guarded);
        assert_eq!(engine.progress(), 1.0);
        assert!(!engine.is_syncing());
        assert!(engine.last_successful_sync().is_some());
        assert_eq!(engine.status(), AccountStatus::Available);
        assert_eq!(remote.exchange_count(), 1);
    }

    #[tokio::test]
    async fn failed_sync_resets_progress() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_next_exchange(SyncError::transport_fatal("refused"));
        let (engine, _) = engine(remote, SyncConfig::default());

        let err = engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert_eq!(engine.progress(), 0.0);
        assert_eq!(engine.stats().cycles_failed, 1);
        assert!(engine.last_successful_sync().is_none());
    }

    #[tokio::test]
    async fn progress_never_decreases_during_a_sync() {
        let remote = Arc::new(MockRemote::new());
        remote.set_exchange_delay(Duration::from_millis(5));
        let (engine, _) = engine(remote, SyncConfig::default());
        let mut progress = engine.subscribe_progress();

        let watcher = async {
            let mut seen = vec![*progress.borrow_and_update()];
            while progress.changed().await.is_ok() {
                let value = *progress.borrow_and_update();
                seen.push(value);
                if value >= 1.0 {
                    break;
                }
            }
            seen
        };
        let (seen, outcome) = tokio::join!(watcher, engine.sync());
        outcome.unwrap();

        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
        assert_eq!(seen.last(), Some(&1.0));
    }

    #[tokio::test]
    async fn freshness_window_skips_unless_forced() {
        let remote = Arc::new(MockRemote::new());
        let config = SyncConfig::default().with_min_sync_interval(Duration::from_secs(60));
        let (engine, clock) = engine(remote.clone(), config);

        engine.sync().await.unwrap();
        assert!(matches!(engine.sync().await.unwrap(), SyncOutcome::UpToDate));
        assert!(matches!(engine.force_sync().await.unwrap(), SyncOutcome::Completed(_)));
        assert_eq!(remote.exchange_count(), 2);

        clock.advance(61_000);
        assert!(matches!(engine.sync().await.unwrap(), SyncOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn local_operations_queue_until_available() {
        let remote = Arc::new(MockRemote::new());
        let (engine, clock) = engine(remote.clone(), SyncConfig::default());
        let list = listsync_core::List::new("Offline", 0, clock.now());

        // Status is unknown until checked.
        let outcome = engine
            .apply_local(QueuedOperation::UpsertList { list: list.clone() })
            .unwrap();
        assert_eq!(outcome, LocalOutcome::Queued { op_id: 1 });
        assert!(engine.store().list(&list.id).is_none());

        let report = engine.sync().await.unwrap();
        assert_eq!(report.report().unwrap().drained.replayed, 1);
        assert!(engine.store().list(&list.id).is_some());

        let other = listsync_core::List::new("Online", 1, clock.now());
        let outcome = engine
            .apply_local(QueuedOperation::UpsertList { list: other.clone() })
            .unwrap();
        assert_eq!(outcome, LocalOutcome::Applied);
        assert!(engine.store().list(&other.id).is_some());
    }

    #[tokio::test]
    async fn local_item_in_missing_list_is_an_integrity_violation() {
        let remote = Arc::new(MockRemote::new());
        let (engine, clock) = engine(remote, SyncConfig::default());
        assert_eq!(engine.check_status().await, AccountStatus::Available);

        let missing = listsync_core::ListId::new();
        let item = listsync_core::Item::new(missing, "Milk", 0, clock.now());
        let err = engine
            .apply_local(QueuedOperation::UpsertItem { item: item.clone() })
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::IntegrityViolation { item_id, list_id, .. } if item_id == item.id && list_id == missing
        ));
        assert!(engine.store().item(&item.id).is_none());
    }

    #[tokio::test]
    async fn last_sync_time_survives_restart() {
        let records = Arc::new(InMemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(42_000)));
        let open = || {
            let store = EntityStore::open(records.clone(), clock.clone(), StoreConfig::default()).unwrap();
            SyncEngine::new(SyncConfig::default(), Arc::new(store), Arc::new(MockRemote::new())).unwrap()
        };

        open().sync().await.unwrap();
        assert_eq!(open().last_successful_sync(), Some(Timestamp::from_millis(42_000)));
    }

    #[test]
    fn report_warnings_cover_skips_and_violations() {
        let report = SyncReport {
            drained: DrainReport::default(),
            lists_sent: 0,
            units_sent: 1,
            bytes_sent: 10,
            skipped: vec![SkippedList {
                list_id: listsync_core::ListId::new(),
                size: 300_000,
            }],
            size_ceiling: 262_144,
            units_received: 0,
            merge: None,
            finished_at: Timestamp::EPOCH,
            duration_ms: 0,
        };
        let warnings = report.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            SyncError::SizeLimitExceeded { size: 300_000, ceiling: 262_144, .. }
        ));
    }
}

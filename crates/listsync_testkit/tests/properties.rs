//! Cross-crate properties of merging, chunking, queueing and persistence.

use listsync_core::Snapshot;
use listsync_engine::{Inbound, MergeEngine, OfflineQueue, Received};
use listsync_protocol::{ConflictPolicy, ReceivedSnapshot, SnapshotCodec, DEFAULT_CHUNK_TIMEOUT};
use listsync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Instant;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn base_and_diverged(spread: i64) -> impl Strategy<Value = (Snapshot, Snapshot)> {
    snapshot_strategy(5, 4, spread)
        .prop_flat_map(move |base| (Just(base.clone()), diverged_strategy(base, spread)))
}

fn assert_dense(snapshot: &Snapshot) -> Result<(), TestCaseError> {
    let lists: Vec<u32> = snapshot.lists.iter().map(|entry| entry.list.order_number).collect();
    prop_assert_eq!(lists, (0..snapshot.len() as u32).collect::<Vec<_>>());
    for entry in &snapshot.lists {
        let items: Vec<u32> = entry.items.iter().map(|item| item.order_number).collect();
        prop_assert_eq!(items, (0..entry.items.len() as u32).collect::<Vec<_>>());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merged_positions_are_dense(
        local in snapshot_strategy(5, 4, 1_000),
        remote in snapshot_strategy(5, 4, 1_000),
    ) {
        prop_assume!(!remote.is_empty());
        let replica = TestReplica::memory();
        replica.load(&local);

        MergeEngine::default()
            .reconcile(&replica, &ReceivedSnapshot::whole(remote))
            .unwrap();
        assert_dense(&replica.active_snapshot())?;
    }

    #[test]
    fn merging_twice_changes_nothing_the_second_time(
        local in snapshot_strategy(5, 4, 1_000),
        remote in snapshot_strategy(5, 4, 1_000),
    ) {
        let replica = TestReplica::memory();
        replica.load(&local);
        let merge = MergeEngine::default();
        let received = ReceivedSnapshot::whole(remote);

        merge.reconcile(&replica, &received).unwrap();
        let after_first = replica.snapshot();
        let second = merge.reconcile(&replica, &received).unwrap();

        prop_assert!(second.is_noop());
        prop_assert_eq!(replica.snapshot(), after_first);
    }

    #[test]
    fn empty_snapshot_never_removes_anything(local in snapshot_strategy(5, 4, 1_000)) {
        let replica = TestReplica::memory();
        replica.load(&local);
        let before = replica.snapshot();

        let report = MergeEngine::default()
            .reconcile(&replica, &ReceivedSnapshot::whole(Snapshot::empty()))
            .unwrap();

        prop_assert!(report.guarded);
        prop_assert_eq!(replica.snapshot(), before);
    }

    #[test]
    fn merge_result_does_not_depend_on_direction((base, diverged) in base_and_diverged(50)) {
        let a = TestReplica::memory();
        let b = TestReplica::memory();
        a.load(&base);
        b.load(&diverged);
        let merge = MergeEngine::new(ConflictPolicy::LastWriteWins);

        merge.reconcile(&a, &ReceivedSnapshot::whole(diverged.clone())).unwrap();
        merge.reconcile(&b, &ReceivedSnapshot::whole(base.clone())).unwrap();

        prop_assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn chunks_fit_and_reassemble(snapshot in snapshot_strategy(12, 8, 1_000), ceiling in 1_536usize..6_144) {
        let codec = SnapshotCodec::new(ceiling);
        let batch = codec.encode_for_transport(&snapshot).unwrap();
        prop_assert!(batch.units.iter().all(|unit| unit.len() <= ceiling));

        let inbound = Inbound::new(codec, DEFAULT_CHUNK_TIMEOUT);
        let received = match inbound.receive(&batch.units, Instant::now()).unwrap() {
            Received::Complete(received) => received,
            other => return Err(TestCaseError::fail(format!("expected a complete snapshot, got {other:?}"))),
        };

        let skipped: HashSet<_> = batch.skipped.iter().map(|s| s.list_id).collect();
        let expected: Vec<_> = snapshot
            .lists
            .iter()
            .filter(|entry| !skipped.contains(&entry.list.id))
            .cloned()
            .collect();
        prop_assert_eq!(received.snapshot.lists, expected);
        let omitted: HashSet<_> = received.omitted_list_ids.into_iter().collect();
        prop_assert_eq!(omitted, skipped);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn replicas_converge_after_one_sync((base, diverged) in base_and_diverged(50)) {
        let pair = ReplicaPair::new(8_192);
        pair.primary.load(&base);
        pair.companion.load(&diverged);

        runtime().block_on(pair.sync()).unwrap();
        prop_assert!(pair.is_converged());
        assert_dense(&pair.primary().active_snapshot())?;

        let revision = pair.primary().revision();
        runtime().block_on(pair.sync()).unwrap();
        prop_assert_eq!(pair.primary().revision(), revision);
    }

    #[test]
    fn drained_queue_leaves_no_orphans(
        (base, operations) in snapshot_strategy(4, 3, 1_000).prop_flat_map(|base| {
            let lists = base.lists.clone();
            (Just(base), prop::collection::vec(queued_operation_strategy(lists, 1_000), 0..12))
        })
    ) {
        let replica = TestReplica::memory();
        replica.load(&base);
        let queue = OfflineQueue::open(
            replica.records.clone(),
            replica.clock.clone(),
            ConflictPolicy::LastWriteWins,
        )
        .unwrap();
        for operation in operations.iter().cloned() {
            queue.enqueue(operation).unwrap();
        }

        let report = queue.drain(&replica).unwrap();
        prop_assert_eq!(report.total(), operations.len());
        prop_assert!(queue.is_empty());

        let snapshot = replica.snapshot();
        for entry in &snapshot.lists {
            for item in &entry.items {
                prop_assert_eq!(item.list_id, entry.list.id);
            }
        }
    }

    #[test]
    fn stored_snapshots_survive_reopen(snapshot in snapshot_strategy(4, 4, 1_000)) {
        let replica = TestReplica::file();
        replica.load(&snapshot);
        let before = replica.snapshot();

        let reopened = replica.reopen();
        prop_assert_eq!(reopened.snapshot(), before);
    }
}


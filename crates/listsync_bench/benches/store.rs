//! Entity store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use listsync_core::{EntityStore, Item, StoreConfig, SystemClock};
use listsync_storage::{FileRecordStore, RecordStore};
use std::sync::Arc;
use tempfile::TempDir;

/// Benchmark inserting items in a single batch.
fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let store = EntityStore::open_in_memory().unwrap();
            let list = store.create_list("Bench").unwrap();

            b.iter(|| {
                store
                    .batch(|txn| {
                        for n in 0..count {
                            let item = Item::new(list.id, "item", n as u32, txn.now());
                            txn.upsert_item(item)?;
                        }
                        Ok(())
                    })
                    .unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark single edits against a durable store.
fn bench_file_edit(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_edit");
    group.sample_size(20);

    group.bench_function("cross_out", |b| {
        let temp_dir = TempDir::new().unwrap();
        let records: Arc<dyn RecordStore> =
            Arc::new(FileRecordStore::open(temp_dir.path(), "bench").unwrap());
        let store = EntityStore::open(records, Arc::new(SystemClock), StoreConfig::default()).unwrap();
        let list = store.create_list("Bench").unwrap();
        let item = store.create_item(list.id, "Milk").unwrap();
        let mut crossed = false;

        b.iter(|| {
            crossed = !crossed;
            let updated = store.set_crossed_out(black_box(&item.id), crossed).unwrap();
            black_box(updated);
        });
    });

    group.finish();
}

/// Benchmark taking the snapshot a sync sends.
fn bench_active_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("active_snapshot");
    let store = EntityStore::open_in_memory().unwrap();
    for l in 0..50 {
        let list = store.create_list(&format!("List {l}")).unwrap();
        store
            .batch(|txn| {
                for n in 0..50u32 {
                    txn.upsert_item(Item::new(list.id, "item", n, txn.now()))?;
                }
                Ok(())
            })
            .unwrap();
    }

    group.bench_function("50x50", |b| {
        b.iter(|| black_box(store.active_snapshot()));
    });

    group.finish();
}

criterion_group!(benches, bench_batch_insert, bench_file_edit, bench_active_snapshot);
criterion_main!(benches);

//! Unit-of-work completion benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entiwork_bench::{bench_factory, references, seed_items, text_payload};
use entiwork_core::EntityReference;
use entiwork_storage::{FileEntityStore, InMemoryEntityStore};
use std::sync::Arc;

/// Benchmark completing units of work that create `n` entities.
fn bench_complete_creates(c: &mut Criterion) {
    let mut group = c.benchmark_group("complete_creates");

    for count in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let factory = bench_factory(Arc::new(InMemoryEntityStore::new()));
            let payload = text_payload(256);

            b.iter(|| {
                let mut uow = factory.new_unit_of_work();
                for _ in 0..count {
                    let state = uow.new_entity("Item", None).unwrap();
                    state.set_property("payload", black_box(payload.clone())).unwrap();
                }
                uow.complete().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark read-modify-write of already stored entities.
fn bench_complete_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("complete_updates");

    for count in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let factory = bench_factory(Arc::new(InMemoryEntityStore::new()));
            let refs = seed_items(&factory, count);
            let mut counter = 0i64;

            b.iter(|| {
                counter += 1;
                let mut uow = factory.new_unit_of_work();
                for reference in &refs {
                    uow.get(reference)
                        .unwrap()
                        .set_property("counter", black_box(counter))
                        .unwrap();
                }
                uow.complete().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark completion with nothing changed: loads only, no store write.
fn bench_noop_complete(c: &mut Criterion) {
    let mut group = c.benchmark_group("noop_complete");

    group.bench_function("empty", |b| {
        let factory = bench_factory(Arc::new(InMemoryEntityStore::new()));
        b.iter(|| {
            let mut uow = factory.new_unit_of_work();
            uow.complete().unwrap();
        });
    });

    group.bench_function("read_10", |b| {
        let factory = bench_factory(Arc::new(InMemoryEntityStore::new()));
        let refs = seed_items(&factory, 10);
        b.iter(|| {
            let mut uow = factory.new_unit_of_work();
            for reference in &refs {
                black_box(uow.get(reference).unwrap());
            }
            uow.complete().unwrap();
        });
    });

    group.finish();
}

/// Benchmark durable completion against the file store.
fn bench_file_complete(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_complete");
    group.sample_size(20);

    group.bench_function("create_10", |b| {
        let dir = tempfile::tempdir().unwrap();
        let factory = bench_factory(Arc::new(FileEntityStore::open(dir.path()).unwrap()));
        let mut round = 0usize;

        b.iter(|| {
            round += 1;
            let mut uow = factory.new_unit_of_work();
            for reference in references(&format!("r{round}"), 10) {
                uow.new_entity("Item", Some(reference)).unwrap();
            }
            uow.complete().unwrap();
        });
    });

    group.finish();
}

/// Benchmark resolving a missing reference.
fn bench_missing_lookup(c: &mut Criterion) {
    let factory = bench_factory(Arc::new(InMemoryEntityStore::new()));
    let missing = EntityReference::new("missing");

    c.bench_function("missing_lookup", |b| {
        b.iter(|| {
            let mut uow = factory.new_unit_of_work();
            black_box(uow.get(&missing).is_err());
            uow.discard();
        });
    });
}

criterion_group!(
    benches,
    bench_complete_creates,
    bench_complete_updates,
    bench_noop_complete,
    bench_file_complete,
    bench_missing_lookup,
);
criterion_main!(benches);

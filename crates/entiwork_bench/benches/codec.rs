//! Record codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entiwork_bench::text_payload;
use entiwork_codec::{decode_record, EntityRecord};

fn sample_record(properties: usize) -> EntityRecord {
    let mut record = EntityRecord::new("bench-1", "Item").with_last_modified(1);
    for i in 0..properties {
        record = record.with_property(format!("p{i}"), text_payload(32));
    }
    record
}

/// Benchmark record encoding.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_encode");

    for count in [1usize, 16, 128].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let record = sample_record(count);
            b.iter(|| black_box(record.encode().unwrap()));
        });
    }
    group.finish();
}

/// Benchmark record decoding.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_decode");

    for count in [1usize, 16, 128].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let bytes = sample_record(count).encode().unwrap();
            b.iter(|| black_box(decode_record(black_box(&bytes)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);

//! Performance benchmarks for bucketfile
//!
//! Run with: cargo bench

use bucketfile::storage::{LocalStore, MemoryStore};
use bucketfile::BucketFiles;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Deterministic payload of the specified size
fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn memory_files() -> BucketFiles {
    let store = MemoryStore::new();
    store.create_bucket("bench");
    BucketFiles::new(store)
}

fn bench_memory_round_trip(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_round_trip");

    for size in [64 * 1024, 1024 * 1024, 16 * 1024 * 1024].iter() {
        let data = payload(*size);
        let files = memory_files();

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(
            BenchmarkId::new("upload_fetch", humansize::format_size(*size as u64, humansize::BINARY)),
            &data,
            |b, data| {
                b.iter(|| {
                    runtime.block_on(async {
                        let mut source = data.as_slice();
                        files.upload(&mut source, "bench", "obj").await.unwrap();
                        black_box(files.fetch("bench", "obj").await.unwrap())
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_local_upload(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let root = TempDir::new().unwrap();
    std::fs::create_dir(root.path().join("bench")).unwrap();
    let files = BucketFiles::new(LocalStore::new(root.path()));

    let size = 4 * 1024 * 1024;
    let data = payload(size);

    let mut group = c.benchmark_group("local_upload");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("4MiB", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut source = data.as_slice();
                black_box(files.upload(&mut source, "bench", "obj").await.unwrap())
            })
        });
    });
    group.finish();
}

fn bench_list_names(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let store = MemoryStore::new();
    for i in 0..10_000 {
        store.put("bench", &format!("objects/{:05}", i), "x");
    }
    store.set_page_size(1000);
    let files = BucketFiles::new(store);

    c.bench_function("list_10000_names", |b| {
        b.iter(|| runtime.block_on(async { black_box(files.list_names("bench").await.unwrap()) }));
    });
}

criterion_group!(benches, bench_memory_round_trip, bench_local_upload, bench_list_names);

criterion_main!(benches);

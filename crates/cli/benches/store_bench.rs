use std::io::Write;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use store::{MemDir, Store, StoreOptions, WriterOptions};
use tempfile::tempdir;

const VALUE_SIZE: usize = 4096;
const N_VERSIONS: usize = 100;

fn put(store: &Store, key: &str, value: &[u8]) {
    let mut w = store
        .writer_with(key, WriterOptions::new().no_sync())
        .unwrap();
    w.write_all(value).unwrap();
    w.commit().unwrap();
}

fn store_commit_benchmark(c: &mut Criterion) {
    let value = vec![b'x'; VALUE_SIZE];
    c.bench_function("store_commit_4k_fs_no_sync", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = Store::open_path(dir.path(), StoreOptions::new()).unwrap();
                (dir, store)
            },
            |(_dir, store)| {
                for _ in 0..10 {
                    put(&store, "bench", &value);
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn store_read_latest_benchmark(c: &mut Criterion) {
    let value = vec![b'x'; VALUE_SIZE];
    let store = Store::open(MemDir::new(), StoreOptions::new()).unwrap();
    for _ in 0..N_VERSIONS {
        put(&store, "bench", &value);
    }

    c.bench_function("store_read_latest_4k_mem_100_versions", |b| {
        b.iter(|| {
            let (bytes, _) = store.read_latest_bytes("bench").unwrap();
            assert_eq!(bytes.len(), VALUE_SIZE);
        });
    });
}

criterion_group!(benches, store_commit_benchmark, store_read_latest_benchmark);
criterion_main!(benches);

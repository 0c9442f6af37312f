use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use logkv::Store;
use tempfile::tempdir;

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_operations");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = tempdir().unwrap();
            let store = Store::open(dir.path()).unwrap();

            b.iter(|| {
                for i in 0..size {
                    let key = format!("key_{i}");
                    let value = format!("value_{i}");
                    store.put(&key, &value).unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    for i in 0..1000 {
        let key = format!("key_{i}");
        let value = format!("value_{i}");
        store.put(&key, &value).unwrap();
    }

    c.bench_function("get_existing_key", |b| {
        b.iter(|| {
            let result = store.get(black_box("key_500")).unwrap();
            black_box(result);
        });
    });
}

fn bench_compaction(c: &mut Criterion) {
    c.bench_function("compact_1000_keys", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = Store::open(dir.path()).unwrap();
                for round in 0..5 {
                    for i in 0..1000 {
                        let key = format!("key_{i}");
                        let value = format!("value_{i}_{round}");
                        store.put(&key, &value).unwrap();
                    }
                }
                (dir, store)
            },
            |(_dir, store)| {
                store.compact().unwrap();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_put, bench_get, bench_compaction);
criterion_main!(benches);

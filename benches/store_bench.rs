//! Benchmarks for the cache store.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use offline_cache_proxy::cache::memory::MemoryStore;
use offline_cache_proxy::cache::store::{CacheStore, GenerationCache};
use offline_cache_proxy::http::{RequestKey, StoredResponse};

fn populated_store(entries: usize) -> (tokio::runtime::Runtime, MemoryStore) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let store = MemoryStore::new();

    rt.block_on(async {
        let cache = store.open("bulletin-v2").await.unwrap();
        for i in 0..entries {
            cache
                .put(
                    RequestKey::get(format!("http://app/resource/{i}")),
                    StoredResponse::new(200, Vec::new(), Bytes::from_static(b"payload")),
                )
                .await
                .unwrap();
        }
    });

    (rt, store)
}

fn bench_match_any_hit(c: &mut Criterion) {
    let (rt, store) = populated_store(10_000);
    let key = RequestKey::get("http://app/resource/5000");

    c.bench_function("match_any_hit_10k_entries", |b| {
        b.iter(|| {
            rt.block_on(async {
                let found = store.match_any(black_box(&key)).await.unwrap();
                black_box(found);
            })
        })
    });
}

fn bench_match_any_miss(c: &mut Criterion) {
    let (rt, store) = populated_store(10_000);
    let key = RequestKey::get("http://app/not-there");

    c.bench_function("match_any_miss_10k_entries", |b| {
        b.iter(|| {
            rt.block_on(async {
                let found = store.match_any(black_box(&key)).await.unwrap();
                black_box(found);
            })
        })
    });
}

fn bench_put_overwrite(c: &mut Criterion) {
    let (rt, store) = populated_store(1_000);
    let key = RequestKey::get("http://app/resource/0");
    let response = StoredResponse::new(200, Vec::new(), Bytes::from(vec![0u8; 16 * 1024]));

    c.bench_function("put_overwrite_16kb", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cache = store.open("bulletin-v2").await.unwrap();
                cache
                    .put(black_box(key.clone()), black_box(response.clone()))
                    .await
                    .unwrap();
            })
        })
    });
}

criterion_group!(
    benches,
    bench_match_any_hit,
    bench_match_any_miss,
    bench_put_overwrite
);
criterion_main!(benches);

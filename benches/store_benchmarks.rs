// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault benchmarks: entity store hot paths and token signing.
//
// The interesting numbers are cached vs. uncached reads (the cache is the
// contract: hits must be orders of magnitude faster than a cold disk
// read) and the cost of one durable append (temp+fsync+rename).

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use opsvault_store::{AttrMap, AttrValue, EntityStore, EntityType};
use opsvault_stream::{sign_token, verify_token, TokenClaims};

fn attrs(n: u64) -> AttrMap {
    [
        ("name".to_string(), AttrValue::from("bench-entity")),
        ("counter".to_string(), AttrValue::from(n as i64)),
    ]
    .into()
}

fn bench_append(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = EntityStore::open(dir.path()).unwrap();
    store.create(EntityType::Training, "bench", attrs(0)).unwrap();

    let mut n = 0u64;
    c.bench_function("store_append_record", |b| {
        b.iter(|| {
            n += 1;
            store
                .append_record(EntityType::Training, "bench", attrs(n))
                .unwrap()
        })
    });
}

fn bench_read_cached(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = EntityStore::open(dir.path()).unwrap();
    store.create(EntityType::Training, "bench", attrs(0)).unwrap();
    for n in 1..50 {
        store
            .append_record(EntityType::Training, "bench", attrs(n))
            .unwrap();
    }

    // Warm the cache once; every iteration is a hit.
    store.read(EntityType::Training, "bench").unwrap();
    c.bench_function("store_read_cached", |b| {
        b.iter(|| store.read(EntityType::Training, "bench").unwrap())
    });
}

fn bench_read_uncached(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = EntityStore::open(dir.path()).unwrap();
    store.create(EntityType::Training, "bench", attrs(0)).unwrap();
    for n in 1..50 {
        store
            .append_record(EntityType::Training, "bench", attrs(n))
            .unwrap();
    }

    c.bench_function("store_read_uncached", |b| {
        b.iter(|| {
            store.invalidate_cache();
            store.read(EntityType::Training, "bench").unwrap()
        })
    });
}

fn bench_token_sign_verify(c: &mut Criterion) {
    let secret = b"benchmark-secret-of-32-bytes-min!";
    let claims = TokenClaims::new("alice", "sess-1", "clip.mp4", chrono_now());

    c.bench_function("token_sign", |b| b.iter(|| sign_token(secret, &claims)));

    let token = sign_token(secret, &claims);
    c.bench_function("token_verify", |b| {
        b.iter(|| verify_token(secret, &token, chrono_now()).unwrap())
    });
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

criterion_group!(
    benches,
    bench_append,
    bench_read_cached,
    bench_read_uncached,
    bench_token_sign_verify
);
criterion_main!(benches);

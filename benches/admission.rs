#![allow(missing_docs)]

use admission_core::{AdmissionConfig, AdmissionController, Key, Policy};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

fn bench_processed_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let controller = rt.block_on(async {
        AdmissionController::new(AdmissionConfig {
            gate_limit: 1_000,
            queue_limit: 1_000,
            ..AdmissionConfig::default()
        })
    });
    let policy = Policy::new(1_000_000, Duration::from_secs(60));

    c.bench_function("check_and_consume/processed", |b| {
        b.to_async(&rt).iter(|| {
            let key = black_box(Key::new("tenant-a", "client-1", "search"));
            let controller = &controller;
            async move { controller.check_and_consume(key, policy).await.unwrap() }
        })
    });
}

fn bench_many_tenants(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let controller = rt.block_on(async {
        AdmissionController::new(AdmissionConfig {
            gate_limit: 1_000,
            queue_limit: 1_000,
            ..AdmissionConfig::default()
        })
    });
    let policy = Policy::new(1_000_000, Duration::from_secs(60));

    c.bench_function("check_and_consume/many_tenants", |b| {
        let mut i: u64 = 0;
        b.to_async(&rt).iter(|| {
            i = i.wrapping_add(1);
            let key = black_box(Key::new(format!("tenant-{}", i % 64), "client-1", "search"));
            let controller = &controller;
            async move { controller.check_and_consume(key, policy).await.unwrap() }
        })
    });
}

criterion_group!(benches, bench_processed_path, bench_many_tenants);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

use redlock_core::clock::ClockModel;
use redlock_core::quorum::resolve_quorum;

fn bench_drift_margin(c: &mut Criterion) {
    let clock = ClockModel::default();
    c.bench_function("drift_margin", |b| {
        b.iter(|| clock.drift_margin(black_box(Duration::from_millis(10_000))))
    });
}

fn bench_remaining_validity(c: &mut Criterion) {
    let clock = ClockModel::default();
    c.bench_function("remaining_validity", |b| {
        b.iter(|| {
            clock.remaining_validity(
                black_box(Duration::from_millis(1000)),
                black_box(Duration::from_millis(50)),
            )
        })
    });
}

fn bench_resolve_quorum(c: &mut Criterion) {
    c.bench_function("resolve_quorum", |b| {
        b.iter(|| resolve_quorum(black_box(5), black_box(Some(4))))
    });
}

criterion_group!(
    benches,
    bench_drift_margin,
    bench_remaining_validity,
    bench_resolve_quorum
);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use redlock_core::config::{ManagerOptions, RetryPolicy};
use redlock_core::infrastructure::LockStore;
use redlock_core::infrastructure_in_memory::InMemoryLockStore;
use redlock_core::manager::LockManager;

fn manager(store_count: usize) -> LockManager {
    let stores: Vec<Arc<dyn LockStore>> = (0..store_count)
        .map(|i| Arc::new(InMemoryLockStore::new(format!("s{}", i))) as Arc<dyn LockStore>)
        .collect();
    LockManager::new(stores, ManagerOptions::default()).expect("valid manager")
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime")
}

fn bench_acquire_release(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("acquire_release_cycle");

    for store_count in [3, 5, 7] {
        let m = manager(store_count);
        group.bench_with_input(
            BenchmarkId::new("stores", store_count),
            &store_count,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let lock = m
                            .acquire("bench", Duration::from_secs(5))
                            .await
                            .expect("uncontended acquire");
                        m.release(&lock).await;
                    })
                })
            },
        );
    }

    group.finish();
}

fn bench_contended_round(c: &mut Criterion) {
    let rt = runtime();
    let m = manager(5);
    let held = rt
        .block_on(m.acquire("hot", Duration::from_secs(3600)))
        .expect("initial holder");

    c.bench_function("contended_round_busy", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = m
                    .acquire_with(&["hot".to_string()], Duration::from_secs(5), &RetryPolicy::once())
                    .await;
                black_box(result.is_err())
            })
        })
    });

    rt.block_on(m.release(&held));
}

fn bench_many_resources(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("acquire_many");
    let m = manager(3);

    for resource_count in [1, 10, 50] {
        let resources: Vec<String> = (0..resource_count).map(|i| format!("/file_{}", i)).collect();
        group.bench_with_input(
            BenchmarkId::new("resources", resource_count),
            &resources,
            |b, resources| {
                b.iter(|| {
                    rt.block_on(async {
                        let lock = m
                            .acquire_many(resources.iter().cloned(), Duration::from_secs(5))
                            .await
                            .expect("uncontended acquire");
                        m.release(&lock).await;
                    })
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_contended_round,
    bench_many_resources
);
criterion_main!(benches);

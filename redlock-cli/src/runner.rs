use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redlock_core::infrastructure_in_memory::InMemoryLockStore;
use redlock_core::quorum::resolve_quorum;
use redlock_core::{Lock, LockManager, LockStore, RedlockConfig, RedlockError, StoreEndpoint};

use crate::output::{ApiResponse, ConfigInfo, DemoStep, LockInfo, ReleaseInfo};

/// Endpoints used when neither a config file nor `--endpoint` names any:
/// three logical dbs on a local Redis.
const DEFAULT_ENDPOINTS: &[&str] = &["127.0.0.1:6379/0", "127.0.0.1:6379/1", "127.0.0.1:6379/2"];

/// Prints an error envelope and exits with status 1.
pub fn fail(msg: impl std::fmt::Display) -> ! {
    tracing::error!("{}", msg);
    ApiResponse::<()>::err(msg.to_string()).print();
    std::process::exit(1);
}

// ─── Configuration ──────────────────────────────────────────────────────────

pub fn load_config(path: Option<&Path>, endpoints: &[String]) -> Result<RedlockConfig, String> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
            serde_json::from_str::<RedlockConfig>(&raw)
                .map_err(|e| format!("Invalid config '{}': {}", path.display(), e))?
        }
        None => RedlockConfig::default(),
    };

    if !endpoints.is_empty() {
        config.store_endpoints = parse_endpoints(endpoints)?;
    }
    if config.store_endpoints.is_empty() {
        config.store_endpoints = parse_endpoints(DEFAULT_ENDPOINTS)?;
    }

    Ok(config)
}

fn parse_endpoints<S: AsRef<str>>(raw: &[S]) -> Result<Vec<StoreEndpoint>, String> {
    raw.iter()
        .map(|s| s.as_ref().parse::<StoreEndpoint>().map_err(|e| e.to_string()))
        .collect()
}

pub fn show_config(storage: &str, config: &RedlockConfig) -> i32 {
    if let Err(e) = config.validate() {
        ApiResponse::<()>::err(e.to_string()).print();
        return 1;
    }
    // validate() succeeded, so the quorum resolves
    let quorum = resolve_quorum(config.store_endpoints.len(), config.quorum).unwrap_or_default();
    ApiResponse::ok(ConfigInfo {
        storage,
        quorum,
        config,
    })
    .print();
    0
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

/// One store per configured endpoint, on the selected backend.
fn create_manager(storage: &str, config: &RedlockConfig) -> Result<LockManager, RedlockError> {
    config.validate()?;
    let count = config.store_endpoints.len();

    if storage == "redis" {
        #[cfg(feature = "redis")]
        {
            tracing::info!(stores = count, "💾 Storage backend: Redis");
            LockManager::from_config(config)
        }
        #[cfg(not(feature = "redis"))]
        {
            Err(RedlockError::Configuration(
                "Redis storage requested but the `redis` feature is not enabled".to_string(),
            ))
        }
    } else if storage == "memory" {
        tracing::info!(stores = count, "💾 Storage backend: in-memory (single process only)");
        let stores = (0..count)
            .map(|i| Arc::new(InMemoryLockStore::new(format!("memory-{}", i))) as Arc<dyn LockStore>)
            .collect();
        LockManager::new(stores, config.options())
    } else if let Some(dir) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            use redlock_core::infrastructure_sqlite::SqliteLockStore;

            tracing::info!(stores = count, "💾 Storage backend: SQLite ({})", dir);
            std::fs::create_dir_all(dir).map_err(|e| {
                RedlockError::Configuration(format!("Failed to create '{}': {}", dir, e))
            })?;
            let stores = (0..count)
                .map(|i| {
                    let path = Path::new(dir).join(format!("store-{}.db", i));
                    let path = path.to_string_lossy().into_owned();
                    SqliteLockStore::open(&path)
                        .map(|store| Arc::new(store) as Arc<dyn LockStore>)
                        .map_err(|e| {
                            RedlockError::Configuration(format!("Failed to open '{}': {}", path, e))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            LockManager::new(stores, config.options())
        }
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = dir;
            Err(RedlockError::Configuration(
                "SQLite storage requested but the `sqlite` feature is not enabled".to_string(),
            ))
        }
    } else {
        Err(RedlockError::Configuration(format!(
            "Unknown storage backend: '{}'. Use 'redis', 'memory' or 'sqlite:<dir>'",
            storage
        )))
    }
}

// ─── Commands ───────────────────────────────────────────────────────────────

pub async fn lock(
    storage: &str,
    config: &RedlockConfig,
    resources: Vec<String>,
    ttl_ms: Option<u64>,
    hold_ms: u64,
    extend_ms: Option<u64>,
) -> i32 {
    let manager = match create_manager(storage, config) {
        Ok(manager) => manager,
        Err(e) => fail(e),
    };
    let ttl = ttl_ms
        .map(Duration::from_millis)
        .unwrap_or(manager.options().default_ttl);

    let lock = match manager.acquire_many(resources, ttl).await {
        Ok(lock) => lock,
        Err(e) => {
            tracing::info!(reason = %e, "Lock denied");
            ApiResponse::<()>::err(e.to_string()).print();
            return 1;
        }
    };
    tracing::info!(resources = ?lock.resources(), validity_ms = lock.validity().as_millis() as u64, "Lock acquired");
    ApiResponse::ok(LockInfo::new("acquired", &lock)).print();

    let held_since = lock.acquired_at();
    let mut current = lock;
    let hold = Duration::from_millis(hold_ms);
    match extend_ms {
        Some(extend_ms) => {
            warn_overstay(hold / 2, &current);
            tokio::time::sleep(hold / 2).await;
            match manager.extend(&current, Duration::from_millis(extend_ms)).await {
                Ok(extended) => {
                    tracing::info!(resources = ?extended.resources(), "Lock extended");
                    ApiResponse::ok(LockInfo::new("extended", &extended)).print();
                    current = extended;
                }
                Err(e) => {
                    tracing::warn!(reason = %e, "Lock extension failed");
                    ApiResponse::<()>::err(e.to_string()).print();
                }
            }
            warn_overstay(hold - hold / 2, &current);
            tokio::time::sleep(hold - hold / 2).await;
        }
        None => {
            warn_overstay(hold, &current);
            tokio::time::sleep(hold).await;
        }
    }

    manager.release(&current).await;
    tracing::info!(resources = ?current.resources(), "Lock released");
    ApiResponse::ok(ReleaseInfo {
        event: "released",
        resources: current.resources().to_vec(),
        held_ms: held_since.elapsed().as_millis() as u64,
    })
    .print();
    0
}

/// How far holding for `hold` would run past the lock's validity.
fn overstay(hold: Duration, validity: Duration) -> Option<Duration> {
    hold.checked_sub(validity).filter(|d| !d.is_zero())
}

fn warn_overstay(hold: Duration, lock: &Lock) {
    if let Some(over) = overstay(hold, lock.remaining()) {
        tracing::warn!(
            resources = ?lock.resources(),
            hold_ms = hold.as_millis() as u64,
            over_ms = over.as_millis() as u64,
            "Holding past lock validity, another caller may take it"
        );
    }
}

/// Two callers contend for one resource: A takes it, B is refused until A
/// releases, then B takes it.
pub async fn demo(storage: &str, config: &RedlockConfig, resource: &str, ttl_ms: u64) -> i32 {
    let manager = match create_manager(storage, config) {
        Ok(manager) => manager,
        Err(e) => fail(e),
    };
    let ttl = Duration::from_millis(ttl_ms);
    let mut steps = Vec::new();

    let a = manager.acquire(resource, ttl).await;
    steps.push(DemoStep {
        caller: "A",
        action: "acquire",
        outcome: describe(&a),
        expected: a.is_ok(),
    });
    let Ok(a) = a else {
        return finish(steps);
    };

    let b = manager.acquire(resource, ttl).await;
    steps.push(DemoStep {
        caller: "B",
        action: "acquire",
        outcome: describe(&b),
        expected: matches!(b, Err(RedlockError::ResourceBusy { .. })),
    });

    manager.release(&a).await;
    steps.push(DemoStep {
        caller: "A",
        action: "release",
        outcome: "released".to_string(),
        expected: true,
    });

    let b = manager.acquire(resource, ttl).await;
    steps.push(DemoStep {
        caller: "B",
        action: "acquire",
        outcome: describe(&b),
        expected: b.is_ok(),
    });
    if let Ok(b) = &b {
        manager.release(b).await;
    }

    finish(steps)
}

fn describe(result: &Result<Lock, RedlockError>) -> String {
    match result {
        Ok(lock) => format!("acquired ({}ms validity)", lock.validity().as_millis()),
        Err(e) => e.to_string(),
    }
}

fn finish(steps: Vec<DemoStep>) -> i32 {
    let all_expected = steps.iter().all(|s| s.expected);
    for step in &steps {
        tracing::info!(caller = step.caller, action = step.action, outcome = %step.outcome, "Demo step");
    }
    if all_expected {
        ApiResponse::ok(steps).print();
        0
    } else {
        ApiResponse {
            success: false,
            data: Some(steps),
            error: Some("walkthrough diverged from the expected outcome".to_string()),
        }
        .print();
        1
    }
}

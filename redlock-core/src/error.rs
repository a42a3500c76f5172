use std::time::Duration;

use thiserror::Error;

/// A failure talking to one store instance.
///
/// Unlike `Ok(false)`, a `StoreError` means the outcome is unknown: the
/// write may or may not have landed. These never reach callers of
/// [`LockManager`](crate::manager::LockManager); the coordinator reduces
/// them to per-handle outcomes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the lock manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RedlockError {
    /// Invalid manager configuration. Fatal at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single call was malformed (zero TTL, no resources, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No quorum with positive validity within the retry budget.
    #[error("resource busy: {resources:?} not acquired after {attempts} attempt(s)")]
    ResourceBusy {
        resources: Vec<String>,
        attempts: u32,
    },

    /// `extend` was called on a lock whose validity already elapsed.
    #[error("lock on {resources:?} already expired")]
    LockExpired { resources: Vec<String> },
}

pub type Result<T> = std::result::Result<T, RedlockError>;

use std::time::Duration;

use tokio::time::Instant;

use super::OwnerToken;

/// A time-bound lock held on a quorum of stores.
///
/// Only a successful quorum round creates a `Lock`, and it never changes
/// afterwards: extending a lock yields a new value carrying the same token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    /// The locked resource names, in acquisition order
    resources: Vec<String>,
    /// Token written to every store that granted the lock
    token: OwnerToken,
    /// Coordinator-local instant at which the winning round finished
    acquired_at: Instant,
    /// Remaining validity at the end of the round, after drift compensation
    validity: Duration,
}

impl Lock {
    pub(crate) fn new(
        resources: Vec<String>,
        token: OwnerToken,
        acquired_at: Instant,
        validity: Duration,
    ) -> Self {
        Self {
            resources,
            token,
            acquired_at,
            validity,
        }
    }

    /// The first (or only) locked resource.
    pub fn resource(&self) -> &str {
        self.resources.first().map(String::as_str).unwrap_or_default()
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn token(&self) -> &OwnerToken {
        &self.token
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Validity left when the lock was granted, counted from
    /// `acquired_at`. Always non-zero.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Local instant after which the lock must be considered lost.
    pub fn expires_at(&self) -> Instant {
        self.acquired_at + self.validity
    }

    /// Time left before `expires_at`, zero once passed.
    pub fn remaining(&self) -> Duration {
        self.expires_at().saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::ClockModel;
    use crate::error::RedlockError;
    use crate::infrastructure::LockStore;
    use crate::infrastructure_in_memory::InMemoryLockStore;
    use crate::quorum::{resolve_quorum, QuorumCoordinator, RoundFailure};
    use crate::types::OwnerToken;
    use std::sync::Arc;
    use std::time::Duration;

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn stores(n: usize) -> Vec<Arc<InMemoryLockStore>> {
        (0..n)
            .map(|i| Arc::new(InMemoryLockStore::new(format!("s{}", i))))
            .collect()
    }

    fn coordinator(stores: &[Arc<InMemoryLockStore>], timeout: Option<Duration>) -> QuorumCoordinator {
        let handles: Vec<Arc<dyn LockStore>> = stores
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn LockStore>)
            .collect();
        QuorumCoordinator::new(handles, None, ClockModel::default(), timeout).unwrap()
    }

    fn res(name: &str) -> Vec<String> {
        vec![name.to_string()]
    }

    async fn seed(store: &InMemoryLockStore, resource: &str, token: &str, ttl: Duration) {
        assert_eq!(store.try_acquire(&res(resource), token, ttl).await, Ok(true));
    }

    // =========================================================================
    // Quorum sizing
    // =========================================================================

    #[test]
    fn derived_quorum_is_strict_majority() {
        assert_eq!(resolve_quorum(3, None), Ok(2));
        assert_eq!(resolve_quorum(4, None), Ok(3));
        assert_eq!(resolve_quorum(5, None), Ok(3));
        assert_eq!(resolve_quorum(7, None), Ok(4));
    }

    #[test]
    fn fewer_than_three_stores_is_rejected() {
        for n in 0..3 {
            assert!(matches!(resolve_quorum(n, None), Err(RedlockError::Configuration(_))));
        }
    }

    #[test]
    fn quorum_override_bounds() {
        assert_eq!(resolve_quorum(5, Some(4)), Ok(4));
        assert!(resolve_quorum(5, Some(2)).is_err());
        assert!(resolve_quorum(5, Some(5)).is_err());
        assert!(resolve_quorum(3, Some(3)).is_err());
    }

    #[test]
    fn handle_timeout_splits_ttl_and_stays_below_it() {
        let s = stores(3);
        let c = coordinator(&s, None);
        assert_eq!(c.handle_timeout(ms(1000)), ms(1000) / 3);
        // Floored at 5ms
        assert_eq!(c.handle_timeout(ms(9)), ms(5));
        // Floor would reach the ttl itself
        assert_eq!(c.handle_timeout(ms(4)), ms(2));

        let overridden = coordinator(&s, Some(ms(2000)));
        assert_eq!(overridden.handle_timeout(ms(1000)), ms(500));
        assert_eq!(overridden.handle_timeout(ms(5000)), ms(2000));
    }

    // =========================================================================
    // Acquisition rounds
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn two_of_three_is_enough() {
        let s = stores(3);
        let c = coordinator(&s, None);
        seed(&s[2], "X", "someone_else", ms(5000)).await;

        let token = OwnerToken::generate();
        let lock = c.acquire(&res("X"), &token, ms(1000)).await.unwrap();

        assert_eq!(lock.token(), &token);
        assert_eq!(lock.resource(), "X");
        // No time passes on a paused clock: only the drift margin is lost
        assert_eq!(lock.validity(), ms(988));
        assert_eq!(s[0].holder("X").as_deref(), Some(token.as_str()));
        assert_eq!(s[1].holder("X").as_deref(), Some(token.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn one_of_three_fails_and_cleans_up() {
        let s = stores(3);
        let c = coordinator(&s, None);
        seed(&s[1], "X", "someone_else", ms(5000)).await;
        seed(&s[2], "X", "someone_else", ms(5000)).await;

        let token = OwnerToken::generate();
        let result = c.acquire(&res("X"), &token, ms(1000)).await;

        assert_eq!(
            result.unwrap_err(),
            RoundFailure::QuorumNotReached {
                successes: 1,
                quorum: 2
            }
        );
        // The minority write is rolled back, foreign keys untouched
        assert_eq!(s[0].holder("X"), None);
        assert_eq!(s[1].holder("X").as_deref(), Some("someone_else"));
        assert_eq!(s[2].holder("X").as_deref(), Some("someone_else"));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_minority_is_tolerated() {
        let s = stores(5);
        let c = coordinator(&s, None);
        s[0].set_unavailable(true);
        s[3].set_unavailable(true);

        let lock = c.acquire(&res("X"), &OwnerToken::generate(), ms(1000)).await;
        assert!(lock.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_majority_fails() {
        let s = stores(3);
        let c = coordinator(&s, None);
        s[0].set_unavailable(true);
        s[1].set_unavailable(true);

        let result = c.acquire(&res("X"), &OwnerToken::generate(), ms(1000)).await;
        assert!(matches!(result, Err(RoundFailure::QuorumNotReached { successes: 1, .. })));
        assert!(s[2].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_handle_is_released_on_failure() {
        let s = stores(3);
        let c = coordinator(&s, None);
        seed(&s[0], "X", "someone_else", ms(5000)).await;
        seed(&s[1], "X", "someone_else", ms(5000)).await;
        // Write lands, answer arrives after the 333ms handle timeout
        s[2].set_latency(ms(500));

        let result = c.acquire(&res("X"), &OwnerToken::generate(), ms(1000)).await;

        assert!(matches!(result, Err(RoundFailure::QuorumNotReached { successes: 0, .. })));
        assert_eq!(s[2].holder("X"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_quorum_reports_drift_not_lock() {
        let s = stores(3);
        let c = coordinator(&s, Some(ms(999)));
        for store in &s {
            store.set_latency(ms(990));
        }

        let result = c.acquire(&res("X"), &OwnerToken::generate(), ms(1000)).await;

        match result {
            Err(RoundFailure::ClockDriftExceeded { elapsed, drift_margin }) => {
                assert!(elapsed >= ms(990));
                assert_eq!(drift_margin, ms(12));
            }
            other => panic!("Expected ClockDriftExceeded, got {:?}", other),
        }
        for store in &s {
            assert!(store.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_round_releases_in_background() {
        let s = stores(3);
        let c = coordinator(&s, None);
        for store in &s {
            store.set_latency(ms(100));
        }

        let abandoned =
            tokio::time::timeout(ms(50), c.acquire(&res("X"), &OwnerToken::generate(), ms(1000))).await;
        assert!(abandoned.is_err());

        // Writes landed before the caller gave up
        tokio::time::sleep(ms(1)).await;
        for store in &s {
            assert_eq!(store.holder("X"), None);
        }
    }

    // =========================================================================
    // Extension and release rounds
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn extend_round_keeps_token_and_refreshes_expiry() {
        let s = stores(3);
        let c = coordinator(&s, None);
        let token = OwnerToken::generate();
        let lock = c.acquire(&res("X"), &token, ms(1000)).await.unwrap();

        tokio::time::advance(ms(600)).await;
        let extended = c.extend(lock.resources(), lock.token(), ms(2000)).await.unwrap();

        assert_eq!(extended.token(), lock.token());
        assert!(extended.acquired_at() > lock.acquired_at());
        assert_eq!(extended.validity(), ms(2000) - ms(22));
        for store in &s {
            assert_eq!(store.ttl_of("X"), Some(ms(2000)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn extend_round_fails_for_foreign_token() {
        let s = stores(3);
        let c = coordinator(&s, None);
        c.acquire(&res("X"), &OwnerToken::generate(), ms(1000)).await.unwrap();

        let result = c.extend(&res("X"), &OwnerToken::generate(), ms(1000)).await;
        assert!(matches!(result, Err(RoundFailure::QuorumNotReached { successes: 0, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn release_round_counts_deletions_and_needs_no_quorum() {
        let s = stores(3);
        let c = coordinator(&s, None);
        let token = OwnerToken::generate();
        c.acquire(&res("X"), &token, ms(1000)).await.unwrap();
        s[0].set_unavailable(true);

        assert_eq!(c.release(&res("X"), &token).await, 2);
        assert_eq!(c.release(&res("X"), &token).await, 0);
    }
}

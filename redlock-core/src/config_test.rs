#[cfg(test)]
mod tests {
    use crate::config::{RedlockConfig, RetryPolicy, StoreEndpoint};
    use crate::error::RedlockError;
    use std::time::Duration;

    fn endpoints(n: i64) -> Vec<StoreEndpoint> {
        (0..n).map(|db| StoreEndpoint::new("127.0.0.1", 6379, db)).collect()
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    #[test]
    fn parses_host_port_db() {
        let ep: StoreEndpoint = "10.0.0.7:6380/2".parse().unwrap();
        assert_eq!(ep, StoreEndpoint::new("10.0.0.7", 6380, 2));
        assert_eq!(ep.to_url(), "redis://10.0.0.7:6380/2");
        assert_eq!(ep.to_string(), "10.0.0.7:6380/2");
    }

    #[test]
    fn db_defaults_to_zero() {
        let ep: StoreEndpoint = "localhost:6379".parse().unwrap();
        assert_eq!(ep.db, 0);
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for bad in ["localhost", ":6379", "localhost:99999", "localhost:6379/x", "h:port"] {
            assert!(
                matches!(bad.parse::<StoreEndpoint>(), Err(RedlockError::Configuration(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    // =========================================================================
    // Serialized configuration
    // =========================================================================

    #[test]
    fn json_fills_in_defaults() {
        let config: RedlockConfig = serde_json::from_str(
            r#"{
                "store_endpoints": [
                    { "host": "127.0.0.1", "port": 6379 },
                    { "host": "127.0.0.1", "port": 6379, "db": 1 },
                    { "host": "127.0.0.1", "port": 6379, "db": 2 }
                ],
                "retry_count": 10,
                "retry_delay_ms": [200, 400]
            }"#,
        )
        .unwrap();

        assert_eq!(config.store_endpoints[0].db, 0);
        assert_eq!(config.quorum, None);
        assert_eq!(config.default_ttl_ms, 10_000);
        assert_eq!(config.drift_factor, 0.01);
        assert!(config.validate().is_ok());

        let options = config.options();
        assert_eq!(options.retry.retry_count, 10);
        assert_eq!(options.retry.min_delay, Duration::from_millis(200));
        assert_eq!(options.retry.max_delay, Duration::from_millis(400));
        assert_eq!(options.default_ttl, Duration::from_secs(10));
        assert_eq!(options.per_handle_timeout, None);
    }

    #[test]
    fn too_few_endpoints_is_fatal() {
        let config = RedlockConfig {
            store_endpoints: endpoints(2),
            ..RedlockConfig::default()
        };
        assert!(matches!(config.validate(), Err(RedlockError::Configuration(_))));
    }

    #[test]
    fn quorum_override_must_be_usable_majority() {
        let mut config = RedlockConfig {
            store_endpoints: endpoints(5),
            ..RedlockConfig::default()
        };

        config.quorum = Some(4);
        assert!(config.validate().is_ok());

        config.quorum = Some(2);
        assert!(config.validate().is_err());

        config.quorum = Some(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_timing_settings() {
        let base = RedlockConfig {
            store_endpoints: endpoints(3),
            ..RedlockConfig::default()
        };

        let inverted = RedlockConfig {
            retry_delay_ms: [300, 100],
            ..base.clone()
        };
        assert!(inverted.validate().is_err());

        let drift = RedlockConfig {
            drift_factor: 1.0,
            ..base.clone()
        };
        assert!(drift.validate().is_err());

        let no_retry = RedlockConfig {
            retry_count: 0,
            ..base.clone()
        };
        assert!(no_retry.validate().is_err());

        let zero_timeout = RedlockConfig {
            per_handle_timeout_ms: Some(0),
            ..base
        };
        assert!(zero_timeout.validate().is_err());
    }

    // =========================================================================
    // Retry jitter
    // =========================================================================

    #[test]
    fn jitter_stays_within_range() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(200));
        for _ in 0..1000 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn jitter_actually_varies() {
        let policy = RetryPolicy::new(3, Duration::from_millis(0), Duration::from_millis(1000));
        let first = policy.next_delay();
        assert!((0..50).any(|_| policy.next_delay() != first));
    }

    #[test]
    fn degenerate_range_is_fixed_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(150), Duration::from_millis(150));
        assert_eq!(policy.next_delay(), Duration::from_millis(150));
        assert_eq!(RetryPolicy::once().next_delay(), Duration::ZERO);
    }
}

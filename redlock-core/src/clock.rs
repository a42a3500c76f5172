use std::time::Duration;

/// Default relative skew allowed between the coordinator and any store.
pub const DEFAULT_DRIFT_FACTOR: f64 = 0.01;

/// Fixed allowance for store-side expiry precision (Redis expires keys
/// with millisecond granularity, up to a millisecond late).
pub const DEFAULT_CLOCK_RESOLUTION: Duration = Duration::from_millis(2);

/// Drift-compensation arithmetic for validity windows.
///
/// A lock taken with `ttl` is only trusted for
/// `ttl - elapsed - drift_margin(ttl)`: the time already spent acquiring it
/// is gone, and the stores' clocks may run up to `drift_factor` faster than
/// ours. Correctness rests on that bound holding, together with bounded
/// process pauses between acquisition and use; neither is enforced here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockModel {
    drift_factor: f64,
    clock_resolution: Duration,
}

impl ClockModel {
    pub fn new(drift_factor: f64, clock_resolution: Duration) -> Self {
        Self {
            drift_factor,
            clock_resolution,
        }
    }

    pub fn drift_factor(&self) -> f64 {
        self.drift_factor
    }

    pub fn clock_resolution(&self) -> Duration {
        self.clock_resolution
    }

    /// `ttl * drift_factor + clock_resolution`
    pub fn drift_margin(&self, ttl: Duration) -> Duration {
        ttl.mul_f64(self.drift_factor) + self.clock_resolution
    }

    /// Validity left after a round that took `elapsed`, or `None` if it
    /// would be zero or negative.
    pub fn remaining_validity(&self, ttl: Duration, elapsed: Duration) -> Option<Duration> {
        ttl.checked_sub(elapsed)
            .and_then(|left| left.checked_sub(self.drift_margin(ttl)))
            .filter(|validity| !validity.is_zero())
    }
}

impl Default for ClockModel {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_FACTOR, DEFAULT_CLOCK_RESOLUTION)
    }
}

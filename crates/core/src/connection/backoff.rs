use std::time::Duration;

/// Bounded exponential backoff with jitter for reconnect attempts.
///
/// Attempt 0 is immediate. Attempt `n >= 1` waits up to `base * 2^(n-1)`,
/// capped at `max`, scaled down by a random factor in `[1 - jitter, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl BackoffPolicy {
    /// Creates a policy. `jitter` is clamped to `[0, 1]` and `max` is raised
    /// to `base` if it is smaller.
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        let jitter = if jitter.is_nan() {
            0.0
        } else {
            jitter.clamp(0.0, 1.0)
        };
        Self {
            base,
            max: max.max(base),
            jitter,
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Upper bound of the delay before `attempt`, without jitter.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before `attempt`, given a uniform random `sample` in `[0, 1]`.
    pub fn delay(&self, attempt: u32, sample: f64) -> Duration {
        let sample = if sample.is_nan() {
            1.0
        } else {
            sample.clamp(0.0, 1.0)
        };
        let scale = 1.0 - self.jitter * (1.0 - sample);
        self.ceiling(attempt).mul_f64(scale)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30), 0.5)
    }
}

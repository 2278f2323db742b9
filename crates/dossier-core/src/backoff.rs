//! Retry backoff policy.

use rand::Rng;
use std::time::Duration;

/// Capped exponential backoff with jitter.
///
/// Delays grow as `base * 2^attempt` up to `max`, with a random jitter
/// fraction added on top so that many clients recovering from the same
/// outage do not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay in milliseconds (attempt 0).
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter fraction in [0, 1]; the final delay is scaled by a random
    /// factor in [1, 1 + jitter].
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            jitter: 0.5,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy without jitter. Useful for deterministic tests.
    pub fn fixed(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter: 0.0,
        }
    }

    /// Raw capped exponential delay for the given attempt, without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Delay for the given attempt, with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(0.0..self.jitter);
        base.mul_f64(factor)
    }
}

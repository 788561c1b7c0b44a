//! Backoff policies for retrying rejected bulk requests.

use std::time::Duration;

/// How long to wait between attempts when the cluster rejects bulk work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    /// Exponentially growing delays starting at `initial_delay`.
    pub fn exponential(initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            initial_delay,
            max_retries,
        }
    }

    /// Fresh iterator over the delays of this policy.
    pub fn delays(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            start_millis: self.initial_delay.as_millis() as u64,
            max_retries: self.max_retries,
            consumed: 0,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(50), 8)
    }
}

/// Delay sequence `start + 10ms * (floor(e^(0.8 * n)) - 1)` for n = 0, 1, ...
///
/// With a 4000ms start the delays are 4000ms, 4010ms, 4030ms, 4100ms, ...
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    start_millis: u64,
    max_retries: u32,
    consumed: u32,
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.consumed >= self.max_retries {
            return None;
        }
        let growth = (0.8_f64 * f64::from(self.consumed)).exp() as u64;
        self.consumed += 1;
        Some(Duration::from_millis(
            self.start_millis + 10 * growth.saturating_sub(1),
        ))
    }
}

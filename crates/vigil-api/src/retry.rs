//! When and how long to wait before resending a failed completion.

use std::time::Duration;

use rand::Rng;
use vigil_types::ApiError;

/// Retry schedule for transient chat-completion failures.
///
/// Waits double from `base_delay` per retry and are drawn from the upper half
/// of that window. A `Retry-After` hint on a 429 replaces the computed wait.
/// Every wait is capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends after the first attempt. Zero sends exactly once.
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Send once and surface the first failure.
    pub fn never() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// The wait before resend number `retry` (0-based) after `error`, or
    /// `None` when `error` is final.
    pub(crate) fn wait_after(&self, retry: u32, error: &ApiError) -> Option<Duration> {
        if retry >= self.retries {
            return None;
        }
        let hinted = match error {
            ApiError::RateLimited { retry_after_ms } => *retry_after_ms,
            ApiError::Server { status, .. } if *status >= 500 => None,
            ApiError::Network(_) | ApiError::Timeout => None,
            _ => return None,
        };
        let wait = match hinted {
            Some(ms) => Duration::from_millis(ms),
            None => self.window(retry),
        };
        Some(wait.min(self.max_delay))
    }

    fn window(&self, retry: u32) -> Duration {
        let ceiling = self
            .base_delay
            .saturating_mul(1u32 << retry.min(16))
            .min(self.max_delay);
        let ceiling_ms = ceiling.as_millis() as u64;
        let floor_ms = ceiling_ms / 2;
        Duration::from_millis(rand::rng().random_range(floor_ms..=ceiling_ms))
    }
}

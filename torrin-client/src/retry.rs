use std::time::Duration;

/// Exponential backoff policy for chunk uploads.
///
/// `attempts` counts every try including the first; the delay before retry
/// `n` (1-based) is `base_delay * 2^(n-1)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries per chunk, including the first.
    pub attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retrying after failed attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

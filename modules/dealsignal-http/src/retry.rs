use std::time::Duration;

use rand::Rng;

use dealsignal_common::config::HttpSettings;

/// Exponential backoff with a cap and optional jitter. Attempt numbers
/// are 1-indexed; attempt 1 waits `base`, attempt 2 waits `2 * base`, …
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 0.0 = deterministic, 1.0 = up to double the computed delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self {
            max_attempts: settings.retries.max(1),
            base_delay: Duration::from_millis(settings.backoff_base_ms),
            max_delay: Duration::from_millis(settings.backoff_max_ms),
            jitter: 0.2,
        }
    }

    /// The deterministic part of the delay for a 1-indexed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.max_delay)
    }

    /// Delay with jitter applied, honoring a server-provided override
    /// (Retry-After on a 429 beats the computed backoff).
    pub fn next_delay(&self, attempt: u32, server_override: Option<Duration>) -> Duration {
        if let Some(wait) = server_override {
            return wait.min(self.max_delay);
        }
        let base = self.delay_for(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(0.0..self.jitter);
        base.mul_f64(factor).min(self.max_delay)
    }
}

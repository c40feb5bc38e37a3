use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::trace;

use dealsignal_common::config::RateLimitSetting;
use dealsignal_common::error::{PipelineError, Result};
use dealsignal_common::CancelFlag;

/// Token bucket per `(source_api, endpoint_group)`. `acquire` suspends the
/// calling task until a token is free or the flag is cancelled; there is
/// no busy-wait and no fairness guarantee beyond tokio's wakeup order.
pub struct RateLimiter {
    buckets: Mutex<HashMap<(String, String), TokenBucket>>,
    /// Per-source settings; sources without one get `default`.
    settings: HashMap<String, RateLimitSetting>,
    default: RateLimitSetting,
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(setting: RateLimitSetting) -> Self {
        let capacity = f64::from(setting.burst.max(1));
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: setting.requests_per_second.max(0.01),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token if available; otherwise the wait until the next one.
    fn try_take(&mut self, now: Instant) -> std::result::Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let deficit = 1.0 - self.tokens;
        Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
    }
}

impl RateLimiter {
    pub fn new(
        settings: HashMap<String, RateLimitSetting>,
        default: RateLimitSetting,
    ) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            settings,
            default,
        }
    }

    /// A limiter with one requests/sec for everything. Test convenience.
    pub fn uniform(requests_per_second: f64, burst: u32) -> Self {
        Self::new(
            HashMap::new(),
            RateLimitSetting {
                requests_per_second,
                burst,
            },
        )
    }

    fn setting_for(&self, source: &str) -> RateLimitSetting {
        self.settings.get(source).copied().unwrap_or(self.default)
    }

    /// Block (cooperatively) until a token for this bucket is available.
    pub async fn acquire(&self, source: &str, group: &str, cancel: &CancelFlag) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let wait = {
                let mut buckets = self.buckets.lock().await;
                let bucket = buckets
                    .entry((source.to_string(), group.to_string()))
                    .or_insert_with(|| TokenBucket::new(self.setting_for(source)));
                match bucket.try_take(Instant::now()) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            trace!(source, group, wait_ms = wait.as_millis() as u64, "Rate limit wait");
            // Sleep in short slices so cancellation is observed promptly.
            tokio::time::sleep(wait.min(Duration::from_millis(100))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_tokens_are_immediate_then_throttled() {
        let limiter = RateLimiter::uniform(10.0, 2);
        let cancel = CancelFlag::new();

        let start = Instant::now();
        limiter.acquire("src", "api", &cancel).await.unwrap();
        limiter.acquire("src", "api", &cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        // Third token has to wait ~100ms at 10 rps.
        limiter.acquire("src", "api", &cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test(start_paused = true)]
    async fn buckets_are_independent_per_source() {
        let limiter = RateLimiter::uniform(1.0, 1);
        let cancel = CancelFlag::new();

        let start = Instant::now();
        limiter.acquire("a", "api", &cancel).await.unwrap();
        limiter.acquire("b", "api", &cancel).await.unwrap();
        // Different buckets: no wait for b.
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_acquire_returns_cancelled() {
        let limiter = RateLimiter::uniform(0.1, 1);
        let cancel = CancelFlag::new();

        limiter.acquire("src", "api", &cancel).await.unwrap();
        cancel.cancel();
        let err = limiter.acquire("src", "api", &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn per_source_settings_override_default() {
        let mut settings = HashMap::new();
        settings.insert(
            "fast".to_string(),
            RateLimitSetting {
                requests_per_second: 100.0,
                burst: 10,
            },
        );
        let limiter = RateLimiter::new(
            settings,
            RateLimitSetting {
                requests_per_second: 1.0,
                burst: 1,
            },
        );
        let cancel = CancelFlag::new();

        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire("fast", "api", &cancel).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

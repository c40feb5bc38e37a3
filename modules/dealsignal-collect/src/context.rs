use chrono::{DateTime, Duration, Utc};

use dealsignal_common::CancelFlag;
use dealsignal_http::RateLimitedClient;

/// Everything a collector run needs from the outside world.
#[derive(Clone)]
pub struct CollectContext {
    pub http: RateLimitedClient,
    pub cancel: CancelFlag,
    pub lookback_days: i64,
    pub dry_run: bool,
    /// Fixed at run start so every collector in a run agrees on "now".
    pub now: DateTime<Utc>,
}

impl CollectContext {
    pub fn new(http: RateLimitedClient, lookback_days: i64, dry_run: bool) -> Self {
        Self {
            http,
            cancel: CancelFlag::new(),
            lookback_days,
            dry_run,
            now: Utc::now(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start of the lookback window.
    pub fn window_start(&self) -> DateTime<Utc> {
        self.now - Duration::days(self.lookback_days.max(0))
    }

    /// Window start formatted for date-granular source APIs.
    pub fn window_start_date(&self) -> String {
        self.window_start().format("%Y-%m-%d").to_string()
    }
}

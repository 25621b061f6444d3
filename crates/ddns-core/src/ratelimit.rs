//! Request pacing for outbound API calls
//!
//! [`RateLimiter`] guarantees a minimum spacing of `60 / requests_per_minute`
//! seconds between the starts of consecutive calls to [`RateLimiter::wait`]
//! across every caller sharing the instance. The check of the last call time
//! and its update happen under one lock, so concurrent callers queue up
//! behind each other instead of racing.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval limiter shared by all calls to one upstream API
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing at most `requests_per_minute` calls per minute
    ///
    /// A rate of zero is treated as one request per minute.
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_interval(Duration::from_secs(60) / requests_per_minute.max(1))
    }

    /// Create a limiter with an explicit minimum interval
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Minimum spacing between two calls
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next call is allowed, then claim the slot
    ///
    /// The first call never waits.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;

        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                tracing::trace!(delay_ms = remaining.as_millis() as u64, "Rate limit wait");
                tokio::time::sleep(remaining).await;
            }
        }

        *last_call = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(30)
    }
}

//! Bounded exponential backoff with jitter
//!
//! [`RetryPolicy::execute`] runs an async operation and, when it fails with
//! an error the caller's predicate classifies as retryable, sleeps
//! `min(base * 2^attempt, max) * (0.5 + U[0, 1))` before trying again. After
//! `max_retries` retries the last error is returned. Non-retryable errors are
//! returned immediately.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Information about a scheduled retry, passed to the retry observer
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 1-based number of the retry about to happen
    pub attempt: u32,
    /// Configured retry budget
    pub max_retries: u32,
    /// Jittered delay before the retry
    pub delay: Duration,
    /// Rendered error of the failed attempt
    pub error: String,
}

type RetryObserver = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

/// Retry strategy for fallible async operations
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    rng: Mutex<StdRng>,
    observer: Option<RetryObserver>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Create a policy with OS-seeded jitter
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            rng: Mutex::new(StdRng::from_os_rng()),
            observer: None,
        }
    }

    /// Create a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay(), config.max_delay())
    }

    /// Use a deterministic jitter source
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Register a callback invoked before every retry sleep
    pub fn with_observer(mut self, observer: impl Fn(&RetryAttempt) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Configured retry budget
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff for a 0-based `attempt` with a jitter sample in `[0, 1)`
    pub fn backoff_delay(&self, attempt: u32, jitter: f64) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(63) as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped * (0.5 + jitter.clamp(0.0, 1.0))).unwrap_or(self.max_delay)
    }

    /// Draw the jittered delay for a 0-based `attempt`
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.random()
        };
        self.backoff_delay(attempt, jitter)
    }

    /// Run `operation`, retrying failures for which `is_retryable` returns true
    pub async fn execute<T, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut attempt = 0;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_retryable(&err) || attempt >= self.max_retries {
                return Err(err);
            }

            let delay = self.next_delay(attempt);
            attempt += 1;

            tracing::warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                status = err.status(),
                error = %err,
                "Request failed, retrying"
            );

            if let Some(observer) = &self.observer {
                observer(&RetryAttempt {
                    attempt,
                    max_retries: self.max_retries,
                    delay,
                    error: err.to_string(),
                });
            }

            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

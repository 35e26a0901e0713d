//! Bounded retry with backoff for provider calls.
//!
//! Every attempt that fails with a retryable error (or returns no rows) is
//! followed by a delay of `delay_ms * factor^(attempt-1)`, capped at
//! `max_delay_ms`, plus optional random jitter. After `max_attempts` the
//! last error is wrapped in `DataError::RetriesExhausted` so the caller can
//! skip the ticker instead of blocking the run.

use super::provider::DataError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1).
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub delay_ms: u64,
    /// Multiplier applied per further attempt; 1 gives a fixed delay.
    pub factor: u32,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Random jitter in percent of the delay, 0..=100.
    pub jitter_percent: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 10_000,
            factor: 1,
            max_delay_ms: 60_000,
            jitter_percent: 0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps, for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay_ms: 0,
            factor: 1,
            max_delay_ms: 0,
            jitter_percent: 0,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = u64::from(self.factor.max(1)).saturating_pow(exp);
        let ms = self.delay_ms.saturating_mul(factor).min(self.max_delay_ms.max(self.delay_ms));
        Duration::from_millis(ms)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let pct = u64::from(self.jitter_percent.min(100));
        if pct == 0 || base.is_zero() {
            return base;
        }
        let base_ms = base.as_millis() as u64;
        let range = (base_ms.saturating_mul(pct) / 100).max(1);
        let extra = rand::thread_rng().gen_range(0..range);
        Duration::from_millis(base_ms + extra)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `on_retry` is told about every failure that will be retried, with the
    /// delay about to be slept.
    pub fn run<T>(
        &self,
        ticker: &str,
        mut op: impl FnMut(u32) -> Result<T, DataError>,
        mut on_retry: impl FnMut(u32, &DataError, Duration),
    ) -> Result<T, DataError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(DataError::RetriesExhausted {
                        ticker: ticker.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => {
                    let delay = self.delay_with_jitter(attempt);
                    on_retry(attempt, &e, delay);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

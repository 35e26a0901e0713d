//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over upstream sources (Yahoo Finance for
//! market data, FRED for economic data) so the fetch loop can be driven by a
//! scripted provider in tests.

use crate::merge::FetchWindow;
use crate::table::ColumnKey;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One dated observation; `values` line up with `FetchResult::columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// Structured error types for provider operations.
///
/// Displayable in CLI output and log lines alike.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {ticker}")]
    SymbolNotFound { ticker: String },

    #[error("provider returned no observations for {ticker}")]
    EmptyResult { ticker: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("gave up on {ticker} after {attempts} attempts: {last}")]
    RetriesExhausted {
        ticker: String,
        attempts: u32,
        last: Box<DataError>,
    },

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Bans and missing credentials never clear up by waiting.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DataError::CircuitBreakerTripped
                | DataError::AuthenticationRequired(_)
                | DataError::Client(_)
                | DataError::RetriesExhausted { .. }
        )
    }
}

/// Result of a successful fetch for a single ticker.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub ticker: String,
    /// Explicit column identity for every value slot in `observations`.
    pub columns: Vec<ColumnKey>,
    pub observations: Vec<Observation>,
    pub source: DataSource,
}

impl FetchResult {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    YahooFinance,
    Fred,
    Scripted,
}

/// Trait for upstream data providers.
///
/// Implementations handle one request; retrying is the caller's job
/// (see `data::retry::RetryPolicy`).
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch observations for one ticker over a half-open window.
    fn fetch(&self, ticker: &str, window: FetchWindow) -> Result<FetchResult, DataError>;

    /// Whether the provider is currently accepting requests (not banned).
    fn is_available(&self) -> bool;
}

/// Progress callback for multi-ticker fetches.
pub trait FetchProgress: Send + Sync {
    /// Called when starting to fetch a ticker.
    fn on_start(&self, ticker: &str, index: usize, total: usize);

    /// Called before sleeping ahead of another attempt.
    fn on_retry(&self, ticker: &str, attempt: u32, error: &DataError, delay: Duration);

    /// Called when a ticker completes, successfully or not.
    fn on_complete(&self, ticker: &str, index: usize, total: usize, error: Option<&DataError>);

    /// Called when the whole batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that writes through `tracing`.
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, ticker: &str, index: usize, total: usize) {
        tracing::info!("[{}/{}] fetching {ticker}", index + 1, total);
    }

    fn on_retry(&self, ticker: &str, attempt: u32, error: &DataError, delay: Duration) {
        tracing::warn!(
            ticker,
            attempt,
            "fetch failed: {error}; retrying in {:.1}s",
            delay.as_secs_f64()
        );
    }

    fn on_complete(&self, ticker: &str, _index: usize, _total: usize, error: Option<&DataError>) {
        match error {
            None => tracing::info!("  ok: {ticker}"),
            Some(e) => tracing::warn!("  skipped: {ticker}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!("fetch complete: {succeeded}/{total} succeeded, {failed} skipped");
    }
}

/// Progress reporter that discards every event.
pub struct SilentProgress;

impl FetchProgress for SilentProgress {
    fn on_start(&self, _ticker: &str, _index: usize, _total: usize) {}
    fn on_retry(&self, _ticker: &str, _attempt: u32, _error: &DataError, _delay: Duration) {}
    fn on_complete(&self, _ticker: &str, _index: usize, _total: usize, _error: Option<&DataError>) {}
    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bans_and_auth_are_not_retryable() {
        assert!(!DataError::CircuitBreakerTripped.is_retryable());
        assert!(!DataError::AuthenticationRequired("key".into()).is_retryable());
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(DataError::NetworkUnreachable("timeout".into()).is_retryable());
        assert!(DataError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(DataError::EmptyResult { ticker: "SPY".into() }.is_retryable());
    }

    #[test]
    fn exhausted_error_mentions_cause() {
        let err = DataError::RetriesExhausted {
            ticker: "SPY".into(),
            attempts: 3,
            last: Box::new(DataError::EmptyResult { ticker: "SPY".into() }),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("no observations"));
    }
}

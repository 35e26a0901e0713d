//! FRED (Federal Reserve Economic Data) provider.
//!
//! One series per request via `series/observations`. FRED reports missing
//! observations as the string ".", which becomes a missing cell.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, DataProvider, DataSource, FetchResult, Observation};
use crate::calendar::{format_date, parse_date};
use crate::merge::FetchWindow;
use crate::table::ColumnKey;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org/fred";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<RawObservation>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    date: String,
    value: String,
}

pub struct FredProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    api_key: String,
    base_url: String,
}

impl FredProvider {
    pub fn new(
        api_key: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
        timeout: Duration,
    ) -> Result<Self, DataError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DataError::AuthenticationRequired(
                "FRED API key is empty".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Client(e.to_string()))?;

        Ok(Self {
            client,
            circuit_breaker,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn observations_url(&self, series_id: &str, window: FetchWindow) -> String {
        // FRED's observation_end is inclusive.
        let last = window.last_day().unwrap_or(window.start);
        format!(
            "{}/series/observations?series_id={series_id}&api_key={}&file_type=json\
             &observation_start={}&observation_end={}",
            self.base_url,
            self.api_key,
            format_date(window.start),
            format_date(last),
        )
    }

    fn parse_response(
        series_id: &str,
        window: FetchWindow,
        resp: ObservationsResponse,
    ) -> Result<Vec<Observation>, DataError> {
        if let Some(msg) = resp.error_message {
            return Err(if msg.contains("does not exist") {
                DataError::SymbolNotFound {
                    ticker: series_id.to_string(),
                }
            } else {
                DataError::ResponseFormatChanged(msg)
            });
        }

        let mut out = Vec::with_capacity(resp.observations.len());
        for raw in resp.observations {
            let date = parse_date(&raw.date).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("bad observation date '{}'", raw.date))
            })?;
            if !window.contains(date) {
                continue;
            }
            let value = match raw.value.trim() {
                "." | "" => None,
                v => Some(v.parse::<f64>().map_err(|_| {
                    DataError::ResponseFormatChanged(format!(
                        "non-numeric value '{v}' for {series_id} on {date}"
                    ))
                })?),
            };
            out.push(Observation {
                date,
                values: vec![value],
            });
        }
        Ok(out)
    }
}

impl DataProvider for FredProvider {
    fn name(&self) -> &str {
        "fred"
    }

    fn fetch(&self, series_id: &str, window: FetchWindow) -> Result<FetchResult, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let url = self.observations_url(series_id, window);
        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                self.circuit_breaker.record_failure();
            }
            // Keep the key out of logs.
            DataError::NetworkUnreachable(e.without_url().to_string())
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            self.circuit_breaker.trip();
            return Err(DataError::CircuitBreakerTripped);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            return Err(DataError::RateLimited {
                retry_after_secs: 60,
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DataError::AuthenticationRequired(
                "FRED rejected the API key".into(),
            ));
        }
        if status.is_server_error() {
            self.circuit_breaker.record_failure();
            return Err(DataError::Other(format!("HTTP {status} for {series_id}")));
        }

        // FRED reports bad series ids as 400 with a JSON error body.
        let body: ObservationsResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!(
                "failed to parse response for {series_id}: {}",
                e.without_url()
            ))
        })?;

        let observations = Self::parse_response(series_id, window, body)?;
        self.circuit_breaker.record_success();

        Ok(FetchResult {
            ticker: series_id.to_string(),
            columns: vec![ColumnKey::bare(series_id)],
            observations,
            source: DataSource::Fred,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

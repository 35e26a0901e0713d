//! Pipeline configuration, loaded from `zap.toml`.
//!
//! Every field has a default, so a missing file (or an empty one) gives a
//! working configuration rooted at `./data`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use zap_core::align::AxisPolicy;
use zap_core::data::{RetryPolicy, TableStore};
use zap_core::merge::{CleanOptions, FetchOptions};
use zap_core::prune::{FOUND_DATES_FILE, GAP_COUNT_FILE};
use zap_core::stats::StatsConfig;

pub const DEFAULT_CONFIG_FILE: &str = "zap.toml";
pub const FRED_API_KEY_ENV: &str = "FRED_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {message}")]
    Toml { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no FRED API key: set `fred_api_key` in the config or {FRED_API_KEY_ENV}")]
    MissingApiKey,
}

/// Names of the persisted tables and side files, relative to `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileNames {
    pub market_data: String,
    pub economic_data: String,
    pub market_stats: String,
    pub economic_stats: String,
    pub ta_data: String,
    pub batch: String,
    pub gap_count: String,
    pub found_dates: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            market_data: "market_data.csv".into(),
            economic_data: "economic_data.csv".into(),
            market_stats: "market_stats.csv".into(),
            economic_stats: "economic_stats.csv".into(),
            ta_data: "ta_data.csv".into(),
            batch: "batch.csv".into(),
            gap_count: GAP_COUNT_FILE.into(),
            found_dates: FOUND_DATES_FILE.into(),
        }
    }
}

impl FileNames {
    /// Every table the pipeline writes, in pipeline order.
    pub fn tables(&self) -> Vec<&str> {
        vec![
            &self.market_data,
            &self.market_stats,
            &self.ta_data,
            &self.economic_data,
            &self.economic_stats,
            &self.batch,
        ]
    }
}

/// Per-group fetch and cleaning settings. Unset fields take the group's
/// defaults: see `PipelineConfig::market_group` and `economic_group`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Rows whose fraction of missing cells exceeds this are dropped before
    /// filling. `1.0` keeps every row. Default 0.25 for market data, 1.0
    /// for economic data.
    pub gap_threshold: Option<f64>,
    pub axis: AxisPolicy,
    /// Retry identifiers that answer with no rows. Default on for market
    /// data, off for economic data.
    pub retry_empty: Option<bool>,
}

impl GroupConfig {
    fn or_defaults(self, defaults: FetchOptions, gap_threshold: f64) -> Self {
        Self {
            gap_threshold: Some(self.gap_threshold.unwrap_or(gap_threshold)),
            retry_empty: Some(self.retry_empty.unwrap_or(defaults.retry_empty)),
            ..self
        }
    }

    pub fn clean_options(&self) -> CleanOptions {
        CleanOptions {
            max_missing_fraction: self.gap_threshold.filter(|t| *t < 1.0),
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            axis: self.axis,
            retry_empty: self.retry_empty.unwrap_or(true),
        }
    }
}

/// Which derived tables the row-pruning steps rewrite.
///
/// An empty list selects the default targets. The fetched history tables are
/// not in the defaults: they are appended to on every run, and trimming them
/// would shorten the history each day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    pub trim: Vec<String>,
    pub filter_dates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Tables joined into the batch, in column order. Empty: every derived
    /// and fetched table.
    pub inputs: Vec<String>,
    /// Table whose dates become the batch rows. Default: the TA table, which
    /// is the one the gap trim applies to.
    pub axis: Option<String>,
    /// Columns removed from the assembled batch.
    pub drop_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    /// Ticker configuration, `.toml` or `.json`.
    pub tickers: PathBuf,
    /// First date fetched when a table has no history yet.
    pub epoch: NaiveDate,
    pub http_timeout_secs: u64,
    pub fred_api_key: Option<String>,
    /// Worker threads for per-file steps; 0 uses available parallelism.
    pub threads: usize,
    pub market: GroupConfig,
    pub economic: GroupConfig,
    pub files: FileNames,
    pub retry: RetryPolicy,
    pub stats: StatsConfig,
    pub prune: PruneConfig,
    pub batch: BatchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tickers: PathBuf::from("tickers.toml"),
            epoch: NaiveDate::from_ymd_opt(2007, 8, 1).unwrap_or_default(),
            http_timeout_secs: 30,
            fred_api_key: None,
            threads: 0,
            market: GroupConfig::default(),
            economic: GroupConfig::default(),
            files: FileNames::default(),
            retry: RetryPolicy::default(),
            stats: StatsConfig::default(),
            prune: PruneConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path`. A file that does not exist yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no pipeline config; using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Toml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Toml {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (group, g) in [("market", &self.market), ("economic", &self.economic)] {
            if let Some(t) = g.gap_threshold.filter(|t| !(0.0..=1.0).contains(t)) {
                return Err(ConfigError::Invalid(format!(
                    "{group}.gap_threshold must be within 0..=1, got {t}"
                )));
            }
        }
        if self.stats.window < 2 {
            return Err(ConfigError::Invalid(format!(
                "stats.window must be at least 2, got {}",
                self.stats.window
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be positive".into()));
        }
        let f = &self.files;
        let names = [
            &f.market_data,
            &f.economic_data,
            &f.market_stats,
            &f.economic_stats,
            &f.ta_data,
            &f.batch,
            &f.gap_count,
            &f.found_dates,
        ];
        if let Some(empty) = names.iter().position(|n| n.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("files entry #{} is empty", empty + 1)));
        }
        Ok(())
    }

    /// `[market]` with its gap threshold resolved.
    pub fn market_group(&self) -> GroupConfig {
        self.market
            .or_defaults(FetchOptions::market(), CleanOptions::MARKET_GAP_THRESHOLD)
    }

    /// `[economic]` with its gap threshold resolved.
    pub fn economic_group(&self) -> GroupConfig {
        self.economic.or_defaults(FetchOptions::economic(), 1.0)
    }

    pub fn store(&self) -> TableStore {
        TableStore::new(&self.data_dir)
    }

    pub fn gap_count_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.gap_count)
    }

    pub fn found_dates_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.found_dates)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Resolved size of the per-file worker pool.
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// FRED key from the config, falling back to the environment.
    pub fn fred_api_key(&self) -> Result<String, ConfigError> {
        self.fred_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(FRED_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn trim_targets(&self) -> Vec<String> {
        if self.prune.trim.is_empty() {
            vec![self.files.market_stats.clone(), self.files.ta_data.clone()]
        } else {
            self.prune.trim.clone()
        }
    }

    pub fn date_filter_targets(&self) -> Vec<String> {
        if self.prune.filter_dates.is_empty() {
            vec![self.files.economic_stats.clone()]
        } else {
            self.prune.filter_dates.clone()
        }
    }

    pub fn batch_inputs(&self) -> Vec<String> {
        if self.batch.inputs.is_empty() {
            let f = &self.files;
            vec![
                f.market_data.clone(),
                f.market_stats.clone(),
                f.ta_data.clone(),
                f.economic_data.clone(),
                f.economic_stats.clone(),
            ]
        } else {
            self.batch.inputs.clone()
        }
    }

    pub fn batch_axis(&self) -> String {
        self.batch
            .axis
            .clone()
            .unwrap_or_else(|| self.files.ta_data.clone())
    }
}

//! Pipeline steps wired to files.
//!
//! Each step loads the tables it needs from the configured data directory,
//! runs one `zap-core` transform, and writes its result back. Steps return a
//! small summary for the CLI and the run log.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use zap_core::calendar::business_days;
use zap_core::data::{
    CircuitBreaker, DataError, DataProvider, FetchProgress, FredProvider, StoreError, TableStatus,
    TickerConfig, TickerConfigError, YahooProvider,
};
use zap_core::indicators::{default_indicators, technical_analysis};
use zap_core::merge::{
    clean_and_fill, determine_fetch_window, fetch_and_align, merge, FetchWindow, WindowDecision,
};
use zap_core::prune::{self, PruneError};
use zap_core::stats::{economic_stats, market_stats, StatsReport};
use zap_core::table::{SeriesTable, TableError};

use crate::batch::{assemble, BatchError};
use crate::config::{ConfigError, GroupConfig, PipelineConfig};
use crate::pool::{for_each_file, PoolReport};

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tickers(#[from] TickerConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Prune(#[from] PruneError),

    #[error(transparent)]
    Provider(#[from] DataError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("no {group} identifiers configured in {path}")]
    NoTickers { group: &'static str, path: PathBuf },
}

// ── Fetch ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub file: String,
    pub window: FetchWindow,
    pub up_to_date: bool,
    pub fetched: Vec<String>,
    /// Answered with no rows in the window; not a failure.
    pub empty: Vec<String>,
    pub skipped: Vec<String>,
    pub aborted: bool,
    pub rows_added: usize,
    pub total_rows: usize,
}

pub fn load_tickers(config: &PipelineConfig) -> Result<TickerConfig, StepError> {
    Ok(TickerConfig::from_file(&config.tickers)?)
}

/// Yahoo Finance provider built from the pipeline config.
pub fn market_provider(config: &PipelineConfig) -> Result<YahooProvider, StepError> {
    let breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(YahooProvider::new(breaker, config.http_timeout())?)
}

/// FRED provider; fails up front when no API key is available.
pub fn economic_provider(config: &PipelineConfig) -> Result<FredProvider, StepError> {
    let key = config.fred_api_key()?;
    let breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(FredProvider::new(key, breaker, config.http_timeout())?)
}

/// Bring one persisted table up to `day` (exclusive).
///
/// When every ticker fails the table is left untouched.
pub fn update_table(
    config: &PipelineConfig,
    file: &str,
    group: &GroupConfig,
    provider: &dyn DataProvider,
    tickers: &[String],
    day: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<FetchSummary, StepError> {
    let store = config.store();
    let existing = store.load(file)?;
    let before = existing.as_ref().map_or(0, SeriesTable::len);

    let mut summary = FetchSummary {
        file: file.to_string(),
        window: FetchWindow::new(day, day),
        up_to_date: false,
        fetched: Vec::new(),
        empty: Vec::new(),
        skipped: Vec::new(),
        aborted: false,
        rows_added: 0,
        total_rows: before,
    };

    let window = match determine_fetch_window(existing.as_ref(), day, config.epoch) {
        WindowDecision::Fetch(window) => window,
        WindowDecision::UpToDate { window } => {
            tracing::info!(file, "already up to date; next fetch starts {}", window.start);
            summary.window = window;
            summary.up_to_date = true;
            return Ok(summary);
        }
    };
    summary.window = window;
    if business_days(window.start, window.end).is_empty() {
        // The window start does not move, so these dates are fetched with
        // the next window that holds a trading day.
        tracing::info!(file, "no business day in [{}, {}); nothing to fetch", window.start, window.end);
        summary.up_to_date = true;
        return Ok(summary);
    }
    tracing::info!(
        file,
        provider = provider.name(),
        "fetching {} identifiers for [{}, {})",
        tickers.len(),
        window.start,
        window.end
    );

    let outcome = fetch_and_align(
        provider,
        tickers,
        window,
        group.fetch_options(),
        &config.retry,
        progress,
    )?;
    summary.fetched = outcome.fetched.clone();
    summary.empty = outcome.empty.clone();
    summary.skipped = outcome.skipped.iter().map(|(t, _)| t.clone()).collect();
    summary.aborted = outcome.aborted;
    if outcome.aborted {
        tracing::error!(file, "provider stopped accepting requests; remaining identifiers skipped");
    }
    if outcome.fetched.is_empty() {
        if outcome.skipped.is_empty() {
            tracing::info!(file, "no new observations; table left unchanged");
        } else {
            tracing::warn!(file, "nothing fetched; table left unchanged");
        }
        return Ok(summary);
    }

    let cleaned = clean_and_fill(outcome.table, &group.clean_options())?;
    let merged = match existing {
        Some(existing) => merge(&existing, &cleaned)?,
        None => cleaned,
    };
    store.save(file, &merged)?;

    summary.total_rows = merged.len();
    summary.rows_added = merged.len().saturating_sub(before);
    tracing::info!(file, added = summary.rows_added, total = summary.total_rows, "saved");
    Ok(summary)
}

pub fn fetch_market(
    config: &PipelineConfig,
    tickers: &TickerConfig,
    provider: &dyn DataProvider,
    day: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<FetchSummary, StepError> {
    let ids = tickers.market_tickers();
    if ids.is_empty() {
        return Err(StepError::NoTickers {
            group: "market_data",
            path: config.tickers.clone(),
        });
    }
    update_table(
        config,
        &config.files.market_data,
        &config.market_group(),
        provider,
        &ids,
        day,
        progress,
    )
}

pub fn fetch_economic(
    config: &PipelineConfig,
    tickers: &TickerConfig,
    provider: &dyn DataProvider,
    day: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<FetchSummary, StepError> {
    let ids = tickers.economic_series();
    if ids.is_empty() {
        return Err(StepError::NoTickers {
            group: "economic_data",
            path: config.tickers.clone(),
        });
    }
    update_table(
        config,
        &config.files.economic_data,
        &config.economic_group(),
        provider,
        &ids,
        day,
        progress,
    )
}

// ── Derived tables ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DeriveSummary {
    pub file: String,
    pub rows: usize,
    pub columns: usize,
    pub computed: Vec<String>,
    pub skipped: Vec<String>,
}

fn save_stats(
    config: &PipelineConfig,
    file: &str,
    report: StatsReport,
) -> Result<DeriveSummary, StepError> {
    for skip in &report.skipped {
        tracing::warn!(file, "skipped: {skip}");
    }
    config.store().save(file, &report.table)?;
    Ok(DeriveSummary {
        file: file.to_string(),
        rows: report.table.len(),
        columns: report.table.width(),
        computed: report.computed,
        skipped: report.skipped.iter().map(ToString::to_string).collect(),
    })
}

pub fn run_market_stats(config: &PipelineConfig) -> Result<DeriveSummary, StepError> {
    let table = config.store().load_required(&config.files.market_data)?;
    let report = market_stats(&table, &config.stats)?;
    save_stats(config, &config.files.market_stats, report)
}

pub fn run_economic_stats(config: &PipelineConfig) -> Result<DeriveSummary, StepError> {
    let table = config.store().load_required(&config.files.economic_data)?;
    let report = economic_stats(&table, &config.stats)?;
    save_stats(config, &config.files.economic_stats, report)
}

pub fn run_technical_analysis(config: &PipelineConfig) -> Result<DeriveSummary, StepError> {
    let store = config.store();
    let table = store.load_required(&config.files.market_data)?;
    let report = technical_analysis(&table, &default_indicators())?;
    store.save(&config.files.ta_data, &report.table)?;
    Ok(DeriveSummary {
        file: config.files.ta_data.clone(),
        rows: report.table.len(),
        columns: report.table.width(),
        computed: report.computed,
        skipped: report
            .skipped
            .into_iter()
            .map(|(ticker, missing)| format!("{ticker} (missing {})", missing.join(", ")))
            .collect(),
    })
}

// ── Pruning ─────────────────────────────────────────────────────────

/// Count the TA table's leading incomplete rows and write the side file.
pub fn run_gap_count(config: &PipelineConfig) -> Result<usize, StepError> {
    let table = config.store().load_required(&config.files.ta_data)?;
    let count = prune::leading_gap_count(&table);
    prune::write_gap_count(&config.gap_count_path(), count)?;
    tracing::info!(count, "leading rows with missing values");
    Ok(count)
}

/// Trim the recorded number of leading rows from every trim target.
pub fn run_trim(config: &PipelineConfig) -> Result<PoolReport, StepError> {
    trim_files(config, &config.trim_targets())
}

/// Remove the counted leading rows from `files`.
pub fn trim_files(config: &PipelineConfig, files: &[String]) -> Result<PoolReport, StepError> {
    let count = prune::read_gap_count(&config.gap_count_path())?;
    let store = config.store();
    for_each_file("trim", files, config.worker_threads(), |file| {
        let mut table = store.load_required(file)?;
        let removed = prune::trim_leading_rows(&mut table, count);
        store.save(file, &table)?;
        Ok(removed)
    })
}

/// Write the market table's dates to the date-list side file.
pub fn run_find_dates(config: &PipelineConfig) -> Result<usize, StepError> {
    let table = config.store().load_required(&config.files.market_data)?;
    let dates = prune::date_list(&table);
    prune::write_date_list(&config.found_dates_path(), &dates)?;
    tracing::info!(dates = dates.len(), "date list written");
    Ok(dates.len())
}

/// Keep only listed dates in every date-filter target.
pub fn run_prune_dates(config: &PipelineConfig) -> Result<PoolReport, StepError> {
    let dates = prune::read_date_list(&config.found_dates_path())?;
    let store = config.store();
    for_each_file(
        "prune-dates",
        &config.date_filter_targets(),
        config.worker_threads(),
        |file| {
            let mut table = store.load_required(file)?;
            let removed = prune::retain_dates(&mut table, &dates);
            store.save(file, &table)?;
            Ok(removed)
        },
    )
}

// ── Batch ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub file: String,
    pub rows: usize,
    pub columns: usize,
    pub inputs: Vec<String>,
    pub dropped: Vec<String>,
    pub unknown_drops: Vec<String>,
}

pub fn run_batch(config: &PipelineConfig) -> Result<BatchSummary, StepError> {
    let store = config.store();
    let inputs = config.batch_inputs();
    let tables = inputs
        .iter()
        .map(|f| Ok((f.clone(), store.load_required(f)?)))
        .collect::<Result<Vec<_>, StepError>>()?;

    let axis_file = config.batch_axis();
    let axis = match tables.iter().find(|(name, _)| *name == axis_file) {
        Some((_, table)) => table.dates(),
        None => store.load_required(&axis_file)?.dates(),
    };

    let mut batch = assemble(&axis, &tables)?;
    let unknown = prune::drop_columns(&mut batch, &config.batch.drop_columns);
    let dropped = config
        .batch
        .drop_columns
        .iter()
        .filter(|c| !unknown.contains(c))
        .cloned()
        .collect();
    store.save(&config.files.batch, &batch)?;
    tracing::info!(
        file = %config.files.batch,
        rows = batch.len(),
        columns = batch.width(),
        "batch written"
    );

    Ok(BatchSummary {
        file: config.files.batch.clone(),
        rows: batch.len(),
        columns: batch.width(),
        inputs,
        dropped,
        unknown_drops: unknown,
    })
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub data_dir: PathBuf,
    pub tables: Vec<TableStatus>,
    pub gap_count: Option<usize>,
    pub found_dates: Option<usize>,
}

pub fn status(config: &PipelineConfig) -> StatusReport {
    let tables = config.store().status(&config.files.tables());
    StatusReport {
        data_dir: config.data_dir.clone(),
        tables,
        gap_count: prune::read_gap_count(&config.gap_count_path()).ok(),
        found_dates: prune::read_date_list(&config.found_dates_path())
            .ok()
            .map(|d| d.len()),
    }
}

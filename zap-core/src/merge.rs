//! Incremental Series Merger.
//!
//! Brings a persisted Series Table up to date: decide which dates are missing,
//! fetch them ticker by ticker under a bounded retry policy, clean and fill the
//! new block, then fold it into the existing history with last-write-wins on
//! repeated dates. Everything here is deterministic except `fetch_and_align`,
//! which talks to the provider.

use crate::align::{align_results, AxisPolicy};
use crate::data::provider::{DataError, DataProvider, FetchProgress, FetchResult};
use crate::data::retry::RetryPolicy;
use crate::table::{Row, SeriesTable, TableError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Half-open date range `[start, end)` still to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Last date inside the window, for providers whose APIs take an
    /// inclusive end.
    pub fn last_day(&self) -> Option<NaiveDate> {
        if self.is_empty() {
            None
        } else {
            self.end.pred_opt()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    Fetch(FetchWindow),
    /// The table already covers everything before the requested end.
    UpToDate { window: FetchWindow },
}

/// Work out the fetch window from the persisted table (if any).
///
/// Without history the window opens at `epoch`; otherwise it opens the day
/// after the most recent stored date.
pub fn determine_fetch_window(
    existing: Option<&SeriesTable>,
    requested_end: NaiveDate,
    epoch: NaiveDate,
) -> WindowDecision {
    let start = existing
        .and_then(|t| t.last_date())
        .and_then(|last| last.succ_opt())
        .unwrap_or(epoch);
    let window = FetchWindow::new(start, requested_end);
    if window.is_empty() {
        WindowDecision::UpToDate { window }
    } else {
        WindowDecision::Fetch(window)
    }
}

/// Result of a multi-ticker fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub table: SeriesTable,
    pub fetched: Vec<String>,
    /// Answered without error but with no rows in the window.
    pub empty: Vec<String>,
    pub skipped: Vec<(String, DataError)>,
    /// The provider stopped accepting requests part-way through.
    pub aborted: bool,
}

impl FetchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// How one group of tickers is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    pub axis: AxisPolicy,
    /// Treat a response with no rows as a transient failure and retry it.
    /// Off: the ticker is recorded as empty after one call.
    pub retry_empty: bool,
}

impl FetchOptions {
    /// Yahoo answers transient trouble with an empty chart.
    pub fn market() -> Self {
        Self {
            axis: AxisPolicy::Union,
            retry_empty: true,
        }
    }

    /// A series with no new observation is normal for monthly releases.
    pub fn economic() -> Self {
        Self {
            axis: AxisPolicy::Union,
            retry_empty: false,
        }
    }
}

/// Fetch every ticker over `window` and align the results into one table.
///
/// Each ticker gets its own retry budget. A ticker that exhausts it is
/// skipped; once the provider refuses requests outright the remaining
/// tickers are skipped without being tried.
pub fn fetch_and_align(
    provider: &dyn DataProvider,
    tickers: &[String],
    window: FetchWindow,
    options: FetchOptions,
    retry: &RetryPolicy,
    progress: &dyn FetchProgress,
) -> Result<FetchOutcome, TableError> {
    let total = tickers.len();
    let mut results: Vec<FetchResult> = Vec::with_capacity(total);
    let mut fetched = Vec::new();
    let mut empty = Vec::new();
    let mut skipped: Vec<(String, DataError)> = Vec::new();
    let mut aborted = false;

    for (i, ticker) in tickers.iter().enumerate() {
        if !provider.is_available() {
            for t in &tickers[i..] {
                skipped.push((t.clone(), DataError::CircuitBreakerTripped));
            }
            aborted = true;
            break;
        }

        progress.on_start(ticker, i, total);
        let result = retry.run(
            ticker,
            |_| {
                let r = provider.fetch(ticker, window)?;
                if r.is_empty() && options.retry_empty {
                    return Err(DataError::EmptyResult {
                        ticker: ticker.clone(),
                    });
                }
                Ok(r)
            },
            |attempt, err, delay| progress.on_retry(ticker, attempt, err, delay),
        );

        match result {
            Ok(r) if r.is_empty() => {
                progress.on_complete(ticker, i, total, None);
                tracing::info!(ticker = %ticker, "no observations in [{}, {})", window.start, window.end);
                empty.push(ticker.clone());
            }
            Ok(r) => {
                progress.on_complete(ticker, i, total, None);
                fetched.push(ticker.clone());
                results.push(r);
            }
            Err(e) => {
                progress.on_complete(ticker, i, total, Some(&e));
                skipped.push((ticker.clone(), e));
            }
        }
    }

    progress.on_batch_complete(fetched.len(), skipped.len(), total);

    let table = align_results(&results, options.axis, window)?;
    Ok(FetchOutcome {
        table,
        fetched,
        empty,
        skipped,
        aborted,
    })
}

/// Options for `clean_and_fill`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CleanOptions {
    /// Rows with a larger fraction of missing cells are dropped before
    /// filling. `None` keeps every row.
    pub max_missing_fraction: Option<f64>,
}

impl CleanOptions {
    pub const MARKET_GAP_THRESHOLD: f64 = 0.25;

    pub fn market() -> Self {
        Self {
            max_missing_fraction: Some(Self::MARKET_GAP_THRESHOLD),
        }
    }

    pub fn economic() -> Self {
        Self::default()
    }
}

/// Prune sparse rows, fill the remaining gaps, and drop what stays empty.
///
/// Fill order per column: time-weighted interpolation between known values,
/// then forward fill, then backward fill. Every column left afterwards has no
/// missing cells.
pub fn clean_and_fill(
    mut raw: SeriesTable,
    options: &CleanOptions,
) -> Result<SeriesTable, TableError> {
    raw.dedup_keep_last();

    if let Some(threshold) = options.max_missing_fraction {
        raw.retain_rows(|r| r.missing_fraction() <= threshold);
    }

    let dates = raw.dates();
    let columns = raw.columns().to_vec();
    for name in &columns {
        let Some(mut values) = raw.column(name) else {
            continue;
        };
        interpolate_time(&dates, &mut values);
        forward_fill(&mut values);
        backward_fill(&mut values);
        raw.set_column(name, values)?;
    }

    raw.drop_empty_columns();
    raw.retain_rows(|r| !r.is_empty());
    Ok(raw)
}

/// Linear interpolation weighted by calendar-day distance, interior gaps only.
pub fn interpolate_time(dates: &[NaiveDate], values: &mut [Option<f64>]) {
    let known: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();

    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b - a < 2 {
            continue;
        }
        let (Some(va), Some(vb)) = (values[a], values[b]) else {
            continue;
        };
        let span = (dates[b] - dates[a]).num_days() as f64;
        for k in (a + 1)..b {
            let t = if span > 0.0 {
                (dates[k] - dates[a]).num_days() as f64 / span
            } else {
                0.0
            };
            values[k] = Some(va + (vb - va) * t);
        }
    }
}

pub fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for v in values.iter_mut() {
        match v {
            Some(x) => last = Some(*x),
            None => *v = last,
        }
    }
}

pub fn backward_fill(values: &mut [Option<f64>]) {
    let mut next = None;
    for v in values.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }
}

/// Fold freshly cleaned rows into the existing history.
///
/// Columns are the union of both tables (existing order first). On a repeated
/// date the incoming row replaces the stored one. The result is sorted by
/// date with unique dates, and columns that ended up entirely empty are
/// removed.
pub fn merge(existing: &SeriesTable, incoming: &SeriesTable) -> Result<SeriesTable, TableError> {
    let mut columns: Vec<String> = existing.columns().to_vec();
    for c in incoming.columns() {
        if !columns.contains(c) {
            columns.push(c.clone());
        }
    }
    let position: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let mut by_date: BTreeMap<NaiveDate, Row> = BTreeMap::new();
    for table in [existing, incoming] {
        let slots: Vec<usize> = table.columns().iter().map(|c| position[c.as_str()]).collect();
        for row in table.rows() {
            let mut values = vec![None; columns.len()];
            for (slot, v) in slots.iter().zip(&row.values) {
                values[*slot] = *v;
            }
            by_date.insert(row.date, Row::new(row.date, values));
        }
    }

    let mut merged = SeriesTable::with_rows(columns, by_date.into_values().collect())?;
    merged.drop_empty_columns();
    Ok(merged)
}

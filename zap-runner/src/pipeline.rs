//! The daily run: every step in order, with the statistics branch and the
//! technical-analysis branch forked onto two threads after the market fetch.
//!
//! ```text
//! fetch-market ──┬── market-stats ─────────────┬── trim ── find-dates ── fetch-economic
//!                └── ta ── gap-count ──────────┘        ── economic-stats ── prune-dates ── batch
//! ```
//!
//! A failing step is logged and recorded; later steps still run against
//! whatever is on disk.

use chrono::NaiveDate;
use serde::Serialize;
use std::thread;

use zap_core::data::{DataProvider, FetchProgress, TickerConfig};

use crate::config::PipelineConfig;
use crate::pool::PoolReport;
use crate::steps::{self, StepError};

/// Upstream sources for one run.
pub struct Providers<'a> {
    pub market: &'a dyn DataProvider,
    pub economic: &'a dyn DataProvider,
    pub progress: &'a dyn FetchProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: &'static str,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub day: Option<NaiveDate>,
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    pub fn failed(&self) -> Vec<&StepRecord> {
        self.steps.iter().filter(|s| !s.ok).collect()
    }

    fn record<T>(
        &mut self,
        step: &'static str,
        result: Result<T, StepError>,
        detail: impl Fn(&T) -> String,
    ) {
        let record = match result {
            Ok(value) => {
                let detail = detail(&value);
                tracing::info!(step, "{detail}");
                StepRecord {
                    step,
                    ok: true,
                    detail,
                }
            }
            Err(e) => {
                tracing::error!(step, "failed: {e}");
                StepRecord {
                    step,
                    ok: false,
                    detail: e.to_string(),
                }
            }
        };
        self.steps.push(record);
    }

    fn skip(&mut self, step: &'static str, reason: &str) {
        tracing::warn!(step, "skipped: {reason}");
        self.steps.push(StepRecord {
            step,
            ok: false,
            detail: format!("skipped: {reason}"),
        });
    }

    fn record_pool(&mut self, step: &'static str, result: Result<PoolReport, StepError>) {
        match result {
            Ok(report) if !report.is_success() => {
                let failed: Vec<String> = report
                    .failed
                    .iter()
                    .map(|(f, e)| format!("{f}: {e}"))
                    .collect();
                tracing::error!(step, "{} file(s) failed", failed.len());
                self.steps.push(StepRecord {
                    step,
                    ok: false,
                    detail: failed.join("; "),
                });
            }
            other => self.record(step, other, |r| {
                let rows: usize = r.succeeded.iter().map(|(_, n)| n).sum();
                format!("{} file(s), {rows} row(s) removed", r.succeeded.len())
            }),
        }
    }
}

fn describe_fetch(s: &steps::FetchSummary) -> String {
    if s.up_to_date {
        return format!("{} up to date", s.file);
    }
    format!(
        "{}: {} fetched, {} empty, {} skipped, {} row(s) added, {} total",
        s.file,
        s.fetched.len(),
        s.empty.len(),
        s.skipped.len(),
        s.rows_added,
        s.total_rows
    )
}

fn describe_derive(s: &steps::DeriveSummary) -> String {
    format!(
        "{}: {} x {}, {} skipped",
        s.file,
        s.rows,
        s.columns,
        s.skipped.len()
    )
}

/// What the forked branches left on disk.
#[derive(Debug, Default)]
struct Derived {
    /// A gap count was written from this run's TA table.
    gap_count: bool,
    /// Derived tables not rewritten this run. They still hold an earlier,
    /// already trimmed version.
    stale: Vec<String>,
}

/// Statistics and TA + gap count on two scoped threads; both finish before
/// this returns.
fn fork_derived(config: &PipelineConfig, report: &mut RunReport) -> Derived {
    let (stats, ta_and_gaps) = thread::scope(|s| {
        let stats = s.spawn(|| steps::run_market_stats(config));
        let ta = s.spawn(|| {
            let ta = steps::run_technical_analysis(config);
            let gaps = match &ta {
                Ok(_) => Some(steps::run_gap_count(config)),
                Err(_) => None,
            };
            (ta, gaps)
        });
        (stats.join(), ta.join())
    });

    let mut derived = Derived::default();
    let stats_ok = match stats {
        Ok(result) => {
            let ok = result.is_ok();
            report.record("market-stats", result, describe_derive);
            ok
        }
        Err(_) => {
            report.steps.push(panicked("market-stats"));
            false
        }
    };
    if !stats_ok {
        derived.stale.push(config.files.market_stats.clone());
    }

    match ta_and_gaps {
        Ok((ta, gaps)) => {
            if ta.is_err() {
                derived.stale.push(config.files.ta_data.clone());
            }
            report.record("ta", ta, describe_derive);
            match gaps {
                Some(gaps) => {
                    derived.gap_count = gaps.is_ok();
                    report.record("gap-count", gaps, |n| format!("{n} leading row(s)"));
                }
                None => report.skip("gap-count", "ta failed"),
            }
        }
        Err(_) => {
            derived.stale.push(config.files.ta_data.clone());
            report.steps.push(panicked("ta"));
        }
    }
    derived
}

/// Trim the targets rewritten in this run. A stale table was trimmed when it
/// was written; trimming it again would drop good rows.
fn trim_fresh(config: &PipelineConfig, derived: &Derived, report: &mut RunReport) {
    if !derived.gap_count {
        // A stale count would trim the wrong number of rows.
        report.skip("trim", "no fresh gap count");
        return;
    }
    let (fresh, stale): (Vec<String>, Vec<String>) = config
        .trim_targets()
        .into_iter()
        .partition(|file| !derived.stale.contains(file));
    for file in &stale {
        tracing::warn!(file = %file, "not rewritten this run; left as is");
    }
    if fresh.is_empty() {
        report.skip("trim", "no trim target was rewritten");
    } else {
        report.record_pool("trim", steps::trim_files(config, &fresh));
    }
}

fn panicked(step: &'static str) -> StepRecord {
    tracing::error!(step, "worker thread panicked");
    StepRecord {
        step,
        ok: false,
        detail: "worker thread panicked".into(),
    }
}

/// Run the whole pipeline for `day`.
pub fn run(
    config: &PipelineConfig,
    tickers: &TickerConfig,
    providers: &Providers<'_>,
    day: NaiveDate,
) -> RunReport {
    let mut report = RunReport {
        day: Some(day),
        steps: Vec::new(),
    };
    tracing::info!(%day, data_dir = %config.data_dir.display(), "pipeline run starting");

    report.record(
        "fetch-market",
        steps::fetch_market(config, tickers, providers.market, day, providers.progress),
        describe_fetch,
    );

    let derived = fork_derived(config, &mut report);
    trim_fresh(config, &derived, &mut report);
    report.record("find-dates", steps::run_find_dates(config), |n| {
        format!("{n} date(s)")
    });
    report.record(
        "fetch-economic",
        steps::fetch_economic(config, tickers, providers.economic, day, providers.progress),
        describe_fetch,
    );
    report.record(
        "economic-stats",
        steps::run_economic_stats(config),
        describe_derive,
    );
    report.record_pool("prune-dates", steps::run_prune_dates(config));
    report.record("batch", steps::run_batch(config), |b| {
        format!("{}: {} x {}", b.file, b.rows, b.columns)
    });

    let failed = report.failed().len();
    if failed == 0 {
        tracing::info!("pipeline run complete");
    } else {
        tracing::warn!(failed, "pipeline run finished with failures");
    }
    report
}

//! Rolling statistics per series.
//!
//! Market statistics are computed from each ticker's `Close` column; economic
//! statistics from every column. Each series is compacted to its non-missing
//! values, the kernels run on that compact series, and results are scattered
//! back onto the input table's dates. Kernels produce NaN where a value is
//! undefined (warm-up, zero variance); NaN becomes a missing cell on output.

use crate::table::{ColumnKey, Row, SeriesTable, TableError, MARKET_ATTRIBUTES};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    DailyReturn,
    LogReturn,
    CumulativeReturn,
    RollingMean,
    RollingStd,
    RollingVariance,
    RollingSkewness,
    RollingKurtosis,
    AutoCorrelation,
    ZScore,
    AnnualizedVolatility,
    SharpeRatio,
    MaxDrawdown,
    Ema,
    RollingBeta,
    RollingCorrelation,
}

impl Statistic {
    pub const MARKET: [Statistic; 16] = [
        Statistic::DailyReturn,
        Statistic::LogReturn,
        Statistic::CumulativeReturn,
        Statistic::RollingMean,
        Statistic::RollingStd,
        Statistic::RollingVariance,
        Statistic::RollingSkewness,
        Statistic::RollingKurtosis,
        Statistic::AutoCorrelation,
        Statistic::ZScore,
        Statistic::AnnualizedVolatility,
        Statistic::SharpeRatio,
        Statistic::MaxDrawdown,
        Statistic::Ema,
        Statistic::RollingBeta,
        Statistic::RollingCorrelation,
    ];

    pub const ECONOMIC: [Statistic; 11] = [
        Statistic::DailyReturn,
        Statistic::LogReturn,
        Statistic::CumulativeReturn,
        Statistic::RollingMean,
        Statistic::RollingStd,
        Statistic::RollingSkewness,
        Statistic::RollingKurtosis,
        Statistic::ZScore,
        Statistic::AnnualizedVolatility,
        Statistic::MaxDrawdown,
        Statistic::Ema,
    ];

    /// Column suffix in output tables.
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::DailyReturn => "Daily Return",
            Statistic::LogReturn => "Log Return",
            Statistic::CumulativeReturn => "Cumulative Return",
            Statistic::RollingMean => "Rolling Mean",
            Statistic::RollingStd => "Rolling Std",
            Statistic::RollingVariance => "Rolling Variance",
            Statistic::RollingSkewness => "Rolling Skewness",
            Statistic::RollingKurtosis => "Rolling Kurtosis",
            Statistic::AutoCorrelation => "Auto-Correlation",
            Statistic::ZScore => "Z-Score",
            Statistic::AnnualizedVolatility => "Annualized Volatility",
            Statistic::SharpeRatio => "Sharpe Ratio",
            Statistic::MaxDrawdown => "Max Drawdown",
            Statistic::Ema => "EMA",
            Statistic::RollingBeta => "Rolling Beta",
            Statistic::RollingCorrelation => "Rolling Correlation",
        }
    }

    fn needs_benchmark(&self) -> bool {
        matches!(self, Statistic::RollingBeta | Statistic::RollingCorrelation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub window: usize,
    pub periods_per_year: f64,
    /// Annual risk-free rate used by the Sharpe ratio.
    pub risk_free_rate: f64,
    /// Ticker whose `Close` returns drive beta and correlation.
    pub benchmark: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window: 30,
            periods_per_year: 252.0,
            risk_free_rate: 0.01,
            benchmark: "^GSPC".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("{series}: no valid values")]
    NoValidValues { series: String },

    #[error("{series}: {have} values, window needs {need}")]
    InsufficientHistory {
        series: String,
        have: usize,
        need: usize,
    },
}

/// Output of a statistics pass. Skipped series are reported, not fatal.
#[derive(Debug)]
pub struct StatsReport {
    pub table: SeriesTable,
    pub computed: Vec<String>,
    pub skipped: Vec<StatsError>,
}

/// A series reduced to its non-missing values, remembering where they sat.
struct Compact {
    rows: Vec<usize>,
    values: Vec<f64>,
}

impl Compact {
    fn from_column(column: &[Option<f64>]) -> Self {
        let mut rows = Vec::new();
        let mut values = Vec::new();
        for (i, v) in column.iter().enumerate() {
            if let Some(x) = v {
                rows.push(i);
                values.push(*x);
            }
        }
        Self { rows, values }
    }

    fn scatter(&self, computed: &[f64], len: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; len];
        for (row, v) in self.rows.iter().zip(computed) {
            out[*row] = v.is_finite().then_some(*v);
        }
        out
    }
}

/// Market statistics for every ticker that has a `Close` column.
pub fn market_stats(table: &SeriesTable, config: &StatsConfig) -> Result<StatsReport, TableError> {
    let closes: Vec<(String, String)> = table
        .columns()
        .iter()
        .filter_map(|header| {
            let key = ColumnKey::parse(header, &MARKET_ATTRIBUTES);
            (key.attribute.as_deref() == Some("Close")).then(|| (key.series, header.clone()))
        })
        .collect();

    let benchmark_header = ColumnKey::new(config.benchmark.as_str(), "Close").header();
    let benchmark_returns: Option<HashMap<NaiveDate, f64>> =
        table.column(&benchmark_header).map(|col| {
            let compact = Compact::from_column(&col);
            let returns = daily_returns(&compact.values);
            compact
                .rows
                .iter()
                .zip(returns)
                .map(|(row, r)| (table.rows()[*row].date, r))
                .collect()
        });
    if benchmark_returns.is_none() {
        tracing::warn!(
            benchmark = %config.benchmark,
            "benchmark not in table; skipping beta and correlation"
        );
    }

    let stats: Vec<Statistic> = Statistic::MARKET
        .into_iter()
        .filter(|s| !s.needs_benchmark() || benchmark_returns.is_some())
        .collect();

    let series: Vec<(String, Vec<Option<f64>>)> = closes
        .into_iter()
        .filter_map(|(ticker, header)| table.column(&header).map(|c| (ticker, c)))
        .collect();

    build_report(table, &series, &stats, config, benchmark_returns.as_ref())
}

/// Economic statistics for every column of the table.
pub fn economic_stats(table: &SeriesTable, config: &StatsConfig) -> Result<StatsReport, TableError> {
    let series: Vec<(String, Vec<Option<f64>>)> = table
        .columns()
        .iter()
        .filter_map(|c| table.column(c).map(|v| (c.clone(), v)))
        .collect();
    build_report(table, &series, &Statistic::ECONOMIC, config, None)
}

fn build_report(
    table: &SeriesTable,
    series: &[(String, Vec<Option<f64>>)],
    stats: &[Statistic],
    config: &StatsConfig,
    benchmark: Option<&HashMap<NaiveDate, f64>>,
) -> Result<StatsReport, TableError> {
    let dates = table.dates();
    let mut out = SeriesTable::with_rows(
        Vec::new(),
        dates.iter().map(|d| Row::new(*d, Vec::new())).collect(),
    )?;

    let mut computed = Vec::new();
    let mut skipped = Vec::new();
    for (name, column) in series {
        let compact = Compact::from_column(column);
        if let Err(e) = check_history(name, &compact, config.window) {
            tracing::warn!("skipping statistics: {e}");
            skipped.push(e);
            continue;
        }

        let bench: Option<Vec<f64>> = benchmark.map(|b| {
            compact
                .rows
                .iter()
                .map(|row| b.get(&dates[*row]).copied().unwrap_or(f64::NAN))
                .collect()
        });

        for stat in stats {
            let values = compute(*stat, &compact.values, bench.as_deref(), config);
            out.add_column(
                ColumnKey::new(name.as_str(), stat.name()).header(),
                compact.scatter(&values, dates.len()),
            )?;
        }
        computed.push(name.clone());
    }

    Ok(StatsReport {
        table: out,
        computed,
        skipped,
    })
}

fn check_history(series: &str, compact: &Compact, window: usize) -> Result<(), StatsError> {
    if compact.values.is_empty() {
        return Err(StatsError::NoValidValues {
            series: series.to_string(),
        });
    }
    let need = window.max(2);
    if compact.values.len() < need {
        return Err(StatsError::InsufficientHistory {
            series: series.to_string(),
            have: compact.values.len(),
            need,
        });
    }
    Ok(())
}

fn compute(stat: Statistic, x: &[f64], bench: Option<&[f64]>, cfg: &StatsConfig) -> Vec<f64> {
    let w = cfg.window.max(2);
    let annual = cfg.periods_per_year.sqrt();
    match stat {
        Statistic::DailyReturn => daily_returns(x),
        Statistic::LogReturn => log_returns(x),
        Statistic::CumulativeReturn => cumulative_returns(&daily_returns(x)),
        Statistic::RollingMean => rolling(x, w, mean),
        Statistic::RollingStd => rolling(x, w, sample_std),
        Statistic::RollingVariance => rolling(x, w, sample_var),
        Statistic::RollingSkewness => rolling(x, w, skewness),
        Statistic::RollingKurtosis => rolling(x, w, excess_kurtosis),
        Statistic::AutoCorrelation => rolling(x, w, |s| pearson(&s[1..], &s[..s.len() - 1])),
        Statistic::ZScore => z_scores(x),
        Statistic::AnnualizedVolatility => rolling(&daily_returns(x), w, sample_std)
            .into_iter()
            .map(|v| v * annual)
            .collect(),
        Statistic::SharpeRatio => {
            let r = daily_returns(x);
            let daily_rf = cfg.risk_free_rate / cfg.periods_per_year;
            let excess: Vec<f64> = r.iter().map(|v| v - daily_rf).collect();
            let mean_excess = rolling(&excess, w, mean);
            let vol = rolling(&r, w, sample_std);
            mean_excess
                .iter()
                .zip(&vol)
                .map(|(m, s)| ratio(*m, *s) * annual)
                .collect()
        }
        Statistic::MaxDrawdown => drawdowns(&daily_returns(x)),
        Statistic::Ema => ema(x, w),
        Statistic::RollingBeta => match bench {
            Some(b) => rolling_pair(&daily_returns(x), b, w, |a, b| {
                ratio(sample_cov(a, b), sample_var(b))
            }),
            None => vec![f64::NAN; x.len()],
        },
        Statistic::RollingCorrelation => match bench {
            Some(b) => rolling_pair(&daily_returns(x), b, w, pearson),
            None => vec![f64::NAN; x.len()],
        },
    }
}

// ── Kernels ─────────────────────────────────────────────────────────

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        f64::NAN
    } else {
        num / den
    }
}

pub fn daily_returns(x: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    for i in 1..x.len() {
        out[i] = x[i] / x[i - 1] - 1.0;
    }
    out
}

/// Non-finite results (zero or negative ratios) become NaN.
pub fn log_returns(x: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    for i in 1..x.len() {
        let v = (x[i] / x[i - 1]).ln();
        out[i] = if v.is_finite() { v } else { f64::NAN };
    }
    out
}

/// Running product of `1 + r` minus one, skipping undefined returns.
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
    let mut growth = 1.0;
    returns
        .iter()
        .map(|r| {
            if r.is_finite() {
                growth *= 1.0 + r;
                growth - 1.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Drawdown of the compounded return path from its running peak.
pub fn drawdowns(returns: &[f64]) -> Vec<f64> {
    let mut wealth = 1.0;
    let mut peak = f64::NEG_INFINITY;
    returns
        .iter()
        .map(|r| {
            if !r.is_finite() {
                return f64::NAN;
            }
            wealth *= 1.0 + r;
            peak = peak.max(wealth);
            wealth / peak - 1.0
        })
        .collect()
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first value.
pub fn ema(x: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(x.len());
    let mut prev = f64::NAN;
    for &v in x {
        prev = if prev.is_nan() { v } else { alpha * v + (1.0 - alpha) * prev };
        out.push(prev);
    }
    out
}

pub fn z_scores(x: &[f64]) -> Vec<f64> {
    let m = mean(x);
    let s = sample_std(x);
    x.iter().map(|v| ratio(v - m, s)).collect()
}

/// Apply `f` to each full window; NaN during warm-up or when the window
/// contains NaN.
pub fn rolling(x: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    if window == 0 {
        return out;
    }
    for end in window..=x.len() {
        let s = &x[end - window..end];
        if s.iter().all(|v| v.is_finite()) {
            out[end - 1] = f(s);
        }
    }
    out
}

fn rolling_pair(a: &[f64], b: &[f64], window: usize, f: impl Fn(&[f64], &[f64]) -> f64) -> Vec<f64> {
    let n = a.len().min(b.len());
    let mut out = vec![f64::NAN; a.len()];
    if window == 0 {
        return out;
    }
    for end in window..=n {
        let (sa, sb) = (&a[end - window..end], &b[end - window..end]);
        if sa.iter().chain(sb).all(|v| v.is_finite()) {
            out[end - 1] = f(sa, sb);
        }
    }
    out
}

fn mean(s: &[f64]) -> f64 {
    if s.is_empty() {
        return f64::NAN;
    }
    s.iter().sum::<f64>() / s.len() as f64
}

fn sample_var(s: &[f64]) -> f64 {
    if s.len() < 2 {
        return f64::NAN;
    }
    let m = mean(s);
    s.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (s.len() - 1) as f64
}

fn sample_std(s: &[f64]) -> f64 {
    sample_var(s).sqrt()
}

fn sample_cov(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || a.len() != b.len() {
        return f64::NAN;
    }
    let (ma, mb) = (mean(a), mean(b));
    a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum::<f64>() / (a.len() - 1) as f64
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    ratio(sample_cov(a, b), sample_std(a) * sample_std(b))
}

/// Central moments (m2, m3, m4) with population normalization.
fn central_moments(s: &[f64]) -> (f64, f64, f64) {
    let n = s.len() as f64;
    let m = mean(s);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in s {
        let d = v - m;
        m2 += d * d;
        m3 += d * d * d;
        m4 += d * d * d * d;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Biased sample skewness.
fn skewness(s: &[f64]) -> f64 {
    let (m2, m3, _) = central_moments(s);
    ratio(m3, m2.powf(1.5))
}

/// Biased excess kurtosis.
fn excess_kurtosis(s: &[f64]) -> f64 {
    let (m2, _, m4) = central_moments(s);
    ratio(m4, m2 * m2) - 3.0
}

//! Technical indicators over per-ticker OHLCV series.
//!
//! Every indicator implements `Indicator`: full OHLCV history in, one numeric
//! series of the same length out, NaN during warm-up. Multi-output indicators
//! (Bollinger, MACD, Aroon, MAMA) are exposed as separate instances per band so the
//! single-series trait stays unchanged.
//!
//! `technical_analysis` resolves each ticker's OHLCV group from a market
//! Series Table by attribute name and writes `<Ticker>_<INDICATOR>` columns.

pub mod adaptive;
pub mod adx;
pub mod aroon;
pub mod atr;
pub mod bollinger;
pub mod momentum;
pub mod moving_average;
pub mod price;
pub mod rsi;
pub mod volume;

pub use adaptive::{Kama, Mama, MamaBand, T3};
pub use adx::{Directional, DirectionalKind};
pub use aroon::{Aroon, AroonBand};
pub use atr::{Atr, Natr, TrueRange};
pub use bollinger::{Bollinger, BollingerBand};
pub use momentum::{Apo, Bop, Cci, Cmo, Macd, MacdBand, Momentum, MomentumKind, Trix, UltOsc, WillR};
pub use moving_average::{MidPoint, MidPrice, MovingAverage, MaKind};
pub use price::{PriceTransform, PriceKind};
pub use rsi::Rsi;
pub use volume::{AccumDist, AdOsc, Mfi, Obv};

use crate::table::{ColumnKey, Row, SeriesTable, TableError, MARKET_ATTRIBUTES};

/// Attributes an indicator group needs; `Adj Close` is not used.
pub const REQUIRED_ATTRIBUTES: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No value at index t may depend on data from index t+1 or later. Every
/// indicator must pass the truncated-vs-full series test.
pub trait Indicator: Send + Sync {
    /// Column suffix, e.g. `SMA_14` or `BB_upper`.
    fn name(&self) -> &str;

    /// Number of leading values that are always NaN.
    fn lookback(&self) -> usize;

    /// Returns a series of the same length as `bars`.
    fn compute(&self, bars: &Ohlcv) -> Vec<f64>;
}

/// Column-oriented OHLCV history for one ticker; missing values are NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ohlcv {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Ohlcv {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// First `n` bars.
    pub fn truncated(&self, n: usize) -> Ohlcv {
        let n = n.min(self.len());
        Ohlcv {
            open: self.open[..n].to_vec(),
            high: self.high[..n].to_vec(),
            low: self.low[..n].to_vec(),
            close: self.close[..n].to_vec(),
            volume: self.volume[..n].to_vec(),
        }
    }

    /// Pull a ticker's group out of a market table. Returns the missing
    /// attribute names when the group is incomplete.
    pub fn from_table(table: &SeriesTable, ticker: &str) -> Result<Ohlcv, Vec<String>> {
        let mut missing = Vec::new();
        let mut get = |attr: &str| {
            let header = ColumnKey::new(ticker, attr).header();
            table.column_f64(&header).unwrap_or_else(|| {
                missing.push(attr.to_string());
                Vec::new()
            })
        };
        let bars = Ohlcv {
            open: get("Open"),
            high: get("High"),
            low: get("Low"),
            close: get("Close"),
            volume: get("Volume"),
        };
        if missing.is_empty() {
            Ok(bars)
        } else {
            Err(missing)
        }
    }
}

/// The standard indicator set written by `zap ta`.
pub fn default_indicators() -> Vec<Box<dyn Indicator>> {
    vec![
        // Overlap studies
        Box::new(MovingAverage::new(MaKind::Sma, 14)),
        Box::new(MovingAverage::new(MaKind::Ema, 14)),
        Box::new(MovingAverage::new(MaKind::Wma, 14)),
        Box::new(MovingAverage::new(MaKind::Dema, 14)),
        Box::new(MovingAverage::new(MaKind::Tema, 14)),
        Box::new(MovingAverage::new(MaKind::Trima, 14)),
        Box::new(Kama::new(14)),
        Box::new(Mama::mama(0.5, 0.05)),
        Box::new(Mama::fama(0.5, 0.05)),
        Box::new(T3::new(14, 0.7)),
        Box::new(MidPoint::new(14)),
        Box::new(MidPrice::new(14)),
        Box::new(Bollinger::upper(20, 2.0)),
        Box::new(Bollinger::middle(20, 2.0)),
        Box::new(Bollinger::lower(20, 2.0)),
        // Momentum
        Box::new(Directional::new(DirectionalKind::Adx, 14)),
        Box::new(Directional::new(DirectionalKind::Adxr, 14)),
        Box::new(Apo::new(12, 26)),
        Box::new(Aroon::down(14)),
        Box::new(Aroon::up(14)),
        Box::new(Aroon::oscillator(14)),
        Box::new(Bop),
        Box::new(Cci::new(14)),
        Box::new(Cmo::new(14)),
        Box::new(Directional::new(DirectionalKind::Dx, 14)),
        Box::new(Macd::new(MacdBand::Line, 12, 26, 9)),
        Box::new(Macd::new(MacdBand::Signal, 12, 26, 9)),
        Box::new(Macd::new(MacdBand::Histogram, 12, 26, 9)),
        Box::new(Mfi::new(14)),
        Box::new(Momentum::new(MomentumKind::Mom, 14)),
        Box::new(Momentum::new(MomentumKind::Roc, 10)),
        Box::new(Momentum::new(MomentumKind::Rocp, 10)),
        Box::new(Rsi::new(14)),
        Box::new(Trix::new(14)),
        Box::new(UltOsc::new(7, 14, 28)),
        Box::new(WillR::new(14)),
        // Volume
        Box::new(AccumDist),
        Box::new(AdOsc::new(3, 10)),
        Box::new(Obv),
        // Volatility
        Box::new(Atr::new(14)),
        Box::new(Natr::new(14)),
        Box::new(TrueRange),
        // Price transforms
        Box::new(PriceTransform::new(PriceKind::Average)),
        Box::new(PriceTransform::new(PriceKind::Median)),
        Box::new(PriceTransform::new(PriceKind::Typical)),
        Box::new(PriceTransform::new(PriceKind::WeightedClose)),
    ]
}

/// Result of an indicator pass over a market table.
#[derive(Debug)]
pub struct TaReport {
    pub table: SeriesTable,
    pub computed: Vec<String>,
    /// Tickers skipped, with the attributes they lacked.
    pub skipped: Vec<(String, Vec<String>)>,
}

/// Tickers in first-appearance order among columns with a market attribute.
pub fn market_tickers(table: &SeriesTable) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for header in table.columns() {
        let key = ColumnKey::parse(header, &MARKET_ATTRIBUTES);
        if key.attribute.is_some() && !out.contains(&key.series) {
            out.push(key.series);
        }
    }
    out
}

/// Run `indicators` for every ticker with a complete OHLCV group.
pub fn technical_analysis(
    table: &SeriesTable,
    indicators: &[Box<dyn Indicator>],
) -> Result<TaReport, TableError> {
    let dates = table.dates();
    let mut out = SeriesTable::with_rows(
        Vec::new(),
        dates.iter().map(|d| Row::new(*d, Vec::new())).collect(),
    )?;

    let mut computed = Vec::new();
    let mut skipped = Vec::new();
    for ticker in market_tickers(table) {
        let bars = match Ohlcv::from_table(table, &ticker) {
            Ok(bars) => bars,
            Err(missing) => {
                tracing::warn!(
                    ticker = %ticker,
                    "skipping indicators: missing {}",
                    missing.join(", ")
                );
                skipped.push((ticker, missing));
                continue;
            }
        };
        for indicator in indicators {
            let values = indicator.compute(&bars);
            out.add_column(
                format!("{ticker}_{}", indicator.name()),
                values.into_iter().map(|v| v.is_finite().then_some(v)).collect(),
            )?;
        }
        computed.push(ticker);
    }

    Ok(TaReport {
        table: out,
        computed,
        skipped,
    })
}

/// Synthetic bars from close prices for testing.
///
/// open = prev close (or close for the first bar), high = max(open, close) + 1,
/// low = min(open, close) - 1, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Ohlcv {
    let mut bars = Ohlcv::default();
    for (i, &close) in closes.iter().enumerate() {
        let open = if i == 0 { close } else { closes[i - 1] };
        bars.open.push(open);
        bars.high.push(open.max(close) + 1.0);
        bars.low.push(open.min(close) - 1.0);
        bars.close.push(close);
        bars.volume.push(1000.0);
    }
    bars
}

/// Bars from explicit (open, high, low, close) tuples, volume 1000.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Ohlcv {
    let mut bars = Ohlcv::default();
    for &(o, h, l, c) in data {
        bars.open.push(o);
        bars.high.push(h);
        bars.low.push(l);
        bars.close.push(c);
        bars.volume.push(1000.0);
    }
    bars
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

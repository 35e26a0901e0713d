//! True Range, Average True Range and Normalized ATR.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (EMA with alpha = 1/period).
//! NATR = ATR / close * 100.
//! Lookback: period (needs period+1 bars for TR series, then average).

use super::{Indicator, Ohlcv};

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("ATR_{period}"),
        }
    }
}

/// Compute the True Range series.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(bars: &Ohlcv) -> Vec<f64> {
    let n = bars.len();
    let mut tr = vec![f64::NAN; n];
    if n == 0 {
        return tr;
    }

    tr[0] = bars.high[0] - bars.low[0];
    for i in 1..n {
        let (h, l, pc) = (bars.high[i], bars.low[i], bars.close[i - 1]);
        // NaN in any operand propagates through max() only partially, so check explicitly
        if h.is_nan() || l.is_nan() || pc.is_nan() {
            continue;
        }
        tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    tr
}

/// ATR series with TR[0] excluded, so the seed covers `period` proper ranges.
pub fn average_true_range(bars: &Ohlcv, period: usize) -> Vec<f64> {
    let mut tr = true_range(bars);
    if let Some(first) = tr.first_mut() {
        *first = f64::NAN;
    }
    wilder_smooth(&tr, period)
}

/// Apply Wilder smoothing to a series. Alpha = 1/period.
/// Seed: mean of the first run of `period` consecutive valid values.
/// A NaN after the seed blanks the rest of the output.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut run = 0;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            run = 0;
            continue;
        }
        run += 1;
        if run == period {
            seed_end = Some(i + 1);
            break;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let seed = values[seed_end - period..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        average_true_range(bars, self.period)
    }
}

#[derive(Debug, Clone)]
pub struct Natr {
    period: usize,
    name: String,
}

impl Natr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "NATR period must be >= 1");
        Self {
            period,
            name: format!("NATR_{period}"),
        }
    }
}

impl Indicator for Natr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        average_true_range(bars, self.period)
            .iter()
            .zip(&bars.close)
            .map(|(atr, c)| if *c == 0.0 { f64::NAN } else { atr / c * 100.0 })
            .collect()
    }
}

/// Single-bar true range, `TRANGE`.
#[derive(Debug, Clone, Copy)]
pub struct TrueRange;

impl Indicator for TrueRange {
    fn name(&self) -> &str {
        "TRANGE"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let mut tr = true_range(bars);
        if let Some(first) = tr.first_mut() {
            *first = f64::NAN;
        }
        tr
    }
}

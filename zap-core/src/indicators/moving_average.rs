//! Moving averages and range midpoints over close prices.
//!
//! - SMA: rolling mean.
//! - EMA: alpha = 2/(period+1), seeded with the SMA of the first `period`
//!   valid values.
//! - WMA: linearly weighted, newest weight = period.
//! - DEMA = 2*EMA - EMA(EMA); TEMA = 3*E1 - 3*E2 + E3.
//! - TRIMA: SMA of an SMA, the two windows summing to period + 1.
//! - MIDPOINT: (highest close + lowest close) / 2 over the window.
//! - MIDPRICE: (highest high + lowest low) / 2 over the window.
//!
//! NaN anywhere in a rolling window makes that output NaN. For the recursive
//! averages, NaN after the seed propagates to the end of the series.

use super::{Indicator, Ohlcv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaKind {
    Sma,
    Ema,
    Wma,
    Dema,
    Tema,
    Trima,
}

impl MaKind {
    fn label(&self) -> &'static str {
        match self {
            MaKind::Sma => "SMA",
            MaKind::Ema => "EMA",
            MaKind::Wma => "WMA",
            MaKind::Dema => "DEMA",
            MaKind::Tema => "TEMA",
            MaKind::Trima => "TRIMA",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MovingAverage {
    kind: MaKind,
    period: usize,
    name: String,
}

impl MovingAverage {
    pub fn new(kind: MaKind, period: usize) -> Self {
        assert!(period >= 1, "moving average period must be >= 1");
        Self {
            kind,
            period,
            name: format!("{}_{period}", kind.label()),
        }
    }
}

impl Indicator for MovingAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        let p = self.period - 1;
        match self.kind {
            MaKind::Sma | MaKind::Ema | MaKind::Wma | MaKind::Trima => p,
            MaKind::Dema => 2 * p,
            MaKind::Tema => 3 * p,
        }
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let close = &bars.close;
        let p = self.period;
        match self.kind {
            MaKind::Sma => sma_of_series(close, p),
            MaKind::Ema => ema_of_series(close, p),
            MaKind::Wma => wma_of_series(close, p),
            MaKind::Dema => {
                let e1 = ema_of_series(close, p);
                let e2 = ema_of_series(&e1, p);
                e1.iter().zip(&e2).map(|(a, b)| 2.0 * a - b).collect()
            }
            MaKind::Tema => {
                let e1 = ema_of_series(close, p);
                let e2 = ema_of_series(&e1, p);
                let e3 = ema_of_series(&e2, p);
                (0..close.len())
                    .map(|i| 3.0 * e1[i] - 3.0 * e2[i] + e3[i])
                    .collect()
            }
            MaKind::Trima => {
                let (inner, outer) = if p % 2 == 0 {
                    (p / 2 + 1, p / 2)
                } else {
                    ((p + 1) / 2, (p + 1) / 2)
                };
                sma_of_series(&sma_of_series(close, inner), outer)
            }
        }
    }
}

/// Apply `f` to every full window of `values`; NaN if the window has NaN.
pub fn rolling_apply(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| !v.is_nan()) {
            result[i] = f(window);
        }
    }
    result
}

pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| w.iter().sum::<f64>() / w.len() as f64)
}

pub fn wma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let denom = (period * (period + 1)) as f64 / 2.0;
    rolling_apply(values, period, |w| {
        w.iter()
            .enumerate()
            .map(|(j, v)| (j + 1) as f64 * v)
            .sum::<f64>()
            / denom
    })
}

pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn rolling_sum(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |w| w.iter().sum())
}

/// EMA of an arbitrary series. Leading NaNs (another indicator's warm-up)
/// are skipped; the seed is the mean of the first `period` values after them.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    let seed_end = start + period;
    if seed_end > n {
        return result;
    }

    let mut sum = 0.0;
    for &v in &values[start..seed_end] {
        if v.is_nan() {
            return result;
        }
        sum += v;
    }
    let seed = sum / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 2.0 / (period as f64 + 1.0);
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

#[derive(Debug, Clone)]
pub struct MidPoint {
    period: usize,
    name: String,
}

impl MidPoint {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "MIDPOINT period must be >= 1");
        Self {
            period,
            name: format!("MIDPOINT_{period}"),
        }
    }
}

impl Indicator for MidPoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let hi = rolling_max(&bars.close, self.period);
        let lo = rolling_min(&bars.close, self.period);
        hi.iter().zip(&lo).map(|(h, l)| (h + l) / 2.0).collect()
    }
}

#[derive(Debug, Clone)]
pub struct MidPrice {
    period: usize,
    name: String,
}

impl MidPrice {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "MIDPRICE period must be >= 1");
        Self {
            period,
            name: format!("MIDPRICE_{period}"),
        }
    }
}

impl Indicator for MidPrice {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let hi = rolling_max(&bars.high, self.period);
        let lo = rolling_min(&bars.low, self.period);
        hi.iter().zip(&lo).map(|(h, l)| (h + l) / 2.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    fn linear(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + i as f64).collect()
    }

    #[test]
    fn sma_5_basic() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let result = MovingAverage::new(MaKind::Sma, 5).compute(&bars);
        for v in result.iter().take(4) {
            assert!(v.is_nan());
        }
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_nan_propagation() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        bars.close[2] = f64::NAN;
        let result = MovingAverage::new(MaKind::Sma, 3).compute(&bars);
        assert!(result[2].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_3_known_values() {
        // alpha = 0.5, seed SMA(10,11,12) = 11
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let result = MovingAverage::new(MaKind::Ema, 3).compute(&bars);
        assert!(result[1].is_nan());
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        assert_approx(result[3], 12.0, DEFAULT_EPSILON);
        assert_approx(result[4], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_skips_leading_nan() {
        let values = [f64::NAN, f64::NAN, 10.0, 11.0, 12.0, 13.0];
        let result = ema_of_series(&values, 3);
        assert!(result[3].is_nan());
        assert_approx(result[4], 11.0, DEFAULT_EPSILON);
        assert_approx(result[5], 12.0, DEFAULT_EPSILON);
    }

    #[test]
    fn wma_weights_newest_most() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let result = MovingAverage::new(MaKind::Wma, 3).compute(&bars);
        assert_approx(result[2], 14.0 / 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn dema_and_tema_track_linear_series() {
        // EMA with an SMA seed lags a line by exactly (period-1)/2, so the
        // lag-corrected averages reproduce the line itself.
        let bars = make_bars(&linear(40));
        let dema = MovingAverage::new(MaKind::Dema, 5);
        let tema = MovingAverage::new(MaKind::Tema, 5);
        let d = dema.compute(&bars);
        let t = tema.compute(&bars);
        assert!(d[dema.lookback() - 1].is_nan());
        assert!(t[tema.lookback() - 1].is_nan());
        for i in tema.lookback()..40 {
            assert_approx(d[i], bars.close[i], 1e-9);
            assert_approx(t[i], bars.close[i], 1e-9);
        }
    }

    #[test]
    fn trima_on_line_is_centered() {
        let bars = make_bars(&linear(20));
        for period in [4, 5] {
            let result = MovingAverage::new(MaKind::Trima, period).compute(&bars);
            assert!(result[period - 2].is_nan());
            // A symmetric triangular window on a line gives its center value
            let center = bars.close[period - 1] - (period - 1) as f64 / 2.0;
            assert_approx(result[period - 1], center, 1e-9);
        }
    }

    #[test]
    fn midpoint_and_midprice() {
        let bars = make_bars(&[10.0, 14.0, 12.0]);
        let mp = MidPoint::new(3).compute(&bars);
        assert_approx(mp[2], 12.0, DEFAULT_EPSILON);
        // highs: 11, 15, 15; lows: 9, 9, 11
        let pr = MidPrice::new(3).compute(&bars);
        assert_approx(pr[2], 12.0, DEFAULT_EPSILON);
    }
}

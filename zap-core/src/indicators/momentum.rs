//! Momentum oscillators over close (and for some, high/low) prices.
//!
//! - MOM: close[t] - close[t-period]
//! - ROC: (close[t] / close[t-period] - 1) * 100; ROCP without the * 100
//! - CMO: 100 * (sum_up - sum_down) / (sum_up + sum_down) over `period` changes
//! - WILLR: -100 * (highest_high - close) / (highest_high - lowest_low)
//! - BOP: (close - open) / (high - low)
//! - CCI: (tp - sma(tp)) / (0.015 * mean_deviation(tp)), tp = (h + l + c) / 3
//! - APO: SMA(fast) - SMA(slow)
//! - MACD: EMA(fast) - EMA(slow); signal = EMA(signal) of MACD; hist = MACD - signal
//! - TRIX: 1-bar percent change of a triple-smoothed EMA
//! - ULTOSC: weighted average of buying-pressure ratios over three windows

use super::moving_average::{
    ema_of_series, rolling_apply, rolling_max, rolling_min, rolling_sum, sma_of_series,
};
use super::{Indicator, Ohlcv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentumKind {
    Mom,
    Roc,
    Rocp,
}

#[derive(Debug, Clone)]
pub struct Momentum {
    kind: MomentumKind,
    period: usize,
    name: String,
}

impl Momentum {
    pub fn new(kind: MomentumKind, period: usize) -> Self {
        assert!(period >= 1, "Momentum period must be >= 1");
        let label = match kind {
            MomentumKind::Mom => "MOM",
            MomentumKind::Roc => "ROC",
            MomentumKind::Rocp => "ROCP",
        };
        Self {
            kind,
            period,
            name: format!("{label}_{period}"),
        }
    }
}

impl Indicator for Momentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let closes = &bars.close;
        let n = closes.len();
        let mut result = vec![f64::NAN; n];

        for i in self.period..n {
            let prev = closes[i - self.period];
            let curr = closes[i];
            result[i] = match self.kind {
                MomentumKind::Mom => curr - prev,
                // Undefined against a zero base
                _ if prev == 0.0 => f64::NAN,
                MomentumKind::Roc => (curr / prev - 1.0) * 100.0,
                MomentumKind::Rocp => curr / prev - 1.0,
            };
        }

        result
    }
}

#[derive(Debug, Clone)]
pub struct Cmo {
    period: usize,
    name: String,
}

impl Cmo {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "CMO period must be >= 1");
        Self {
            period,
            name: format!("CMO_{period}"),
        }
    }
}

impl Indicator for Cmo {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let changes: Vec<f64> = std::iter::once(f64::NAN)
            .chain(bars.close.windows(2).map(|w| w[1] - w[0]))
            .collect();
        rolling_apply(&changes, self.period, |w| {
            let up: f64 = w.iter().filter(|c| **c > 0.0).sum();
            let down: f64 = -w.iter().filter(|c| **c < 0.0).sum::<f64>();
            if up + down == 0.0 {
                0.0
            } else {
                100.0 * (up - down) / (up + down)
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct WillR {
    period: usize,
    name: String,
}

impl WillR {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "WILLR period must be >= 1");
        Self {
            period,
            name: format!("WILLR_{period}"),
        }
    }
}

impl Indicator for WillR {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let hh = rolling_max(&bars.high, self.period);
        let ll = rolling_min(&bars.low, self.period);
        (0..bars.len())
            .map(|i| {
                let range = hh[i] - ll[i];
                if range == 0.0 {
                    0.0
                } else {
                    -100.0 * (hh[i] - bars.close[i]) / range
                }
            })
            .collect()
    }
}

/// Balance of power, `BOP`.
#[derive(Debug, Clone, Copy)]
pub struct Bop;

impl Indicator for Bop {
    fn name(&self) -> &str {
        "BOP"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        (0..bars.len())
            .map(|i| {
                let range = bars.high[i] - bars.low[i];
                if range == 0.0 {
                    0.0
                } else {
                    (bars.close[i] - bars.open[i]) / range
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Cci {
    period: usize,
    name: String,
}

impl Cci {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "CCI period must be >= 1");
        Self {
            period,
            name: format!("CCI_{period}"),
        }
    }
}

impl Indicator for Cci {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let typical: Vec<f64> = (0..bars.len())
            .map(|i| (bars.high[i] + bars.low[i] + bars.close[i]) / 3.0)
            .collect();
        rolling_apply(&typical, self.period, |w| {
            let len = w.len() as f64;
            let mean = w.iter().sum::<f64>() / len;
            let mean_dev = w.iter().map(|v| (v - mean).abs()).sum::<f64>() / len;
            let last = w[w.len() - 1];
            if mean_dev == 0.0 {
                0.0
            } else {
                (last - mean) / (0.015 * mean_dev)
            }
        })
    }
}

/// Absolute price oscillator over simple averages.
#[derive(Debug, Clone)]
pub struct Apo {
    fast: usize,
    slow: usize,
}

impl Apo {
    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast >= 1 && slow >= 1, "APO periods must be >= 1");
        Self { fast, slow }
    }
}

impl Indicator for Apo {
    fn name(&self) -> &str {
        "APO"
    }

    fn lookback(&self) -> usize {
        self.fast.max(self.slow) - 1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let fast = sma_of_series(&bars.close, self.fast);
        let slow = sma_of_series(&bars.close, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdBand {
    Line,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    band: MacdBand,
    fast: usize,
    slow: usize,
    signal: usize,
}

impl Macd {
    pub fn new(band: MacdBand, fast: usize, slow: usize, signal: usize) -> Self {
        assert!(
            fast >= 1 && slow >= 1 && signal >= 1,
            "MACD periods must be >= 1"
        );
        Self {
            band,
            fast,
            slow,
            signal,
        }
    }

    fn line(&self, closes: &[f64]) -> Vec<f64> {
        let fast = ema_of_series(closes, self.fast);
        let slow = ema_of_series(closes, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        match self.band {
            MacdBand::Line => "MACD",
            MacdBand::Signal => "MACD_signal",
            MacdBand::Histogram => "MACD_hist",
        }
    }

    fn lookback(&self) -> usize {
        let line = self.fast.max(self.slow) - 1;
        match self.band {
            MacdBand::Line => line,
            MacdBand::Signal | MacdBand::Histogram => line + self.signal - 1,
        }
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let line = self.line(&bars.close);
        if self.band == MacdBand::Line {
            return line;
        }
        let signal = ema_of_series(&line, self.signal);
        match self.band {
            MacdBand::Signal => signal,
            _ => line.iter().zip(&signal).map(|(m, s)| m - s).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trix {
    period: usize,
    name: String,
}

impl Trix {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "TRIX period must be >= 1");
        Self {
            period,
            name: format!("TRIX_{period}"),
        }
    }
}

impl Indicator for Trix {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        3 * (self.period - 1) + 1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let e1 = ema_of_series(&bars.close, self.period);
        let e2 = ema_of_series(&e1, self.period);
        let e3 = ema_of_series(&e2, self.period);
        std::iter::once(f64::NAN)
            .chain(e3.windows(2).map(|w| {
                if w[0] == 0.0 {
                    f64::NAN
                } else {
                    100.0 * (w[1] / w[0] - 1.0)
                }
            }))
            .take(bars.len())
            .collect()
    }
}

/// Ultimate oscillator with windows weighted 4:2:1 from shortest to longest.
#[derive(Debug, Clone)]
pub struct UltOsc {
    periods: [usize; 3],
}

impl UltOsc {
    pub fn new(short: usize, medium: usize, long: usize) -> Self {
        assert!(
            short >= 1 && medium >= 1 && long >= 1,
            "ULTOSC periods must be >= 1"
        );
        Self {
            periods: [short, medium, long],
        }
    }
}

impl Indicator for UltOsc {
    fn name(&self) -> &str {
        "ULTOSC"
    }

    fn lookback(&self) -> usize {
        self.periods.iter().copied().max().unwrap_or(0)
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let n = bars.len();
        let mut pressure = vec![f64::NAN; n];
        let mut range = vec![f64::NAN; n];
        for i in 1..n {
            let prev = bars.close[i - 1];
            let true_low = bars.low[i].min(prev);
            pressure[i] = bars.close[i] - true_low;
            range[i] = bars.high[i].max(prev) - true_low;
        }

        let averages: Vec<Vec<f64>> = self
            .periods
            .iter()
            .map(|&p| {
                let bp = rolling_sum(&pressure, p);
                let tr = rolling_sum(&range, p);
                bp.iter()
                    .zip(&tr)
                    .map(|(b, t)| if *t == 0.0 { 0.0 } else { b / t })
                    .collect()
            })
            .collect();

        (0..n)
            .map(|i| 100.0 * (4.0 * averages[0][i] + 2.0 * averages[1][i] + averages[2][i]) / 7.0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, make_ohlc_bars, DEFAULT_EPSILON};

    #[test]
    fn momentum_basic() {
        let bars = make_bars(&[100.0, 110.0, 105.0, 115.0]);
        let mom = Momentum::new(MomentumKind::Mom, 2).compute(&bars);
        assert!(mom[1].is_nan());
        assert_approx(mom[2], 5.0, DEFAULT_EPSILON);
        assert_approx(mom[3], 5.0, DEFAULT_EPSILON);
    }

    #[test]
    fn roc_and_rocp() {
        let bars = make_bars(&[100.0, 110.0, 120.0]);
        let roc = Momentum::new(MomentumKind::Roc, 2).compute(&bars);
        let rocp = Momentum::new(MomentumKind::Rocp, 2).compute(&bars);
        assert_approx(roc[2], 20.0, 1e-9);
        assert_approx(rocp[2], 0.2, 1e-12);
    }

    #[test]
    fn roc_zero_base_is_nan() {
        let bars = make_bars(&[0.0, 1.0, 2.0]);
        let roc = Momentum::new(MomentumKind::Roc, 1).compute(&bars);
        assert!(roc[1].is_nan());
        assert_approx(roc[2], 100.0, 1e-9);
    }

    #[test]
    fn cmo_known_value() {
        // Changes over window: +2, -1, +3 -> up 5, down 1
        let bars = make_bars(&[10.0, 12.0, 11.0, 14.0]);
        let cmo = Cmo::new(3).compute(&bars);
        assert!(cmo[2].is_nan());
        assert_approx(cmo[3], 100.0 * 4.0 / 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn willr_range() {
        let bars = make_ohlc_bars(&[
            (10.0, 12.0, 8.0, 11.0),
            (11.0, 15.0, 10.0, 14.0),
            (14.0, 14.0, 9.0, 10.0),
        ]);
        let w = WillR::new(3).compute(&bars);
        // HH 15, LL 8, close 10
        assert_approx(w[2], -100.0 * 5.0 / 7.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bop_handles_flat_bar() {
        let bars = make_ohlc_bars(&[(10.0, 12.0, 8.0, 11.0), (10.0, 10.0, 10.0, 10.0)]);
        let bop = Bop.compute(&bars);
        assert_approx(bop[0], 0.25, DEFAULT_EPSILON);
        assert_approx(bop[1], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn cci_known_value() {
        // Typical prices 1, 2, 3: mean 2, mean deviation 2/3
        let bars = make_ohlc_bars(&[(1.0, 1.0, 1.0, 1.0), (2.0, 2.0, 2.0, 2.0), (3.0, 3.0, 3.0, 3.0)]);
        let cci = Cci::new(3).compute(&bars);
        assert_approx(cci[2], 1.0 / (0.015 * 2.0 / 3.0), 1e-9);
    }

    #[test]
    fn apo_on_line() {
        let closes: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let apo = Apo::new(2, 4).compute(&make_bars(&closes));
        assert!(apo[2].is_nan());
        // SMA lag on a line is (period-1)/2: 0.5 - 1.5
        assert_approx(apo[5], 1.0, 1e-12);
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.4).sin() * 3.0).collect();
        let bars = make_bars(&closes);
        let line = Macd::new(MacdBand::Line, 12, 26, 9).compute(&bars);
        let signal = Macd::new(MacdBand::Signal, 12, 26, 9).compute(&bars);
        let hist = Macd::new(MacdBand::Histogram, 12, 26, 9);
        assert_eq!(hist.lookback(), 33);
        let h = hist.compute(&bars);
        assert!(h[32].is_nan());
        assert!(!line[25].is_nan());
        for i in 33..60 {
            assert_approx(h[i], line[i] - signal[i], 1e-12);
        }
    }

    #[test]
    fn macd_on_line_converges_to_lag_difference() {
        // EMA lags a line by (period-1)/2, so MACD = (26-1)/2 - (12-1)/2 = 7
        let closes: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let line = Macd::new(MacdBand::Line, 12, 26, 9).compute(&make_bars(&closes));
        assert_approx(line[40], 7.0, 1e-9);
    }

    #[test]
    fn trix_of_constant_is_zero() {
        let bars = make_bars(&[100.0; 20]);
        let trix = Trix::new(3);
        let out = trix.compute(&bars);
        assert_eq!(trix.lookback(), 7);
        assert!(out[6].is_nan());
        assert_approx(out[7], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ultosc_all_closes_at_high() {
        // Close at the true high every bar: buying pressure equals true range
        let data: Vec<_> = (0..10)
            .map(|i| {
                let c = 100.0 + i as f64;
                (c - 0.5, c, c - 2.0, c)
            })
            .collect();
        let uo = UltOsc::new(2, 3, 4).compute(&make_ohlc_bars(&data));
        assert!(uo[3].is_nan());
        assert_approx(uo[4], 100.0, 1e-9);
    }
}

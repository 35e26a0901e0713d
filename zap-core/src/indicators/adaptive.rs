//! Adaptive moving averages over close prices.
//!
//! - KAMA: Kaufman's efficiency ratio scales the smoothing constant between
//!   the 2-bar and 30-bar EMA rates. Seeded with the close before the first
//!   output.
//! - MAMA/FAMA: Ehlers' MESA adaptive average. A Hilbert transform measures
//!   the phase rate of change, alpha = fast_limit / delta_phase clamped below
//!   by slow_limit. FAMA follows MAMA at half the alpha.
//! - T3: Tillson's six-fold EMA with volume factor `v`.
//!
//! All three are recursive: NaN after the first output propagates to the end
//! of the series.

use super::moving_average::ema_of_series;
use super::{Indicator, Ohlcv};

const KAMA_FAST: f64 = 2.0 / 3.0;
const KAMA_SLOW: f64 = 2.0 / 31.0;

/// Bars before MAMA and FAMA are reported.
pub const MAMA_LOOKBACK: usize = 32;

#[derive(Debug, Clone)]
pub struct Kama {
    period: usize,
    name: String,
}

impl Kama {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "KAMA period must be >= 1");
        Self {
            period,
            name: format!("KAMA_{period}"),
        }
    }
}

impl Indicator for Kama {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        kama_of_series(&bars.close, self.period)
    }
}

pub fn kama_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    let Some(first) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    if first + period >= n {
        return result;
    }
    if values[first..=first + period].iter().any(|v| v.is_nan()) {
        return result;
    }

    let mut prev = values[first + period - 1];
    for i in first + period..n {
        if values[i].is_nan() {
            return result;
        }
        let change = (values[i] - values[i - period]).abs();
        let volatility: f64 = (i - period + 1..=i)
            .map(|j| (values[j] - values[j - 1]).abs())
            .sum();
        let er = if volatility <= change || volatility == 0.0 {
            1.0
        } else {
            change / volatility
        };
        let sc = (er * (KAMA_FAST - KAMA_SLOW) + KAMA_SLOW).powi(2);
        prev += sc * (values[i] - prev);
        result[i] = prev;
    }
    result
}

#[derive(Debug, Clone)]
pub struct T3 {
    period: usize,
    vfactor: f64,
    name: String,
}

impl T3 {
    pub fn new(period: usize, vfactor: f64) -> Self {
        assert!(period >= 1, "T3 period must be >= 1");
        Self {
            period,
            vfactor,
            name: format!("T3_{period}"),
        }
    }
}

impl Indicator for T3 {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        6 * (self.period - 1)
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let p = self.period;
        let e1 = ema_of_series(&bars.close, p);
        let e2 = ema_of_series(&e1, p);
        let e3 = ema_of_series(&e2, p);
        let e4 = ema_of_series(&e3, p);
        let e5 = ema_of_series(&e4, p);
        let e6 = ema_of_series(&e5, p);

        let a = self.vfactor;
        let (a2, a3) = (a * a, a * a * a);
        let c1 = -a3;
        let c2 = 3.0 * a2 + 3.0 * a3;
        let c3 = -6.0 * a2 - 3.0 * a - 3.0 * a3;
        let c4 = 1.0 + 3.0 * a + a3 + 3.0 * a2;
        (0..e6.len())
            .map(|i| c1 * e6[i] + c2 * e5[i] + c3 * e4[i] + c4 * e3[i])
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MamaBand {
    Mama,
    Fama,
}

#[derive(Debug, Clone)]
pub struct Mama {
    band: MamaBand,
    fast_limit: f64,
    slow_limit: f64,
}

impl Mama {
    pub fn mama(fast_limit: f64, slow_limit: f64) -> Self {
        Self::new(MamaBand::Mama, fast_limit, slow_limit)
    }

    pub fn fama(fast_limit: f64, slow_limit: f64) -> Self {
        Self::new(MamaBand::Fama, fast_limit, slow_limit)
    }

    fn new(band: MamaBand, fast_limit: f64, slow_limit: f64) -> Self {
        assert!(
            0.0 < slow_limit && slow_limit <= fast_limit && fast_limit <= 1.0,
            "MAMA limits must satisfy 0 < slow <= fast <= 1"
        );
        Self {
            band,
            fast_limit,
            slow_limit,
        }
    }
}

impl Indicator for Mama {
    fn name(&self) -> &str {
        match self.band {
            MamaBand::Mama => "MAMA",
            MamaBand::Fama => "FAMA",
        }
    }

    fn lookback(&self) -> usize {
        MAMA_LOOKBACK
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let (mama, fama) = mesa_adaptive(&bars.close, self.fast_limit, self.slow_limit);
        match self.band {
            MamaBand::Mama => mama,
            MamaBand::Fama => fama,
        }
    }
}

/// MAMA and FAMA for `values`, NaN for the first `MAMA_LOOKBACK` valid bars.
pub fn mesa_adaptive(values: &[f64], fast_limit: f64, slow_limit: f64) -> (Vec<f64>, Vec<f64>) {
    let n = values.len();
    let mut mama = vec![f64::NAN; n];
    let mut fama = vec![f64::NAN; n];
    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return (mama, fama);
    };

    let price = &values[start..];
    let len = price.len();
    let mut smooth = vec![0.0; len];
    let mut detrender = vec![0.0; len];
    let mut i1 = vec![0.0; len];
    let mut q1 = vec![0.0; len];
    let (mut i2_prev, mut q2_prev, mut re_prev, mut im_prev) = (0.0, 0.0, 0.0, 0.0);
    let (mut period, mut phase_prev) = (0.0_f64, 0.0_f64);
    let (mut mama_prev, mut fama_prev) = (price[0], price[0]);

    for t in 0..len {
        if price[t].is_nan() {
            break;
        }
        let back = |s: &[f64], k: usize| if t >= k { s[t - k] } else { 0.0 };
        let gain = 0.075 * period + 0.54;
        let hilbert = |s: &[f64]| {
            (0.0962 * s[t] + 0.5769 * back(s, 2) - 0.5769 * back(s, 4) - 0.0962 * back(s, 6)) * gain
        };

        smooth[t] = (4.0 * price[t] + 3.0 * back(price, 1) + 2.0 * back(price, 2) + back(price, 3)) / 10.0;
        detrender[t] = hilbert(&smooth);
        q1[t] = hilbert(&detrender);
        i1[t] = back(&detrender, 3);

        // Advance the phase of I1 and Q1 by 90 degrees
        let ji = hilbert(&i1);
        let jq = hilbert(&q1);
        let i2 = 0.2 * (i1[t] - jq) + 0.8 * i2_prev;
        let q2 = 0.2 * (q1[t] + ji) + 0.8 * q2_prev;

        // Homodyne discriminator
        let re = 0.2 * (i2 * i2_prev + q2 * q2_prev) + 0.8 * re_prev;
        let im = 0.2 * (i2 * q2_prev - q2 * i2_prev) + 0.8 * im_prev;
        (i2_prev, q2_prev, re_prev, im_prev) = (i2, q2, re, im);

        let mut next = period;
        if im != 0.0 && re != 0.0 {
            next = 360.0 / (im / re).atan().to_degrees();
        }
        next = next.min(1.5 * period).max(0.67 * period).clamp(6.0, 50.0);
        period = 0.2 * next + 0.8 * period;

        let phase = if i1[t] != 0.0 {
            (q1[t] / i1[t]).atan().to_degrees()
        } else {
            phase_prev
        };
        let delta = (phase_prev - phase).max(1.0);
        phase_prev = phase;

        let alpha = (fast_limit / delta).max(slow_limit);
        mama_prev = alpha * price[t] + (1.0 - alpha) * mama_prev;
        fama_prev = 0.5 * alpha * mama_prev + (1.0 - 0.5 * alpha) * fama_prev;
        if t >= MAMA_LOOKBACK {
            mama[start + t] = mama_prev;
            fama[start + t] = fama_prev;
        }
    }
    (mama, fama)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    fn linear(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + i as f64).collect()
    }

    #[test]
    fn kama_trending_series_uses_fast_constant() {
        let bars = make_bars(&linear(10));
        let result = Kama::new(5).compute(&bars);
        for v in result.iter().take(5) {
            assert!(v.is_nan());
        }
        // ER = 1 on a straight line, so sc = (2/3)^2
        let sc = KAMA_FAST * KAMA_FAST;
        assert_approx(result[5], 14.0 + sc, DEFAULT_EPSILON);
        assert_approx(result[6], result[5] + sc * (16.0 - result[5]), DEFAULT_EPSILON);
    }

    #[test]
    fn kama_choppy_series_barely_moves() {
        let closes: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let result = Kama::new(10).compute(&make_bars(&closes));
        let last = result[29];
        let prev = result[28];
        assert!((last - prev).abs() < 0.01, "choppy KAMA moved {prev} -> {last}");
    }

    #[test]
    fn kama_nan_after_start_propagates() {
        let mut bars = make_bars(&linear(20));
        bars.close[12] = f64::NAN;
        let result = Kama::new(5).compute(&bars);
        assert!(!result[11].is_nan());
        assert!(result[12..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn t3_of_constant_is_constant() {
        let bars = make_bars(&[42.0; 40]);
        let indicator = T3::new(5, 0.7);
        let result = indicator.compute(&bars);
        assert_eq!(indicator.lookback(), 24);
        assert!(result[23].is_nan());
        for v in &result[24..] {
            assert_approx(*v, 42.0, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn t3_zero_vfactor_is_triple_ema() {
        let bars = make_bars(&linear(40));
        let result = T3::new(4, 0.0).compute(&bars);
        let e1 = ema_of_series(&bars.close, 4);
        let e3 = ema_of_series(&ema_of_series(&e1, 4), 4);
        assert_approx(result[39], e3[39], DEFAULT_EPSILON);
    }

    #[test]
    fn mama_warmup_and_flat_series() {
        let bars = make_bars(&[25.0; 60]);
        let mama = Mama::mama(0.5, 0.05).compute(&bars);
        let fama = Mama::fama(0.5, 0.05).compute(&bars);
        for i in 0..MAMA_LOOKBACK {
            assert!(mama[i].is_nan() && fama[i].is_nan(), "index {i}");
        }
        for i in MAMA_LOOKBACK..60 {
            assert_approx(mama[i], 25.0, DEFAULT_EPSILON);
            assert_approx(fama[i], 25.0, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn fama_lags_mama_after_a_step() {
        let closes: Vec<f64> = (0..80).map(|i| if i < 40 { 100.0 } else { 120.0 }).collect();
        let bars = make_bars(&closes);
        let mama = Mama::mama(0.5, 0.05).compute(&bars);
        let fama = Mama::fama(0.5, 0.05).compute(&bars);
        for i in 40..80 {
            assert!(mama[i] > 100.0 && mama[i] <= 120.0 + 1e-9, "MAMA {i}: {}", mama[i]);
            assert!(fama[i] <= mama[i] + 1e-9, "FAMA above MAMA at {i}");
        }
    }

    #[test]
    fn mama_leading_nans_shift_warmup() {
        let mut closes = vec![f64::NAN; 5];
        closes.extend((0..50).map(|i| 50.0 + (i as f64 * 0.4).sin()));
        let result = Mama::mama(0.5, 0.05).compute(&make_bars(&closes));
        assert!(result[5 + MAMA_LOOKBACK - 1].is_nan());
        assert!(!result[5 + MAMA_LOOKBACK].is_nan());
    }
}

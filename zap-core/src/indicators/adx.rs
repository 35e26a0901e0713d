//! Directional movement family (Wilder): DX, ADX and ADXR.
//!
//! 1. +DM and -DM from consecutive highs and lows
//! 2. Wilder-smooth +DM, -DM and TR
//! 3. +DI = 100 * sm(+DM) / sm(TR); -DI likewise
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = Wilder-smoothed DX
//! 6. ADXR = (ADX[t] + ADX[t - (period - 1)]) / 2
//!
//! Lookback: DX period, ADX 2*period - 1, ADXR 3*period - 2.

use super::atr::{true_range, wilder_smooth};
use super::{Indicator, Ohlcv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionalKind {
    Dx,
    Adx,
    Adxr,
}

#[derive(Debug, Clone)]
pub struct Directional {
    kind: DirectionalKind,
    period: usize,
    name: String,
}

impl Directional {
    pub fn new(kind: DirectionalKind, period: usize) -> Self {
        assert!(period >= 1, "directional movement period must be >= 1");
        let label = match kind {
            DirectionalKind::Dx => "DX",
            DirectionalKind::Adx => "ADX",
            DirectionalKind::Adxr => "ADXR",
        };
        Self {
            kind,
            period,
            name: format!("{label}_{period}"),
        }
    }
}

/// DX series; valid from index `period`.
pub fn directional_index(bars: &Ohlcv, period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];

    for i in 1..n {
        let high_diff = bars.high[i] - bars.high[i - 1];
        let low_diff = bars.low[i - 1] - bars.low[i];
        if high_diff.is_nan() || low_diff.is_nan() {
            continue;
        }
        plus_dm[i] = if high_diff > low_diff && high_diff > 0.0 {
            high_diff
        } else {
            0.0
        };
        minus_dm[i] = if low_diff > high_diff && low_diff > 0.0 {
            low_diff
        } else {
            0.0
        };
    }

    // TR[0] has no previous close; keep it out of the seed like the DM series
    let mut tr = true_range(bars);
    if let Some(first) = tr.first_mut() {
        *first = f64::NAN;
    }
    let smooth_tr = wilder_smooth(&tr, period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let mut dx = vec![f64::NAN; n];
    for i in 0..n {
        let (t, p, m) = (smooth_tr[i], smooth_plus[i], smooth_minus[i]);
        if t.is_nan() || p.is_nan() || m.is_nan() || t == 0.0 {
            continue;
        }
        let plus_di = 100.0 * p / t;
        let minus_di = 100.0 * m / t;
        let di_sum = plus_di + minus_di;
        dx[i] = if di_sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / di_sum
        };
    }
    dx
}

impl Indicator for Directional {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        let p = self.period;
        match self.kind {
            DirectionalKind::Dx => p,
            DirectionalKind::Adx => 2 * p - 1,
            DirectionalKind::Adxr => 3 * p - 2,
        }
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let dx = directional_index(bars, self.period);
        match self.kind {
            DirectionalKind::Dx => dx,
            DirectionalKind::Adx => wilder_smooth(&dx, self.period),
            DirectionalKind::Adxr => {
                let adx = wilder_smooth(&dx, self.period);
                let lag = self.period - 1;
                (0..adx.len())
                    .map(|i| {
                        if i < lag {
                            f64::NAN
                        } else {
                            (adx[i] + adx[i - lag]) / 2.0
                        }
                    })
                    .collect()
            }
        }
    }
}

//! Volume-weighted indicators.
//!
//! - AD: cumulative close-location value times volume
//! - ADOSC: EMA(fast) of AD minus EMA(slow) of AD
//! - OBV: running volume signed by the close-to-close direction
//! - MFI: RSI-style ratio of positive to negative money flow (typical price * volume)

use super::moving_average::{ema_of_series, rolling_sum};
use super::{Indicator, Ohlcv};

/// Accumulation/distribution line, `AD`.
#[derive(Debug, Clone, Copy)]
pub struct AccumDist;

pub fn accumulation_distribution(bars: &Ohlcv) -> Vec<f64> {
    let mut total = 0.0;
    (0..bars.len())
        .map(|i| {
            let (h, l, c) = (bars.high[i], bars.low[i], bars.close[i]);
            let range = h - l;
            if range != 0.0 {
                total += ((c - l) - (h - c)) / range * bars.volume[i];
            }
            total
        })
        .collect()
}

impl Indicator for AccumDist {
    fn name(&self) -> &str {
        "AD"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        accumulation_distribution(bars)
    }
}

/// Chaikin A/D oscillator.
#[derive(Debug, Clone)]
pub struct AdOsc {
    fast: usize,
    slow: usize,
}

impl AdOsc {
    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast >= 1 && slow >= 1, "ADOSC periods must be >= 1");
        Self { fast, slow }
    }
}

impl Indicator for AdOsc {
    fn name(&self) -> &str {
        "ADOSC"
    }

    fn lookback(&self) -> usize {
        self.fast.max(self.slow) - 1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let ad = accumulation_distribution(bars);
        let fast = ema_of_series(&ad, self.fast);
        let slow = ema_of_series(&ad, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}

/// On-balance volume, `OBV`.
#[derive(Debug, Clone, Copy)]
pub struct Obv;

impl Indicator for Obv {
    fn name(&self) -> &str {
        "OBV"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let n = bars.len();
        let mut result = Vec::with_capacity(n);
        let mut total = 0.0;
        for i in 0..n {
            if i == 0 {
                total = bars.volume[0];
            } else if bars.close[i] > bars.close[i - 1] {
                total += bars.volume[i];
            } else if bars.close[i] < bars.close[i - 1] {
                total -= bars.volume[i];
            }
            result.push(total);
        }
        result
    }
}

#[derive(Debug, Clone)]
pub struct Mfi {
    period: usize,
    name: String,
}

impl Mfi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "MFI period must be >= 1");
        Self {
            period,
            name: format!("MFI_{period}"),
        }
    }
}

impl Indicator for Mfi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let n = bars.len();
        let typical: Vec<f64> = (0..n)
            .map(|i| (bars.high[i] + bars.low[i] + bars.close[i]) / 3.0)
            .collect();

        let mut positive = vec![f64::NAN; n];
        let mut negative = vec![f64::NAN; n];
        for i in 1..n {
            let flow = typical[i] * bars.volume[i];
            if flow.is_nan() || typical[i - 1].is_nan() {
                continue;
            }
            let (p, m) = if typical[i] > typical[i - 1] {
                (flow, 0.0)
            } else if typical[i] < typical[i - 1] {
                (0.0, flow)
            } else {
                (0.0, 0.0)
            };
            positive[i] = p;
            negative[i] = m;
        }

        let pos = rolling_sum(&positive, self.period);
        let neg = rolling_sum(&negative, self.period);
        pos.iter()
            .zip(&neg)
            .map(|(&p, &m)| {
                if p.is_nan() || m.is_nan() {
                    f64::NAN
                } else if p == 0.0 && m == 0.0 {
                    50.0
                } else if m == 0.0 {
                    100.0
                } else {
                    100.0 - 100.0 / (1.0 + p / m)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON};

    #[test]
    fn ad_accumulates_close_location() {
        let bars = make_ohlc_bars(&[
            (10.0, 12.0, 8.0, 12.0), // close at high: +volume
            (12.0, 12.0, 8.0, 8.0),  // close at low: -volume
            (10.0, 12.0, 8.0, 11.0), // clv 0.5
            (10.0, 10.0, 10.0, 10.0),
        ]);
        let ad = AccumDist.compute(&bars);
        assert_approx(ad[0], 1000.0, DEFAULT_EPSILON);
        assert_approx(ad[1], 0.0, DEFAULT_EPSILON);
        assert_approx(ad[2], 500.0, DEFAULT_EPSILON);
        // Flat bar contributes nothing
        assert_approx(ad[3], 500.0, DEFAULT_EPSILON);
    }

    #[test]
    fn adosc_warmup() {
        let data: Vec<_> = (0..15)
            .map(|i| {
                let c = 100.0 + i as f64;
                (c, c + 1.0, c - 1.0, c + 0.5)
            })
            .collect();
        let osc = AdOsc::new(3, 10);
        let out = osc.compute(&make_ohlc_bars(&data));
        assert!(out[8].is_nan());
        assert!(!out[9].is_nan());
    }

    #[test]
    fn obv_signs_volume_by_direction() {
        let mut bars = make_ohlc_bars(&[
            (10.0, 11.0, 9.0, 10.0),
            (10.0, 12.0, 9.0, 11.0),
            (11.0, 12.0, 9.0, 11.0),
            (11.0, 12.0, 8.0, 9.0),
        ]);
        bars.volume = vec![100.0, 200.0, 300.0, 400.0];
        let obv = Obv.compute(&bars);
        assert_eq!(obv, vec![100.0, 300.0, 300.0, -100.0]);
    }

    #[test]
    fn mfi_one_sided_flow() {
        let data: Vec<_> = (0..6)
            .map(|i| {
                let c = 100.0 + i as f64;
                (c, c + 1.0, c - 1.0, c)
            })
            .collect();
        let mfi = Mfi::new(3).compute(&make_ohlc_bars(&data));
        assert!(mfi[2].is_nan());
        assert_approx(mfi[3], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn mfi_known_ratio() {
        // Typical prices 10, 12, 11, 13 with volume 1000
        let bars = make_ohlc_bars(&[
            (10.0, 10.0, 10.0, 10.0),
            (12.0, 12.0, 12.0, 12.0),
            (11.0, 11.0, 11.0, 11.0),
            (13.0, 13.0, 13.0, 13.0),
        ]);
        let mfi = Mfi::new(3).compute(&bars);
        let pos = 12_000.0 + 13_000.0;
        let neg = 11_000.0;
        assert_approx(mfi[3], 100.0 - 100.0 / (1.0 + pos / neg), 1e-9);
    }
}

//! Bollinger Bands: moving average +/- standard deviation multiplier.
//!
//! Three bands (separate Indicator instances):
//! - Middle: SMA(close, period)
//! - Upper: middle + mult * stddev(close, period)
//! - Lower: middle - mult * stddev(close, period)
//!
//! Uses population stddev (divide by N).
//! Lookback: period - 1.

use super::moving_average::rolling_apply;
use super::{Indicator, Ohlcv};

/// Which band of the Bollinger Bands to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
}

impl Bollinger {
    fn with_band(period: usize, multiplier: f64, band: BollingerBand) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self {
            period,
            multiplier,
            band,
        }
    }

    pub fn upper(period: usize, multiplier: f64) -> Self {
        Self::with_band(period, multiplier, BollingerBand::Upper)
    }

    pub fn middle(period: usize, multiplier: f64) -> Self {
        Self::with_band(period, multiplier, BollingerBand::Middle)
    }

    pub fn lower(period: usize, multiplier: f64) -> Self {
        Self::with_band(period, multiplier, BollingerBand::Lower)
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        match self.band {
            BollingerBand::Upper => "BB_upper",
            BollingerBand::Middle => "BB_middle",
            BollingerBand::Lower => "BB_lower",
        }
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let sign = match self.band {
            BollingerBand::Upper => 1.0,
            BollingerBand::Middle => 0.0,
            BollingerBand::Lower => -1.0,
        };
        let mult = self.multiplier;
        rolling_apply(&bars.close, self.period, |window| {
            let len = window.len() as f64;
            let mean = window.iter().sum::<f64>() / len;
            let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / len;
            mean + sign * mult * variance.sqrt()
        })
    }
}

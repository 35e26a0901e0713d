//! Aroon: time since the highest high and lowest low, as a percentage.
//!
//! Aroon Up = 100 * (period - bars_since_highest_high) / period
//! Aroon Down = 100 * (period - bars_since_lowest_low) / period
//! AROONOSC = Up - Down
//! The window spans period + 1 bars; ties resolve to the most recent bar.
//! Lookback: period.

use super::{Indicator, Ohlcv};

/// Which Aroon output to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AroonBand {
    Up,
    Down,
    Oscillator,
}

#[derive(Debug, Clone)]
pub struct Aroon {
    period: usize,
    band: AroonBand,
}

impl Aroon {
    fn with_band(period: usize, band: AroonBand) -> Self {
        assert!(period >= 1, "Aroon period must be >= 1");
        Self { period, band }
    }

    pub fn up(period: usize) -> Self {
        Self::with_band(period, AroonBand::Up)
    }

    pub fn down(period: usize) -> Self {
        Self::with_band(period, AroonBand::Down)
    }

    pub fn oscillator(period: usize) -> Self {
        Self::with_band(period, AroonBand::Oscillator)
    }
}

/// Position of the extreme within `window`, preferring the latest on ties.
fn extreme_offset(window: &[f64], better_or_equal: impl Fn(f64, f64) -> bool) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (j, &v) in window.iter().enumerate() {
        if v.is_nan() {
            return None;
        }
        match best {
            Some((_, b)) if !better_or_equal(v, b) => {}
            _ => best = Some((j, v)),
        }
    }
    best.map(|(j, _)| j)
}

fn aroon_line(values: &[f64], period: usize, highest: bool) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    for i in period..n {
        let window = &values[i - period..=i];
        let offset = if highest {
            extreme_offset(window, |v, b| v >= b)
        } else {
            extreme_offset(window, |v, b| v <= b)
        };
        if let Some(offset) = offset {
            // offset == period means the extreme is the current bar
            result[i] = 100.0 * offset as f64 / period as f64;
        }
    }
    result
}

impl Indicator for Aroon {
    fn name(&self) -> &str {
        match self.band {
            AroonBand::Up => "AROON_up",
            AroonBand::Down => "AROON_down",
            AroonBand::Oscillator => "AROONOSC",
        }
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        match self.band {
            AroonBand::Up => aroon_line(&bars.high, self.period, true),
            AroonBand::Down => aroon_line(&bars.low, self.period, false),
            AroonBand::Oscillator => {
                let up = aroon_line(&bars.high, self.period, true);
                let down = aroon_line(&bars.low, self.period, false);
                up.iter().zip(&down).map(|(u, d)| u - d).collect()
            }
        }
    }
}

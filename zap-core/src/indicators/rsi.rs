//! Relative Strength Index, `RSI_<p>`.
//!
//! Gains and losses of successive closes are smoothed separately with
//! Wilder's method (see `atr::wilder_smooth`), so the first value lands on
//! bar `p`. RSI = 100 - 100 / (1 + avg_gain / avg_loss).

use super::atr::wilder_smooth;
use super::{Indicator, Ohlcv};

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("RSI_{period}"),
        }
    }
}

/// Per-bar gain and loss of the close; bar 0 and any bar touching a NaN
/// close are NaN in both.
fn gains_and_losses(closes: &[f64]) -> (Vec<f64>, Vec<f64>) {
    std::iter::once((f64::NAN, f64::NAN))
        .chain(closes.windows(2).map(|w| {
            let ch = w[1] - w[0];
            if ch.is_nan() {
                (f64::NAN, f64::NAN)
            } else {
                (ch.max(0.0), (-ch).max(0.0))
            }
        }))
        .take(closes.len())
        .unzip()
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        let (gains, losses) = gains_and_losses(&bars.close);
        let avg_gain = wilder_smooth(&gains, self.period);
        let avg_loss = wilder_smooth(&losses, self.period);
        avg_gain
            .iter()
            .zip(&avg_loss)
            .map(|(g, l)| {
                if g.is_nan() || l.is_nan() {
                    f64::NAN
                } else {
                    strength_index(*g, *l)
                }
            })
            .collect()
    }
}

fn strength_index(avg_gain: f64, avg_loss: f64) -> f64 {
    match (avg_gain == 0.0, avg_loss == 0.0) {
        (true, true) => 50.0,
        (false, true) => 100.0,
        (true, false) => 0.0,
        (false, false) => 100.0 - 100.0 / (1.0 + avg_gain / avg_loss),
    }
}

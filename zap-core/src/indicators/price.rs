//! Price transforms; single-bar, no warm-up.

use super::{Indicator, Ohlcv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceKind {
    /// (open + high + low + close) / 4
    Average,
    /// (high + low) / 2
    Median,
    /// (high + low + close) / 3
    Typical,
    /// (high + low + 2 * close) / 4
    WeightedClose,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceTransform {
    kind: PriceKind,
}

impl PriceTransform {
    pub fn new(kind: PriceKind) -> Self {
        Self { kind }
    }
}

impl Indicator for PriceTransform {
    fn name(&self) -> &str {
        match self.kind {
            PriceKind::Average => "AVGPRICE",
            PriceKind::Median => "MEDPRICE",
            PriceKind::Typical => "TYPPRICE",
            PriceKind::WeightedClose => "WCLPRICE",
        }
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &Ohlcv) -> Vec<f64> {
        (0..bars.len())
            .map(|i| {
                let (o, h, l, c) = (bars.open[i], bars.high[i], bars.low[i], bars.close[i]);
                match self.kind {
                    PriceKind::Average => (o + h + l + c) / 4.0,
                    PriceKind::Median => (h + l) / 2.0,
                    PriceKind::Typical => (h + l + c) / 3.0,
                    PriceKind::WeightedClose => (h + l + 2.0 * c) / 4.0,
                }
            })
            .collect()
    }
}

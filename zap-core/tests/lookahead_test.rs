//! Look-ahead contamination tests for the indicator set.
//!
//! Invariant: no indicator value at bar t may depend on price data from bar
//! t+1 or later.
//!
//! Method: compute on truncated series (bars 0..100) and full series (bars 0..200).
//! Assert bars 0..100 are identical between both runs. Any difference means the
//! indicator is leaking future data into past values.

use chrono::NaiveDate;
use zap_core::indicators::*;
use zap_core::table::{Row, SeriesTable, MARKET_ATTRIBUTES};

/// Generate N bars of synthetic OHLCV data with realistic variation.
fn make_test_bars(n: usize) -> Ohlcv {
    let mut bars = Ohlcv::default();
    let mut price = 100.0;

    for i in 0..n {
        // Deterministic pseudo-random walk using a simple LCG
        let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
        let change = ((seed % 200) as f64 - 100.0) * 0.05;
        price = (price + change).max(10.0);

        let open = price - 0.5;
        let close = price + 0.3;
        bars.open.push(open);
        bars.high.push(open.max(close) + 2.0);
        bars.low.push(open.min(close) - 2.0);
        bars.close.push(close);
        bars.volume.push(1000.0 + i as f64 * 100.0);
    }

    bars
}

/// Assert that the indicator produces identical values for bars 0..truncated_len
/// whether computed on a truncated or full series.
fn assert_no_lookahead(indicator: &dyn Indicator, full_bars: &Ohlcv, truncated_len: usize) {
    let full_result = indicator.compute(full_bars);
    let truncated_result = indicator.compute(&full_bars.truncated(truncated_len));

    assert_eq!(
        truncated_result.len(),
        truncated_len,
        "{}: truncated result length mismatch",
        indicator.name()
    );
    assert_eq!(
        full_result.len(),
        full_bars.len(),
        "{}: full result length mismatch",
        indicator.name()
    );

    for i in 0..truncated_len {
        let t = truncated_result[i];
        let f = full_result[i];

        if t.is_nan() && f.is_nan() {
            continue;
        }

        assert!(
            !t.is_nan() && !f.is_nan(),
            "{}: NaN mismatch at bar {i} (truncated={t}, full={f})",
            indicator.name()
        );

        assert!(
            (t - f).abs() < 1e-10,
            "{}: look-ahead contamination at bar {i}: truncated={t}, full={f}, diff={}",
            indicator.name(),
            (t - f).abs()
        );
    }
}

#[test]
fn lookahead_default_set() {
    let bars = make_test_bars(200);
    for indicator in default_indicators() {
        assert_no_lookahead(indicator.as_ref(), &bars, 100);
    }
}

#[test]
fn lookahead_moving_averages_other_periods() {
    let bars = make_test_bars(200);
    for kind in [MaKind::Sma, MaKind::Ema, MaKind::Wma, MaKind::Dema, MaKind::Tema, MaKind::Trima] {
        assert_no_lookahead(&MovingAverage::new(kind, 5), &bars, 100);
        assert_no_lookahead(&MovingAverage::new(kind, 30), &bars, 100);
    }
}

#[test]
fn lookahead_adaptive_averages() {
    let bars = make_test_bars(200);
    assert_no_lookahead(&Kama::new(5), &bars, 100);
    assert_no_lookahead(&Kama::new(30), &bars, 100);
    assert_no_lookahead(&T3::new(5, 0.7), &bars, 100);
    assert_no_lookahead(&T3::new(8, 0.3), &bars, 100);
    assert_no_lookahead(&Mama::mama(0.3, 0.02), &bars, 100);
    assert_no_lookahead(&Mama::fama(0.3, 0.02), &bars, 60);
}

#[test]
fn lookahead_wilder_family_short_periods() {
    let bars = make_test_bars(200);
    assert_no_lookahead(&Rsi::new(7), &bars, 100);
    assert_no_lookahead(&Atr::new(5), &bars, 100);
    assert_no_lookahead(&Directional::new(DirectionalKind::Adx, 7), &bars, 100);
    assert_no_lookahead(&Directional::new(DirectionalKind::Adxr, 7), &bars, 100);
}

#[test]
fn lookahead_aroon_long_window() {
    let bars = make_test_bars(200);
    assert_no_lookahead(&Aroon::up(25), &bars, 100);
    assert_no_lookahead(&Aroon::down(25), &bars, 100);
    assert_no_lookahead(&Aroon::oscillator(25), &bars, 100);
}

/// The table-level pass must agree too: indicators computed on a table cut
/// at row 100 match the first 100 rows computed on the full table.
#[test]
fn lookahead_through_table() {
    let bars = make_test_bars(200);
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let columns: Vec<String> = MARKET_ATTRIBUTES.iter().map(|a| format!("SPY_{a}")).collect();
    let rows: Vec<Row> = (0..bars.len())
        .map(|i| {
            let (o, h, l, c, v) = (bars.open[i], bars.high[i], bars.low[i], bars.close[i], bars.volume[i]);
            Row::new(
                base + chrono::Duration::days(i as i64),
                vec![Some(o), Some(h), Some(l), Some(c), Some(c), Some(v)],
            )
        })
        .collect();
    let full = SeriesTable::with_rows(columns.clone(), rows.clone()).unwrap();
    let cut = SeriesTable::with_rows(columns, rows[..100].to_vec()).unwrap();

    let indicators = default_indicators();
    let full_ta = technical_analysis(&full, &indicators).unwrap().table;
    let cut_ta = technical_analysis(&cut, &indicators).unwrap().table;

    assert_eq!(cut_ta.columns(), full_ta.columns());
    for (a, b) in cut_ta.rows().iter().zip(full_ta.rows()) {
        assert_eq!(a.date, b.date);
        for (x, y) in a.values.iter().zip(&b.values) {
            match (x, y) {
                (None, None) => {}
                (Some(x), Some(y)) => assert!((x - y).abs() < 1e-10, "{} differs", a.date),
                _ => panic!("missing-value mismatch on {}", a.date),
            }
        }
    }
}

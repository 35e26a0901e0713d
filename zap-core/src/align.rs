//! Multi-ticker time alignment.
//!
//! Each ticker's fetch result is placed on a common date axis. Dates a ticker
//! did not report get missing cells; nothing is filled here.

use crate::calendar::business_days;
use crate::data::provider::FetchResult;
use crate::merge::FetchWindow;
use crate::table::{Row, SeriesTable, TableError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Which dates make up the aligned axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisPolicy {
    /// Union of every date any ticker reported.
    #[default]
    Union,
    /// Every Monday–Friday in the fetch window.
    BusinessDays,
}

/// Combine fetch results into one wide table, one column per
/// (ticker × attribute) in result order.
pub fn align_results(
    results: &[FetchResult],
    policy: AxisPolicy,
    window: FetchWindow,
) -> Result<SeriesTable, TableError> {
    let axis: Vec<NaiveDate> = match policy {
        AxisPolicy::Union => results
            .iter()
            .flat_map(|r| r.observations.iter().map(|o| o.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        AxisPolicy::BusinessDays => business_days(window.start, window.end),
    };

    let columns: Vec<String> = results
        .iter()
        .flat_map(|r| r.columns.iter().map(|c| c.header()))
        .collect();
    let width = columns.len();

    let mut rows: Vec<Row> = axis
        .iter()
        .map(|d| Row {
            date: *d,
            values: vec![None; width],
        })
        .collect();
    let position: HashMap<NaiveDate, usize> =
        axis.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut offset = 0;
    for result in results {
        let n = result.columns.len();
        for obs in &result.observations {
            let Some(&i) = position.get(&obs.date) else {
                continue;
            };
            for (k, v) in obs.values.iter().take(n).enumerate() {
                rows[i].values[offset + k] = *v;
            }
        }
        offset += n;
    }

    SeriesTable::with_rows(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataSource, Observation};
    use crate::table::ColumnKey;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn result(ticker: &str, points: &[(&str, f64)]) -> FetchResult {
        FetchResult {
            ticker: ticker.into(),
            columns: vec![ColumnKey::new(ticker, "Close")],
            observations: points
                .iter()
                .map(|(date, v)| Observation {
                    date: d(date),
                    values: vec![Some(*v)],
                })
                .collect(),
            source: DataSource::Scripted,
        }
    }

    fn window() -> FetchWindow {
        FetchWindow::new(d("2024-01-05"), d("2024-01-09"))
    }

    #[test]
    fn union_axis_marks_missing_dates() {
        let results = vec![
            result("SPY", &[("2024-01-05", 100.0), ("2024-01-08", 101.0)]),
            result("QQQ", &[("2024-01-08", 200.0)]),
        ];
        let t = align_results(&results, AxisPolicy::Union, window()).unwrap();
        assert_eq!(t.columns(), &["SPY_Close".to_string(), "QQQ_Close".to_string()]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "QQQ_Close"), None);
        assert_eq!(t.get(1, "QQQ_Close"), Some(200.0));
    }

    #[test]
    fn business_day_axis_covers_window() {
        let results = vec![result("DGS10", &[("2024-01-05", 4.0), ("2024-01-06", 9.9)])];
        let t = align_results(&results, AxisPolicy::BusinessDays, window()).unwrap();
        // Saturday observation falls off the axis
        assert_eq!(t.dates(), vec![d("2024-01-05"), d("2024-01-08")]);
        assert_eq!(t.get(1, "DGS10_Close"), None);
    }

    #[test]
    fn duplicate_tickers_are_rejected() {
        let results = vec![result("SPY", &[]), result("SPY", &[])];
        assert!(align_results(&results, AxisPolicy::Union, window()).is_err());
    }
}

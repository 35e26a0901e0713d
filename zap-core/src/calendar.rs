//! Date parsing and date-axis helpers.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};

/// Canonical on-disk date format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a date cell, truncating any time-of-day component.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM:SS`
/// (with optional fractional seconds). Returns `None` for blank or
/// unparseable input.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Parse a user-supplied `YYYY-MM-DD` argument strictly (no time component).
pub fn parse_day_arg(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// All Monday–Friday dates in `[start, end)`.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut d = start;
    while d < end {
        if is_business_day(d) {
            out.push(d);
        }
        match d.succ_opt() {
            Some(next) => d = next,
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn parses_plain_and_timestamped_dates() {
        assert_eq!(parse_date("2024-01-02"), Some(d("2024-01-02")));
        assert_eq!(parse_date("2024-01-02 00:00:00"), Some(d("2024-01-02")));
        assert_eq!(parse_date("2024-01-02T15:30:00"), Some(d("2024-01-02")));
        assert_eq!(parse_date(" 2024-01-02 "), Some(d("2024-01-02")));
    }

    #[test]
    fn rejects_blank_and_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn day_arg_is_strict() {
        assert!(parse_day_arg("2024-03-15").is_ok());
        assert!(parse_day_arg("15/03/2024").is_err());
        assert!(parse_day_arg("2024-03-15 10:00:00").is_err());
    }

    #[test]
    fn business_days_skip_weekends() {
        // 2024-01-05 is a Friday, 2024-01-08 a Monday
        let days = business_days(d("2024-01-05"), d("2024-01-09"));
        assert_eq!(days, vec![d("2024-01-05"), d("2024-01-08")]);
    }

    #[test]
    fn business_days_end_is_exclusive() {
        let days = business_days(d("2024-01-08"), d("2024-01-08"));
        assert!(days.is_empty());
    }
}

//! Row and column pruning for derived tables, plus the two side files that
//! carry pruning decisions between pipeline steps.
//!
//! - `missing_cells_count.txt`: a single non-negative integer, the number of
//!   leading rows to trim from the market-derived tables.
//! - `found_dates.txt`: one `YYYY-MM-DD` per line, the dates the economic
//!   tables are filtered down to. An optional `Date` header is accepted.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use crate::calendar::{format_date, parse_date};
use crate::table::{SeriesTable, DATE_COLUMN};

pub const GAP_COUNT_FILE: &str = "missing_cells_count.txt";
pub const FOUND_DATES_FILE: &str = "found_dates.txt";

#[derive(Debug, Error)]
pub enum PruneError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: expected a single non-negative integer, found '{found}'")]
    InvalidCount { path: PathBuf, found: String },

    #[error("{path}:{line}: '{found}' is not a YYYY-MM-DD date")]
    InvalidDate {
        path: PathBuf,
        line: usize,
        found: String,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PruneError + '_ {
    move |source| PruneError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Number of leading rows with at least one missing value. Counting stops at
/// the first fully populated row; later gaps do not contribute.
pub fn leading_gap_count(table: &SeriesTable) -> usize {
    table
        .rows()
        .iter()
        .take_while(|row| !row.is_complete())
        .count()
}

/// Remove the first `n` rows. Returns how many were actually removed.
pub fn trim_leading_rows(table: &mut SeriesTable, n: usize) -> usize {
    table.drop_leading(n)
}

pub fn write_gap_count(path: &Path, count: usize) -> Result<(), PruneError> {
    fs::write(path, format!("{count}\n")).map_err(io_error(path))
}

/// Read a gap count side file. Anything but one non-negative integer
/// (surrounding whitespace allowed) is rejected.
pub fn read_gap_count(path: &Path) -> Result<usize, PruneError> {
    let raw = fs::read_to_string(path).map_err(io_error(path))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PruneError::InvalidCount {
            path: path.to_path_buf(),
            found: trimmed.to_string(),
        });
    }
    trimmed.parse().map_err(|_| PruneError::InvalidCount {
        path: path.to_path_buf(),
        found: trimmed.to_string(),
    })
}

/// Dates of a table in row order.
pub fn date_list(table: &SeriesTable) -> Vec<NaiveDate> {
    table.dates()
}

pub fn write_date_list(path: &Path, dates: &[NaiveDate]) -> Result<(), PruneError> {
    let mut out = String::with_capacity(dates.len() * 11);
    for d in dates {
        out.push_str(&format_date(*d));
        out.push('\n');
    }
    fs::write(path, out).map_err(io_error(path))
}

/// Read a date list side file. Blank lines are ignored; a leading `Date`
/// header line is skipped.
pub fn read_date_list(path: &Path) -> Result<BTreeSet<NaiveDate>, PruneError> {
    let raw = fs::read_to_string(path).map_err(io_error(path))?;
    let mut dates = BTreeSet::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (idx == 0 && line == DATE_COLUMN) {
            continue;
        }
        let date = parse_date(line).ok_or_else(|| PruneError::InvalidDate {
            path: path.to_path_buf(),
            line: idx + 1,
            found: line.to_string(),
        })?;
        dates.insert(date);
    }
    Ok(dates)
}

/// Keep only rows whose date is in `dates`. Returns how many were removed.
pub fn retain_dates(table: &mut SeriesTable, dates: &BTreeSet<NaiveDate>) -> usize {
    let before = table.len();
    table.retain_rows(|row| dates.contains(&row.date));
    before - table.len()
}

/// Drop named columns; names the table does not have are logged and ignored.
pub fn drop_columns(table: &mut SeriesTable, names: &[String]) -> Vec<String> {
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let unknown = table.drop_columns(&refs);
    for name in &unknown {
        tracing::warn!(column = %name, "cannot drop column: not present");
    }
    unknown
}

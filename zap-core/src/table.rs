//! Series Table: the date-keyed wide table every pipeline step reads and writes.
//!
//! A table has a `Date` key column and any number of named value columns.
//! Cells are `Option<f64>`; `None` is a missing value. Non-finite floats are
//! never stored (they are normalized to `None` on the way in), which keeps
//! `PartialEq` meaningful for whole-table comparisons.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Header of the key column in every persisted table.
pub const DATE_COLUMN: &str = "Date";

/// Attributes a market provider returns per ticker, in column order.
pub const MARKET_ATTRIBUTES: [&str; 6] = ["Open", "High", "Low", "Close", "Adj Close", "Volume"];

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("row for {date} has {actual} values, table has {expected} columns")]
    WidthMismatch {
        date: NaiveDate,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("column '{0}' is reserved for the date key")]
    ReservedColumn(String),

    #[error("no column named '{0}'")]
    UnknownColumn(String),

    #[error("column '{name}' has {actual} values, table has {expected} rows")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Explicit identity of a value column: which series and which attribute.
///
/// Flattened on disk as `<series>_<attribute>`, or just `<series>` for
/// single-valued series such as economic indicators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    pub series: String,
    pub attribute: Option<String>,
}

impl ColumnKey {
    pub fn new(series: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            series: series.into(),
            attribute: Some(attribute.into()),
        }
    }

    pub fn bare(series: impl Into<String>) -> Self {
        Self {
            series: series.into(),
            attribute: None,
        }
    }

    pub fn header(&self) -> String {
        self.to_string()
    }

    /// Recover a key from a flattened header by matching one of the known
    /// attribute suffixes. Headers that end in no known attribute become bare keys.
    pub fn parse(header: &str, known_attributes: &[&str]) -> Self {
        for attr in known_attributes {
            if let Some(series) = header.strip_suffix(attr).and_then(|s| s.strip_suffix('_')) {
                if !series.is_empty() {
                    return Self::new(series, *attr);
                }
            }
        }
        Self::bare(header)
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attr) => write!(f, "{}_{}", self.series, attr),
            None => f.write_str(&self.series),
        }
    }
}

/// Map a raw float to a cell value.
pub fn cell(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// One dated row of a Series Table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

impl Row {
    pub fn new(date: NaiveDate, values: Vec<Option<f64>>) -> Self {
        let values = values.into_iter().map(|v| v.and_then(cell)).collect();
        Self { date, values }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Fraction of value cells that are missing. A row with no value
    /// columns counts as fully missing.
    pub fn missing_fraction(&self) -> f64 {
        if self.values.is_empty() {
            return 1.0;
        }
        self.missing_count() as f64 / self.values.len() as f64
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| v.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeriesTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl SeriesTable {
    /// Empty table with the given value columns.
    pub fn new(columns: Vec<String>) -> Result<Self, TableError> {
        check_columns(&columns)?;
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, TableError> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, row: Row) -> Result<(), TableError> {
        if row.values.len() != self.columns.len() {
            return Err(TableError::WidthMismatch {
                date: row.date,
                expected: self.columns.len(),
                actual: row.values.len(),
            });
        }
        self.rows.push(Row::new(row.date, row.values));
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Copy of a whole column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Column as `f64` with missing values as NaN, the representation the
    /// statistics and indicator kernels work on.
    pub fn column_f64(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.values[idx].unwrap_or(f64::NAN))
                .collect(),
        )
    }

    pub fn get(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.values[idx])
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).min()
    }

    /// Most recent date in the table, regardless of row order.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).max()
    }

    /// True when dates are strictly increasing (sorted and unique).
    pub fn is_sorted_unique(&self) -> bool {
        self.rows.windows(2).all(|w| w[0].date < w[1].date)
    }

    /// Stable sort by date; rows sharing a date keep their relative order.
    pub fn sort_by_date(&mut self) {
        self.rows.sort_by_key(|r| r.date);
    }

    /// Collapse duplicate dates keeping the last occurrence, and sort ascending.
    pub fn dedup_keep_last(&mut self) {
        let mut by_date: BTreeMap<NaiveDate, Row> = BTreeMap::new();
        for row in self.rows.drain(..) {
            by_date.insert(row.date, row);
        }
        self.rows = by_date.into_values().collect();
    }

    pub fn retain_rows(&mut self, mut keep: impl FnMut(&Row) -> bool) {
        self.rows.retain(|r| keep(r));
    }

    /// Remove the first `n` rows (saturating). Returns how many were removed.
    pub fn drop_leading(&mut self, n: usize) -> usize {
        let n = n.min(self.rows.len());
        self.rows.drain(..n);
        n
    }

    /// Append a value column. `values` must have one entry per row.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), TableError> {
        let name = name.into();
        if name == DATE_COLUMN {
            return Err(TableError::ReservedColumn(name));
        }
        if self.column_index(&name).is_some() {
            return Err(TableError::DuplicateColumn(name));
        }
        if values.len() != self.rows.len() {
            return Err(TableError::LengthMismatch {
                name,
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        self.columns.push(name);
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.values.push(v.and_then(cell));
        }
        Ok(())
    }

    /// Overwrite an existing column in place.
    pub fn set_column(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<(), TableError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        if values.len() != self.rows.len() {
            return Err(TableError::LengthMismatch {
                name: name.to_string(),
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.values[idx] = v.and_then(cell);
        }
        Ok(())
    }

    /// Remove the named columns. Returns the names that were not present.
    pub fn drop_columns(&mut self, names: &[&str]) -> Vec<String> {
        let present: HashSet<&str> = self.columns.iter().map(|c| c.as_str()).collect();
        let unknown: Vec<String> = names
            .iter()
            .filter(|n| !present.contains(**n))
            .map(|n| n.to_string())
            .collect();
        let drop: HashSet<&str> = names.iter().copied().collect();
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !drop.contains(c.as_str()))
            .collect();
        self.retain_columns(&keep);
        unknown
    }

    /// Remove columns with no value in any row. Returns the removed names.
    pub fn drop_empty_columns(&mut self) -> Vec<String> {
        let keep: Vec<bool> = (0..self.columns.len())
            .map(|i| self.rows.iter().any(|r| r.values[i].is_some()))
            .collect();
        let removed = self
            .columns
            .iter()
            .zip(&keep)
            .filter(|(_, k)| !**k)
            .map(|(c, _)| c.clone())
            .collect();
        self.retain_columns(&keep);
        removed
    }

    fn retain_columns(&mut self, keep: &[bool]) {
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.values.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// Project the table onto a new date axis. Dates absent from the table
    /// produce all-missing rows; dates not on the axis are dropped.
    pub fn reindex(&self, axis: &[NaiveDate]) -> SeriesTable {
        let lookup: HashMap<NaiveDate, &Row> = self.rows.iter().map(|r| (r.date, r)).collect();
        let rows = axis
            .iter()
            .map(|d| match lookup.get(d) {
                Some(r) => Row {
                    date: *d,
                    values: r.values.clone(),
                },
                None => Row {
                    date: *d,
                    values: vec![None; self.columns.len()],
                },
            })
            .collect();
        SeriesTable {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Deterministic BLAKE3 hash over headers, dates and cell bits.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for c in &self.columns {
            hasher.update(c.as_bytes());
            hasher.update(&[0]);
        }
        for row in &self.rows {
            hasher.update(row.date.to_string().as_bytes());
            for v in &row.values {
                match v {
                    Some(x) => {
                        hasher.update(&[1]);
                        hasher.update(&x.to_le_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn check_columns(columns: &[String]) -> Result<(), TableError> {
    let mut seen = HashSet::new();
    for c in columns {
        if c == DATE_COLUMN {
            return Err(TableError::ReservedColumn(c.clone()));
        }
        if !seen.insert(c.as_str()) {
            return Err(TableError::DuplicateColumn(c.clone()));
        }
    }
    Ok(())
}

//! Table store: Series Tables on disk as CSV or Parquet.
//!
//! Format is chosen by file extension (`.csv` or `.parquet`). Every write goes
//! to `<file>.tmp` and is renamed into place, so a failed write leaves the
//! previous table untouched. Each table gets a JSON metadata sidecar
//! `<file>.meta.json` with its date range, shape and content hash.

use crate::calendar::{format_date, parse_date};
use crate::table::{Row, SeriesTable, TableError, DATE_COLUMN};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("CSV error in {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("Parquet error in {path}: {message}")]
    Parquet { path: PathBuf, message: String },

    #[error("malformed table {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("unsupported table extension for {0} (expected .csv or .parquet)")]
    UnsupportedFormat(PathBuf),

    #[error("table not found: {0}")]
    NotFound(PathBuf),

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(TableFormat::Csv),
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => Ok(TableFormat::Parquet),
            _ => Err(StoreError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Metadata sidecar for a persisted table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub rows: usize,
    pub columns: usize,
    pub content_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

impl TableMeta {
    fn describe(path: &Path, table: &SeriesTable) -> Self {
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            first_date: table.first_date(),
            last_date: table.last_date(),
            rows: table.len(),
            columns: table.width(),
            content_hash: table.content_hash(),
            written_at: chrono::Local::now().naive_local(),
        }
    }
}

/// Path of the metadata sidecar for a table file.
pub fn meta_path(path: &Path) -> PathBuf {
    suffixed(path, ".meta.json")
}

fn tmp_path(path: &Path) -> PathBuf {
    suffixed(path, ".tmp")
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Load a table. A missing file is `Ok(None)`, not an error.
pub fn read_table(path: &Path) -> Result<Option<SeriesTable>, StoreError> {
    let format = TableFormat::from_path(path)?;
    if !path.exists() {
        return Ok(None);
    }
    let table = match format {
        TableFormat::Csv => read_csv(path)?,
        TableFormat::Parquet => read_parquet(path)?,
    };
    Ok(Some(table))
}

/// Load a table that must exist.
pub fn read_required(path: &Path) -> Result<SeriesTable, StoreError> {
    read_table(path)?.ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
}

/// Atomically write a table and its metadata sidecar.
pub fn write_table(path: &Path, table: &SeriesTable) -> Result<TableMeta, StoreError> {
    let format = TableFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let tmp = tmp_path(path);
    let written = match format {
        TableFormat::Csv => write_csv(&tmp, table),
        TableFormat::Parquet => write_parquet(&tmp, table),
    };
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    let meta = TableMeta::describe(path, table);
    let meta_file = meta_path(path);
    let json = serde_json::to_string_pretty(&meta).map_err(|e| StoreError::Malformed {
        path: meta_file.clone(),
        message: e.to_string(),
    })?;
    fs::write(&meta_file, json).map_err(io_err(&meta_file))?;

    tracing::debug!(
        path = %path.display(),
        rows = meta.rows,
        columns = meta.columns,
        "wrote table"
    );
    Ok(meta)
}

/// Read a sidecar, if present and parseable.
pub fn read_meta(path: &Path) -> Option<TableMeta> {
    let content = fs::read_to_string(meta_path(path)).ok()?;
    serde_json::from_str(&content).ok()
}

// ── CSV ─────────────────────────────────────────────────────────────

fn parse_cell(raw: &str) -> Option<Result<f64, std::num::ParseFloatError>> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(s.parse::<f64>())
}

fn read_csv(path: &Path) -> Result<SeriesTable, StoreError> {
    let csv_err = |e: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let date_idx = headers
        .iter()
        .position(|h| h.trim() == DATE_COLUMN)
        .ok_or_else(|| StoreError::Malformed {
            path: path.to_path_buf(),
            message: format!("no '{DATE_COLUMN}' column"),
        })?;
    let value_idx: Vec<usize> = (0..headers.len()).filter(|i| *i != date_idx).collect();
    let columns: Vec<String> = value_idx.iter().map(|i| headers[*i].trim().to_string()).collect();

    let mut table = SeriesTable::new(columns)?;
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let Some(date) = record.get(date_idx).and_then(parse_date) else {
            continue;
        };
        let mut values = Vec::with_capacity(value_idx.len());
        for &i in &value_idx {
            let raw = record.get(i).unwrap_or("");
            let value = match parse_cell(raw) {
                None => None,
                Some(Ok(v)) => Some(v),
                Some(Err(_)) => {
                    return Err(StoreError::Malformed {
                        path: path.to_path_buf(),
                        message: format!(
                            "non-numeric cell '{raw}' in column '{}' at data row {}",
                            &headers[i],
                            line + 1
                        ),
                    })
                }
            };
            values.push(value);
        }
        table.push(Row::new(date, values))?;
    }
    Ok(table)
}

fn write_csv(path: &Path, table: &SeriesTable) -> Result<(), StoreError> {
    let csv_err = |e: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;

    let mut header = Vec::with_capacity(table.width() + 1);
    header.push(DATE_COLUMN.to_string());
    header.extend(table.columns().iter().cloned());
    writer.write_record(&header).map_err(csv_err)?;

    for row in table.rows() {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(format_date(row.date));
        record.extend(row.values.iter().map(|v| match v {
            Some(x) => x.to_string(),
            None => String::new(),
        }));
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer.flush().map_err(io_err(path))?;
    Ok(())
}

// ── Parquet ─────────────────────────────────────────────────────────

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn write_parquet(path: &Path, table: &SeriesTable) -> Result<(), StoreError> {
    let pq_err = |e: PolarsError| StoreError::Parquet {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let epoch = unix_epoch();
    let days: Vec<i32> = table
        .rows()
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();

    let mut cols = Vec::with_capacity(table.width() + 1);
    cols.push(
        Column::new(DATE_COLUMN.into(), days)
            .cast(&DataType::Date)
            .map_err(pq_err)?,
    );
    for (i, name) in table.columns().iter().enumerate() {
        let values: Vec<Option<f64>> = table.rows().iter().map(|r| r.values[i]).collect();
        cols.push(Column::new(name.as_str().into(), values));
    }
    let mut df = DataFrame::new(cols).map_err(pq_err)?;

    let file = fs::File::create(path).map_err(io_err(path))?;
    ParquetWriter::new(file).finish(&mut df).map_err(pq_err)?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<SeriesTable, StoreError> {
    let pq_err = |e: PolarsError| StoreError::Parquet {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let file = fs::File::open(path).map_err(io_err(path))?;
    let df = ParquetReader::new(file).finish().map_err(pq_err)?;

    let date_col = df.column(DATE_COLUMN).map_err(|_| StoreError::Malformed {
        path: path.to_path_buf(),
        message: format!("no '{DATE_COLUMN}' column"),
    })?;
    let date_ca = date_col.date().map_err(pq_err)?;

    let mut names = Vec::new();
    let mut series = Vec::new();
    for col in df.get_columns() {
        if col.name().as_str() == DATE_COLUMN {
            continue;
        }
        let as_f64 = col.cast(&DataType::Float64).map_err(pq_err)?;
        let ca = as_f64.f64().map_err(pq_err)?;
        series.push((0..df.height()).map(|i| ca.get(i)).collect::<Vec<_>>());
        names.push(col.name().to_string());
    }

    let epoch = unix_epoch();
    let mut table = SeriesTable::new(names)?;
    for i in 0..df.height() {
        // Rows without a date are dropped, as with CSV.
        let Some(days) = date_ca.get(i) else {
            continue;
        };
        let date = epoch + chrono::Duration::days(i64::from(days));
        let values = series.iter().map(|s| s[i]).collect();
        table.push(Row::new(date, values))?;
    }
    Ok(table)
}

// ── Store rooted at a data directory ────────────────────────────────

/// Named tables under one data directory.
#[derive(Debug, Clone)]
pub struct TableStore {
    root: PathBuf,
}

/// Summary line for `zap status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatus {
    pub file: String,
    pub exists: bool,
    pub meta: Option<TableMeta>,
}

impl TableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    pub fn load(&self, file: &str) -> Result<Option<SeriesTable>, StoreError> {
        read_table(&self.path(file))
    }

    pub fn load_required(&self, file: &str) -> Result<SeriesTable, StoreError> {
        read_required(&self.path(file))
    }

    pub fn save(&self, file: &str, table: &SeriesTable) -> Result<TableMeta, StoreError> {
        write_table(&self.path(file), table)
    }

    pub fn status(&self, files: &[&str]) -> Vec<TableStatus> {
        files
            .iter()
            .map(|f| {
                let path = self.path(f);
                TableStatus {
                    file: f.to_string(),
                    exists: path.exists(),
                    meta: read_meta(&path),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample() -> SeriesTable {
        SeriesTable::with_rows(
            vec!["SPY_Close".into(), "SPY_Volume".into()],
            vec![
                Row::new(d("2024-01-02"), vec![Some(470.5), Some(1.0e6)]),
                Row::new(d("2024-01-03"), vec![None, Some(2.5e6)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_table(&dir.path().join("nope.csv")).unwrap().is_none());
        assert!(matches!(
            read_required(&dir.path().join("nope.csv")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            TableFormat::from_path(Path::new("data.xlsx")),
            Err(StoreError::UnsupportedFormat(_))
        ));
        assert_eq!(TableFormat::from_path(Path::new("a.CSV")).unwrap(), TableFormat::Csv);
    }

    #[test]
    fn csv_writes_flat_header_and_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &sample()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Date,SPY_Close,SPY_Volume"));
        assert_eq!(lines.next(), Some("2024-01-02,470.5,1000000"));
        assert_eq!(lines.next(), Some("2024-01-03,,2500000"));
    }

    #[test]
    fn csv_ingestion_truncates_times_and_drops_undated_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(
            &path,
            "Date,X\n2024-01-02 00:00:00,1.5\n,2.0\n2024-01-03,NaN\n",
        )
        .unwrap();
        let t = read_required(&path).unwrap();
        assert_eq!(t.dates(), vec![d("2024-01-02"), d("2024-01-03")]);
        assert_eq!(t.column("X").unwrap(), vec![Some(1.5), None]);
    }

    #[test]
    fn csv_rejects_garbage_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "Date,X\n2024-01-02,abc\n").unwrap();
        assert!(matches!(read_table(&path), Err(StoreError::Malformed { .. })));
    }

    #[test]
    fn meta_sidecar_describes_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let written = write_table(&path, &sample()).unwrap();
        let meta = read_meta(&path).unwrap();
        assert_eq!(meta, written);
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.columns, 2);
        assert_eq!(meta.last_date, Some(d("2024-01-03")));
        assert_eq!(meta.content_hash, sample().content_hash());
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &sample()).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(tmp_path(&path)).unwrap();
        let mut bigger = sample();
        bigger.push(Row::new(d("2024-01-04"), vec![Some(1.0), Some(1.0)])).unwrap();
        assert!(write_table(&path, &bigger).is_err());

        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn store_status_reports_missing_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        store.save("market_data.csv", &sample()).unwrap();
        let status = store.status(&["market_data.csv", "ta.csv"]);
        assert!(status[0].exists);
        assert_eq!(status[0].meta.as_ref().map(|m| m.rows), Some(2));
        assert!(!status[1].exists);
        assert!(status[1].meta.is_none());
    }
}

//! ZAP Core: series tables, the incremental merger, providers, statistics,
//! technical indicators and pruning.
//!
//! Everything here is deterministic except the `data` providers, which do
//! the network I/O. The merger and transforms take an explicit configuration
//! and a table and return a new table; persistence lives in `data::store`.

pub mod align;
pub mod calendar;
pub mod data;
pub mod indicators;
pub mod merge;
pub mod prune;
pub mod stats;
pub mod table;

pub use merge::{FetchWindow, WindowDecision};
pub use table::{ColumnKey, Row, SeriesTable, TableError};

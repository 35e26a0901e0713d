//! Batch assembly: join the pipeline's tables side by side on dates.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use zap_core::table::{Row, SeriesTable, TableError};

#[derive(Debug, Error, PartialEq)]
pub enum BatchError {
    #[error("batch needs at least one input table")]
    NoInputs,

    #[error("column '{column}' appears in both {first} and {second}")]
    DuplicateColumn {
        column: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Join named tables onto `axis`.
///
/// Rows are exactly the axis dates. Each input contributes all of its value
/// columns in its own order; dates the input lacks become missing cells. A
/// column name present in two inputs is an error naming both.
pub fn assemble(
    axis: &[NaiveDate],
    inputs: &[(String, SeriesTable)],
) -> Result<SeriesTable, BatchError> {
    if inputs.is_empty() {
        return Err(BatchError::NoInputs);
    }

    let mut owner: HashMap<&str, &str> = HashMap::new();
    for (name, table) in inputs {
        for column in table.columns() {
            if let Some(first) = owner.insert(column.as_str(), name.as_str()) {
                return Err(BatchError::DuplicateColumn {
                    column: column.clone(),
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
        }
    }

    let mut out = SeriesTable::with_rows(
        Vec::new(),
        axis.iter().map(|d| Row::new(*d, Vec::new())).collect(),
    )?;
    for (name, table) in inputs {
        let aligned = table.reindex(axis);
        let present: HashSet<NaiveDate> = table.dates().into_iter().collect();
        let missing = axis.iter().filter(|d| !present.contains(d)).count();
        if missing > 0 {
            tracing::debug!(input = %name, missing, "dates absent from input");
        }
        for column in aligned.columns() {
            let values = aligned.column(column).unwrap_or_default();
            out.add_column(column.clone(), values)?;
        }
    }
    Ok(out)
}

//! Reads the input table into [`Record`]s.

use std::path::Path;

use tracing::{debug, warn};

use crate::table::read_table;

use super::{ColumnMap, InputError, Record};

/// The loaded input: header row plus records.
#[derive(Debug, Clone)]
pub struct InputTable {
    /// Input columns in input order.
    pub headers: Vec<String>,
    /// Records with a non-empty code, in input order.
    pub records: Vec<Record>,
    /// Rows dropped because their code cell was empty.
    pub skipped_rows: usize,
}

/// Loads the input table and validates that the required columns exist.
///
/// Rows with an empty code are dropped with a warning since they cannot be
/// tracked by the resume ledger.
///
/// # Errors
///
/// Returns [`InputError`] when the file is unreadable, malformed, or lacks a
/// required column. All of these are fatal to the run.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn read_records(path: &Path, columns: &ColumnMap) -> Result<InputTable, InputError> {
    let table = read_table(path)?;

    for column in columns.required() {
        if table.column_index(column).is_none() {
            return Err(InputError::missing_column(path, column));
        }
    }
    if table.column_index(&columns.name_foreign).is_none() {
        debug!(column = %columns.name_foreign, "Foreign name column absent; foreign-name search disabled");
    }

    let mut records = Vec::with_capacity(table.len());
    let mut skipped_rows = 0usize;
    for (index, row) in table.rows.iter().enumerate() {
        let record = Record::from_row(&table.headers, row, columns);
        if record.code.is_empty() {
            warn!(row = index + 2, "Skipping input row without a drug code");
            skipped_rows += 1;
            continue;
        }
        records.push(record);
    }

    debug!(records = records.len(), skipped_rows, "Loaded input table");
    Ok(InputTable {
        headers: table.headers,
        records,
        skipped_rows,
    })
}

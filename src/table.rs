//! Minimal CSV table loading shared by the record source, the cache table,
//! the resume ledger and the summary command.
//!
//! Rows shorter than the header are padded with empty cells; a leading UTF-8
//! byte-order mark on the first header is dropped.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// UTF-8 byte-order mark written at the start of new sink files.
pub const UTF8_BOM: &str = "\u{feff}";

/// Errors raised while reading a CSV table.
#[derive(Debug, Error)]
pub enum TableError {
    /// The file could not be opened or read.
    #[error("cannot read table {path}: {source}\n  Suggestion: Check the path and file permissions")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid CSV.
    #[error("malformed CSV in {path}: {source}\n  Suggestion: Re-export the file as UTF-8 CSV")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// An in-memory CSV table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Position of a column by exact header name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads a whole CSV file with a header row.
///
/// # Errors
///
/// Returns [`TableError::Io`] when the file cannot be opened and
/// [`TableError::Csv`] when a record cannot be decoded.
pub fn read_table(path: &Path) -> Result<Table, TableError> {
    let file = std::fs::File::open(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(file);

    let csv_error = |source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();
    if let Some(first) = headers.first_mut()
        && let Some(stripped) = first.strip_prefix(UTF8_BOM)
    {
        *first = stripped.to_string();
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.len() < headers.len() {
            row.resize(headers.len(), String::new());
        }
        rows.push(row);
    }

    Ok(Table { headers, rows })
}

//! Errors for loading the input table.

use std::path::PathBuf;

use thiserror::Error;

use crate::table::TableError;

/// Run-fatal problems with the input table.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input file could not be read or parsed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// A required column is absent from the header row.
    #[error(
        "input table {path} is missing required column '{column}'\n  Suggestion: Rename the column or pass the matching --*-column option"
    )]
    MissingColumn { path: PathBuf, column: String },
}

impl InputError {
    /// Creates a `MissingColumn` error.
    #[must_use]
    pub fn missing_column(path: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            path: path.into(),
            column: column.into(),
        }
    }
}

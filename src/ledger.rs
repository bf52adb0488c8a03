//! Resume ledger: which drug codes already have output.
//!
//! Both sinks are read once at run start. The resulting [`ResumeIndex`] is
//! immutable for the rest of the run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::record::Record;
use crate::sink::SinkPaths;
use crate::table::{TableError, read_table};

/// Errors reading existing sinks. Run-fatal.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Table(#[from] TableError),

    /// An existing sink has no code column, so its rows cannot be matched.
    #[error(
        "existing output {path} has no '{column}' column\n  Suggestion: Move the file aside or run with --demo to start fresh"
    )]
    MissingKeyColumn { path: PathBuf, column: String },
}

/// Set of drug codes already present in either sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeIndex {
    codes: HashSet<String>,
}

/// Records left to process after applying a [`ResumeIndex`].
#[derive(Debug, Clone, Default)]
pub struct PendingRecords {
    /// Records to process, in input order.
    pub records: Vec<Record>,
    /// Input records skipped because a sink already has their code.
    pub already_resolved: usize,
    /// Input records skipped because an earlier input row had the same code.
    pub duplicates: usize,
}

impl ResumeIndex {
    /// Builds an index from known codes.
    #[must_use]
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads both sinks (either may be absent) and collects their codes.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when an existing sink is unreadable or lacks
    /// the code column.
    #[tracing::instrument(skip_all)]
    pub fn load(paths: &SinkPaths, code_column: &str) -> Result<Self, LedgerError> {
        let mut codes = HashSet::new();
        for path in paths.all() {
            let found = read_sink_codes(path, code_column)?;
            debug!(path = %path.display(), codes = found.len(), "Read existing output");
            codes.extend(found);
        }
        info!(resolved = codes.len(), "Resume index built");
        Ok(Self { codes })
    }

    /// Returns true if `code` already has output.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    /// Number of known codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns true when no output exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Drops records that already have output and repeated codes within the input.
    ///
    /// The first occurrence of a code in the input is kept.
    #[must_use]
    pub fn filter(&self, records: Vec<Record>) -> PendingRecords {
        let mut pending = PendingRecords::default();
        let mut seen: HashSet<String> = HashSet::new();

        for record in records {
            if self.contains(&record.code) {
                pending.already_resolved += 1;
            } else if !seen.insert(record.code.clone()) {
                debug!(code = %record.code, "Duplicate code in input; keeping first occurrence");
                pending.duplicates += 1;
            } else {
                pending.records.push(record);
            }
        }
        pending
    }
}

fn read_sink_codes(path: &Path, code_column: &str) -> Result<Vec<String>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let table = read_table(path)?;
    if table.is_empty() && table.headers.iter().all(String::is_empty) {
        return Ok(Vec::new());
    }
    let Some(index) = table.column_index(code_column) else {
        return Err(LedgerError::MissingKeyColumn {
            path: path.to_path_buf(),
            column: code_column.to_string(),
        });
    };

    Ok(table
        .rows
        .iter()
        .filter_map(|row| row.get(index).map(|code| code.trim()))
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect())
}

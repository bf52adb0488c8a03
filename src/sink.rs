//! Append-only output sinks with batched flushing.
//!
//! Outcomes are buffered per sink. Once the combined buffered count reaches
//! the batch size, both buffers are appended to their files and cleared. New
//! files get a UTF-8 byte-order mark and the header row; existing files are
//! only ever appended to, and only when their header matches the run's
//! output columns. A file holding nothing but a byte-order mark counts as new.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::fields::TargetField;
use crate::orchestrator::{OutcomeKind, ProcessingOutcome};
use crate::table::UTF8_BOM;

/// File name of the complete sink inside the output directory.
pub const COMPLETE_SINK_FILE: &str = "drug_info_extracted_final.csv";

/// File name of the incomplete sink inside the output directory.
pub const INCOMPLETE_SINK_FILE: &str = "drug_info_incomplete.csv";

/// Default batch size.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Errors writing to a sink. Run-fatal.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}\n  Suggestion: Check permissions or choose another --output-dir")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sink file could not be opened, written or removed.
    #[error("cannot write sink {path}: {source}\n  Suggestion: Check disk space and file permissions")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An existing sink was written with a different column layout.
    #[error(
        "existing output {path} has columns [{found}] but this run writes [{expected}]\n  Suggestion: Use the input columns of earlier runs, or move the file aside"
    )]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// CSV encoding failed.
    #[error("cannot encode rows for sink {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Locations of the two sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkPaths {
    pub complete: PathBuf,
    pub incomplete: PathBuf,
}

impl SinkPaths {
    /// Default sink files inside `output_dir`.
    #[must_use]
    pub fn in_dir(output_dir: &Path) -> Self {
        Self {
            complete: output_dir.join(COMPLETE_SINK_FILE),
            incomplete: output_dir.join(INCOMPLETE_SINK_FILE),
        }
    }

    /// Both paths, complete first.
    #[must_use]
    pub fn all(&self) -> [&Path; 2] {
        [&self.complete, &self.incomplete]
    }

    /// Deletes both sinks if present (demo reset). Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] when an existing sink cannot be removed.
    pub fn remove_existing(&self) -> Result<usize, SinkError> {
        let mut removed = 0;
        for path in self.all() {
            if path.exists() {
                std::fs::remove_file(path).map_err(|source| SinkError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!(path = %path.display(), "Removed previous output (demo reset)");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Output columns: input columns in order, then any target column the input lacks.
#[must_use]
pub fn output_columns(input_headers: &[String]) -> Vec<String> {
    let mut columns = input_headers.to_vec();
    for field in TargetField::ALL {
        if !columns.iter().any(|column| column == field.column_name()) {
            columns.push(field.column_name().to_string());
        }
    }
    columns
}

/// Rows appended by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub complete: usize,
    pub incomplete: usize,
}

impl FlushReport {
    /// Total rows appended.
    #[must_use]
    pub fn total(&self) -> usize {
        self.complete + self.incomplete
    }
}

/// Buffers outcomes and appends them to the two sinks in batches.
#[derive(Debug)]
pub struct BatchWriter {
    paths: SinkPaths,
    columns: Vec<String>,
    batch_size: usize,
    complete: Vec<Vec<String>>,
    incomplete: Vec<Vec<String>>,
    complete_has_header: bool,
    incomplete_has_header: bool,
    flush_count: usize,
    totals: FlushReport,
}

impl BatchWriter {
    /// Creates a writer for records read with `input_headers`.
    ///
    /// `batch_size` is clamped to at least 1. Existing sinks are checked
    /// against the output columns up front.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::HeaderMismatch`] when an existing sink has other
    /// columns, and [`SinkError::Io`] / [`SinkError::Csv`] when it cannot be read.
    pub fn new(paths: SinkPaths, input_headers: &[String], batch_size: usize) -> Result<Self, SinkError> {
        let columns = output_columns(input_headers);
        let complete_has_header = check_existing_header(&paths.complete, &columns)?;
        let incomplete_has_header = check_existing_header(&paths.incomplete, &columns)?;
        Ok(Self {
            paths,
            columns,
            batch_size: batch_size.max(1),
            complete: Vec::new(),
            incomplete: Vec::new(),
            complete_has_header,
            incomplete_has_header,
            flush_count: 0,
            totals: FlushReport::default(),
        })
    }

    /// Buffers one outcome, flushing both buffers when the batch is full.
    ///
    /// Returns the flush report when a flush happened.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the flush fails.
    pub fn push(&mut self, outcome: &ProcessingOutcome) -> Result<Option<FlushReport>, SinkError> {
        let row = self.encode_row(outcome);
        match outcome.kind {
            OutcomeKind::Complete => self.complete.push(row),
            OutcomeKind::Incomplete => self.incomplete.push(row),
        }

        if self.buffered() >= self.batch_size {
            return self.flush().map(Some);
        }
        Ok(None)
    }

    /// Appends both buffers to their sinks and clears them.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when a sink cannot be written.
    pub fn flush(&mut self) -> Result<FlushReport, SinkError> {
        let report = FlushReport {
            complete: self.complete.len(),
            incomplete: self.incomplete.len(),
        };
        if report.total() == 0 {
            return Ok(report);
        }

        append_rows(
            &self.paths.complete,
            &self.columns,
            &self.complete,
            &mut self.complete_has_header,
        )?;
        append_rows(
            &self.paths.incomplete,
            &self.columns,
            &self.incomplete,
            &mut self.incomplete_has_header,
        )?;
        self.complete.clear();
        self.incomplete.clear();

        self.flush_count += 1;
        self.totals.complete += report.complete;
        self.totals.incomplete += report.incomplete;
        info!(
            complete = report.complete,
            incomplete = report.incomplete,
            flush = self.flush_count,
            "Flushed batch"
        );
        Ok(report)
    }

    /// Final unconditional flush; returns the rows written over the writer's life.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the final flush fails.
    pub fn finish(mut self) -> Result<FlushReport, SinkError> {
        self.flush()?;
        Ok(self.totals)
    }

    /// Outcomes buffered and not yet written.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.complete.len() + self.incomplete.len()
    }

    /// Number of non-empty flushes so far.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    /// Rows written so far.
    #[must_use]
    pub fn totals(&self) -> FlushReport {
        self.totals
    }

    fn encode_row(&self, outcome: &ProcessingOutcome) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| {
                TargetField::ALL
                    .into_iter()
                    .find(|field| field.column_name() == column)
                    .map_or_else(
                        || outcome.record.attribute(column).unwrap_or_default().to_string(),
                        |field| outcome.fields.get(field).to_cell(),
                    )
            })
            .collect()
    }
}

/// Returns true when `path` already carries a header equal to `columns`.
///
/// Missing files and files without any header cell (empty, or only a
/// byte-order mark) return false.
fn check_existing_header(path: &Path, columns: &[String]) -> Result<bool, SinkError> {
    let Some(found) = read_existing_header(path)? else {
        return Ok(false);
    };
    if found != columns {
        return Err(SinkError::HeaderMismatch {
            path: path.to_path_buf(),
            expected: columns.join(","),
            found: found.join(","),
        });
    }
    Ok(true)
}

fn read_existing_header(path: &Path) -> Result<Option<Vec<String>>, SinkError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SinkError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let mut record = csv::StringRecord::new();
    let has_record = reader.read_record(&mut record).map_err(|source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    if !has_record {
        return Ok(None);
    }

    let header: Vec<String> = record
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let cell = if index == 0 {
                cell.strip_prefix(UTF8_BOM).unwrap_or(cell)
            } else {
                cell
            };
            cell.trim().to_string()
        })
        .collect();
    if header.iter().all(String::is_empty) {
        return Ok(None);
    }
    Ok(Some(header))
}

/// Appends `rows` with a single write. A sink without a header is rewritten
/// from scratch with the byte-order mark and header in front of the rows.
fn append_rows(
    path: &Path,
    columns: &[String],
    rows: &[Vec<String>],
    has_header: &mut bool,
) -> Result<(), SinkError> {
    if rows.is_empty() {
        return Ok(());
    }
    let io_error = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_error = |source| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let write_header = !*has_header;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if write_header {
        writer.write_record(columns).map_err(csv_error)?;
    }
    for row in rows {
        writer.write_record(row).map_err(csv_error)?;
    }
    let body = writer.into_inner().map_err(|error| io_error(error.into_error()))?;

    let mut bytes = Vec::with_capacity(UTF8_BOM.len() + body.len());
    if write_header {
        bytes.extend_from_slice(UTF8_BOM.as_bytes());
    }
    bytes.extend_from_slice(&body);

    let mut options = OpenOptions::new();
    options.create(true);
    if write_header {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    let mut file = options.open(path).map_err(io_error)?;
    file.write_all(&bytes).map_err(io_error)?;
    *has_header = true;

    debug!(path = %path.display(), rows = rows.len(), header = write_header, "Appended rows");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fields::{FieldTriple, FieldValue};
    use crate::record::{ColumnMap, Record};
    use crate::table::read_table;
    use tempfile::TempDir;

    fn headers() -> Vec<String> {
        ColumnMap::default().required().iter().map(|c| (*c).to_string()).collect()
    }

    fn outcome(code: &str, complete: bool) -> ProcessingOutcome {
        let headers = headers();
        let row = vec![code.to_string(), "藥".to_string(), "M1".to_string(), "I1".to_string()];
        let record = Record::from_row(&headers, &row, &ColumnMap::default());
        let (fields, kind) = if complete {
            (FieldTriple::uniform(&FieldValue::Resolved("ok".to_string())), OutcomeKind::Complete)
        } else {
            (FieldTriple::default(), OutcomeKind::Incomplete)
        };
        ProcessingOutcome {
            record,
            fields,
            kind,
            stages_run: Vec::new(),
        }
    }

    #[test]
    fn test_output_columns_appends_missing_targets_only() {
        let input = vec!["藥品代號".to_string(), "用法用量".to_string()];
        assert_eq!(output_columns(&input), vec!["藥品代號", "用法用量", "適應症", "注意事項"]);
    }

    #[test]
    fn test_flush_boundary_and_final_flush() {
        let dir = TempDir::new().unwrap();
        let paths = SinkPaths::in_dir(dir.path());
        let mut writer = BatchWriter::new(paths.clone(), &headers(), 2).unwrap();

        assert_eq!(writer.push(&outcome("A1", true)).unwrap(), None);
        let report = writer.push(&outcome("A2", false)).unwrap().unwrap();
        assert_eq!(report, FlushReport { complete: 1, incomplete: 1 });
        assert_eq!(writer.push(&outcome("A3", true)).unwrap(), None);
        assert_eq!(writer.flush_count(), 1);
        assert_eq!(writer.buffered(), 1);

        let totals = writer.finish().unwrap();
        assert_eq!(totals, FlushReport { complete: 2, incomplete: 1 });

        let complete = read_table(&paths.complete).unwrap();
        assert_eq!(complete.len(), 2);
        assert_eq!(complete.headers.last().unwrap(), "注意事項");
        assert_eq!(complete.rows[1][0], "A3");
    }

    #[test]
    fn test_new_file_gets_bom_and_single_header() {
        let dir = TempDir::new().unwrap();
        let paths = SinkPaths::in_dir(dir.path());

        for code in ["A1", "A2"] {
            let mut writer = BatchWriter::new(paths.clone(), &headers(), 10).unwrap();
            writer.push(&outcome(code, false)).unwrap();
            writer.finish().unwrap();
        }

        let raw = std::fs::read_to_string(&paths.incomplete).unwrap();
        assert!(raw.starts_with(UTF8_BOM));
        assert_eq!(raw.matches("藥品代號").count(), 1, "header written once");
        assert!(raw.contains("資訊不足"));
        assert!(!paths.complete.exists(), "empty buffer creates no file");
    }

    #[test]
    fn test_sink_holding_only_bom_gets_header() {
        let dir = TempDir::new().unwrap();
        let paths = SinkPaths::in_dir(dir.path());
        std::fs::write(&paths.incomplete, UTF8_BOM).unwrap();

        let mut writer = BatchWriter::new(paths.clone(), &headers(), 10).unwrap();
        writer.push(&outcome("A1", false)).unwrap();
        writer.finish().unwrap();

        let raw = std::fs::read_to_string(&paths.incomplete).unwrap();
        assert_eq!(raw.matches(UTF8_BOM).count(), 1);
        let table = read_table(&paths.incomplete).unwrap();
        assert_eq!(table.headers[0], "藥品代號");
        assert_eq!(table.rows[0][0], "A1");
    }

    #[test]
    fn test_existing_sink_with_other_columns_is_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = SinkPaths::in_dir(dir.path());
        std::fs::write(&paths.complete, "\u{feff}藥品代號,備註\nA1,x\n").unwrap();

        let err = BatchWriter::new(paths.clone(), &headers(), 10).unwrap_err();

        assert!(matches!(err, SinkError::HeaderMismatch { ref path, .. } if *path == paths.complete));
        assert_eq!(std::fs::read_to_string(&paths.complete).unwrap(), "\u{feff}藥品代號,備註\nA1,x\n");
    }

    #[test]
    fn test_remove_existing_deletes_both_sinks() {
        let dir = TempDir::new().unwrap();
        let paths = SinkPaths::in_dir(dir.path());
        std::fs::write(&paths.complete, "x").unwrap();
        std::fs::write(&paths.incomplete, "y").unwrap();

        assert_eq!(paths.remove_existing().unwrap(), 2);
        assert_eq!(paths.remove_existing().unwrap(), 0);
    }
}

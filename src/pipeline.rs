//! End-to-end run: resume ledger, fallback chain, batched sinks.
//!
//! All configuration arrives in one [`RunSettings`] value built by the caller;
//! nothing here reads process-wide state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::diagnostics::DiagnosticSink;
use crate::ledger::{LedgerError, ResumeIndex};
use crate::net::{FetchError, HttpSettings, RetryPolicy};
use crate::orchestrator::{FallbackOrchestrator, ProcessingOutcome};
use crate::probe::{
    CacheProbe, DEFAULT_MODEL, DEFAULT_MODEL_URL, DEFAULT_RESULTS_PER_QUERY,
    DEFAULT_SEARCH_ENDPOINT, DEFAULT_STRUCTURED_API_URL, ExtractionModelProbe, HtmlSearchEngine,
    HttpPageFetcher, OllamaClient, SearchStep, StructuredApiProbe, WebSearchProbe,
};
use crate::record::{ColumnMap, InputError, read_records};
use crate::sink::{BatchWriter, DEFAULT_BATCH_SIZE, SinkError, SinkPaths};
use crate::table::{TableError, read_table};

/// Default record limit for demo runs.
pub const DEFAULT_DEMO_LIMIT: usize = 10;

/// Default per-request timeout for network probes.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// File name of the offline cache table inside the output directory.
pub const CACHE_TABLE_FILE: &str = "search_results_cache.csv";

/// Run-fatal pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    /// A network component could not be set up.
    #[error(transparent)]
    Setup(#[from] FetchError),
}

/// Web search and extraction model configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSearchSettings {
    pub search_endpoint: String,
    pub model_url: String,
    pub model: String,
    pub results_per_query: usize,
    /// Random delay range before each page fetch; `None` disables it.
    pub polite_delay: Option<(Duration, Duration)>,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            model_url: DEFAULT_MODEL_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            results_per_query: DEFAULT_RESULTS_PER_QUERY,
            polite_delay: Some((Duration::from_secs(1), Duration::from_secs(3))),
        }
    }
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Cache table; defaults to [`CACHE_TABLE_FILE`] in the output directory.
    pub cache_table: Option<PathBuf>,
    pub columns: ColumnMap,
    pub batch_size: usize,
    /// `Some(n)`: demo reset, then process at most `n` records in one batch.
    pub demo_limit: Option<usize>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub api_url: String,
    /// `None` disables the three web search stages.
    pub web_search: Option<WebSearchSettings>,
}

impl RunSettings {
    /// Settings with built-in defaults for `input` and `output_dir`.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            cache_table: None,
            columns: ColumnMap::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            demo_limit: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            api_url: DEFAULT_STRUCTURED_API_URL.to_string(),
            web_search: Some(WebSearchSettings::default()),
        }
    }

    /// Effective cache table path.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.cache_table
            .clone()
            .unwrap_or_else(|| self.output_dir.join(CACHE_TABLE_FILE))
    }

    /// Sink locations.
    #[must_use]
    pub fn sink_paths(&self) -> SinkPaths {
        SinkPaths::in_dir(&self.output_dir)
    }

    /// Batch size after demo adjustment.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.demo_limit.unwrap_or(self.batch_size).max(1)
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Input rows with a code.
    pub total_input: usize,
    /// Input rows dropped for lacking a code.
    pub skipped_rows: usize,
    /// Records skipped because a sink already had their code.
    pub already_resolved: usize,
    /// Records skipped as repeated codes within the input.
    pub duplicates: usize,
    pub processed: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub flushes: usize,
}

/// Hooks for progress reporting.
pub trait RunObserver {
    /// Called once with the number of records about to be processed.
    fn on_start(&mut self, pending: usize) {
        let _ = pending;
    }

    /// Called after each record is processed and buffered.
    fn on_record(&mut self, outcome: &ProcessingOutcome) {
        let _ = outcome;
    }
}

impl RunObserver for () {}

/// Builds the default probe chain for `settings`.
///
/// # Errors
///
/// Returns [`FetchError::ClientBuild`] when an HTTP client cannot be built.
pub fn build_orchestrator(
    settings: &RunSettings,
    diagnostics: &DiagnosticSink,
) -> Result<FallbackOrchestrator, FetchError> {
    let http = HttpSettings::with_request_timeout(settings.request_timeout);
    let mut orchestrator = FallbackOrchestrator::new();

    orchestrator.register(Box::new(CacheProbe::load(
        &settings.cache_path(),
        &settings.columns.code,
    )));
    orchestrator.register(Box::new(StructuredApiProbe::new(
        &settings.api_url,
        &http,
        settings.retry.clone(),
        diagnostics.clone(),
    )?));

    match &settings.web_search {
        Some(web) => {
            let engine = Arc::new(HtmlSearchEngine::new(
                &web.search_endpoint,
                &http,
                settings.retry.clone(),
            )?);
            let fetcher = Arc::new(
                HttpPageFetcher::new(&http, settings.retry.clone())?
                    .with_polite_delay(web.polite_delay),
            );
            let model = Arc::new(OllamaClient::new(&web.model_url, &web.model)?);
            let extractor = Arc::new(ExtractionModelProbe::new(model, diagnostics.clone()));

            for step in SearchStep::ALL {
                orchestrator.register(Box::new(
                    WebSearchProbe::new(
                        step,
                        engine.clone(),
                        fetcher.clone(),
                        Arc::clone(&extractor),
                    )
                    .with_results_per_query(web.results_per_query),
                ));
            }
        }
        None => info!("Web search disabled; search stages skipped"),
    }

    debug!(stages = ?orchestrator.stages(), "Probe chain ready");
    Ok(orchestrator)
}

/// Runs the whole pipeline with the default probe chain.
///
/// # Errors
///
/// Returns [`PipelineError`] for run-fatal conditions only: unreadable input,
/// unreadable existing output, output directory or sink write failures, and
/// HTTP client setup failures. Per-record failures never surface here.
pub async fn run_pipeline(
    settings: &RunSettings,
    observer: &mut dyn RunObserver,
) -> Result<RunSummary, PipelineError> {
    let diagnostics = DiagnosticSink::new(&settings.output_dir);
    let orchestrator = build_orchestrator(settings, &diagnostics)?;
    run_with_orchestrator(settings, &orchestrator, observer).await
}

/// Runs the pipeline with a caller-provided chain.
///
/// # Errors
///
/// See [`run_pipeline`].
#[tracing::instrument(skip_all, fields(input = %settings.input.display(), output_dir = %settings.output_dir.display()))]
pub async fn run_with_orchestrator(
    settings: &RunSettings,
    orchestrator: &FallbackOrchestrator,
    observer: &mut dyn RunObserver,
) -> Result<RunSummary, PipelineError> {
    let input = read_records(&settings.input, &settings.columns)?;

    ensure_output_dir(&settings.output_dir)?;
    let sink_paths = settings.sink_paths();
    if settings.demo_limit.is_some() {
        sink_paths.remove_existing()?;
    }

    let index = ResumeIndex::load(&sink_paths, &settings.columns.code)?;
    let total_input = input.records.len();
    let mut pending = index.filter(input.records);
    if let Some(limit) = settings.demo_limit {
        pending.records.truncate(limit);
    }

    let mut summary = RunSummary {
        total_input,
        skipped_rows: input.skipped_rows,
        already_resolved: pending.already_resolved,
        duplicates: pending.duplicates,
        ..RunSummary::default()
    };
    info!(
        total_input,
        already_resolved = summary.already_resolved,
        pending = pending.records.len(),
        "Starting enrichment"
    );

    let mut writer = BatchWriter::new(sink_paths, &input.headers, settings.effective_batch_size())?;
    observer.on_start(pending.records.len());

    for record in pending.records {
        let outcome = orchestrator.process(record).await;
        summary.processed += 1;
        if outcome.is_complete() {
            summary.complete += 1;
        } else {
            summary.incomplete += 1;
        }
        writer.push(&outcome)?;
        observer.on_record(&outcome);
    }

    writer.flush()?;
    summary.flushes = writer.flush_count();

    info!(
        processed = summary.processed,
        complete = summary.complete,
        incomplete = summary.incomplete,
        "Enrichment finished"
    );
    Ok(summary)
}

fn ensure_output_dir(dir: &Path) -> Result<(), SinkError> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| SinkError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    info!(dir = %dir.display(), "Created output directory");
    Ok(())
}

/// Row counts of the output files; `None` means the file is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputSummary {
    pub complete: Option<usize>,
    pub incomplete: Option<usize>,
    pub cache: Option<usize>,
}

/// Counts rows in both sinks and the cache table.
///
/// # Errors
///
/// Returns [`TableError`] when an existing file cannot be read.
pub fn summarize_outputs(sinks: &SinkPaths, cache_table: &Path) -> Result<OutputSummary, TableError> {
    Ok(OutputSummary {
        complete: count_rows(&sinks.complete)?,
        incomplete: count_rows(&sinks.incomplete)?,
        cache: count_rows(cache_table)?,
    })
}

fn count_rows(path: &Path) -> Result<Option<usize>, TableError> {
    if !path.exists() {
        return Ok(None);
    }
    read_table(path).map(|table| Some(table.len()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_settings_defaults() {
        let settings = RunSettings::new("in.csv", "out");
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.cache_path(), PathBuf::from("out").join(CACHE_TABLE_FILE));
        assert!(settings.web_search.is_some());
        assert_eq!(settings.api_url, DEFAULT_STRUCTURED_API_URL);
    }

    #[test]
    fn test_effective_batch_size_uses_demo_limit() {
        let mut settings = RunSettings::new("in.csv", "out");
        settings.demo_limit = Some(4);
        assert_eq!(settings.effective_batch_size(), 4);
    }

    #[test]
    fn test_summarize_outputs_reports_absent_files() {
        let dir = TempDir::new().unwrap();
        let sinks = SinkPaths::in_dir(dir.path());
        std::fs::write(&sinks.complete, "藥品代號\nA1\nA2\n").unwrap();

        let summary = summarize_outputs(&sinks, &dir.path().join(CACHE_TABLE_FILE)).unwrap();

        assert_eq!(
            summary,
            OutputSummary {
                complete: Some(2),
                incomplete: None,
                cache: None,
            }
        );
    }

    #[test]
    fn test_build_orchestrator_without_web_search_has_two_stages() {
        let dir = TempDir::new().unwrap();
        let mut settings = RunSettings::new(dir.path().join("in.csv"), dir.path());
        settings.web_search = None;

        let orchestrator = build_orchestrator(&settings, &DiagnosticSink::disabled()).unwrap();

        assert_eq!(orchestrator.probe_count(), 2);
    }

    #[test]
    fn test_build_orchestrator_with_web_search_has_five_stages() {
        let dir = TempDir::new().unwrap();
        let settings = RunSettings::new(dir.path().join("in.csv"), dir.path());

        let orchestrator = build_orchestrator(&settings, &DiagnosticSink::disabled()).unwrap();

        assert_eq!(orchestrator.probe_count(), 5);
    }
}

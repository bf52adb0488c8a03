//! Drug Enricher Core Library
//!
//! Fills three clinical fields (indication, dosage, precautions) for every
//! product in a catalog table by consulting an ordered chain of sources and
//! stopping as soon as all three are known.
//!
//! # Architecture
//!
//! - [`record`] - Input table loading and column mapping
//! - [`fields`] - Field values and the per-record field triple
//! - [`completeness`] - Completeness evaluation of a triple
//! - [`probe`] - Source probes (cache, structured API, web search + model)
//! - [`orchestrator`] - Ordered fallback over registered probes
//! - [`net`] - HTTP client construction and retry policy
//! - [`ledger`] - Resume index built from existing sinks
//! - [`sink`] - Batched, append-only complete/incomplete sinks
//! - [`diagnostics`] - Raw-body side-channel for format failures
//! - [`pipeline`] - One end-to-end run over an input table

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod completeness;
pub mod diagnostics;
pub mod fields;
pub mod ledger;
pub mod net;
pub mod orchestrator;
pub mod pipeline;
pub mod probe;
pub mod record;
pub mod sink;
pub mod table;

// Re-export commonly used types
pub use completeness::{CompletenessReport, FieldStatus, evaluate, is_complete};
pub use diagnostics::DiagnosticSink;
pub use fields::{FieldErrorKind, FieldTriple, FieldValue, PartialFields, SENTINEL_TEXT, TargetField};
pub use ledger::{LedgerError, ResumeIndex};
pub use net::{FailureType, FetchError, RetryDecision, RetryPolicy, classify_error};
pub use orchestrator::{FallbackOrchestrator, OutcomeKind, ProcessingOutcome};
pub use pipeline::{
    OutputSummary, PipelineError, RunObserver, RunSettings, RunSummary, WebSearchSettings,
    build_orchestrator, run_pipeline, run_with_orchestrator, summarize_outputs,
};
pub use probe::{ProbeError, ProbeStage, SourceProbe};
pub use record::{ColumnMap, InputError, Record, read_records};
pub use sink::{BatchWriter, SinkError, SinkPaths};

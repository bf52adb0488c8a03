//! Fallback orchestrator: runs the probe chain for one record at a time.
//!
//! Stages run in [`ProbeStage`] order. After each merge the completeness
//! check decides whether to continue; a stage is skipped when the record lacks
//! the attribute it queries by. Records missing a critical attribute bypass
//! the chain entirely.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::completeness::{evaluate, is_complete};
use crate::fields::{FieldErrorKind, FieldTriple, FieldValue};
use crate::probe::{ProbeStage, SourceProbe};
use crate::record::Record;

/// Sink routing of a processed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Complete,
    Incomplete,
}

/// A record merged with its final fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    pub record: Record,
    pub fields: FieldTriple,
    pub kind: OutcomeKind,
    /// Stages whose probe actually ran, in order.
    pub stages_run: Vec<ProbeStage>,
}

impl ProcessingOutcome {
    fn new(record: Record, fields: FieldTriple, stages_run: Vec<ProbeStage>) -> Self {
        let kind = if is_complete(&fields) {
            OutcomeKind::Complete
        } else {
            OutcomeKind::Incomplete
        };
        Self {
            record,
            fields,
            kind,
            stages_run,
        }
    }

    /// Returns true when routed to the complete sink.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.kind == OutcomeKind::Complete
    }
}

/// Stage-ordered probe chain.
pub struct FallbackOrchestrator {
    probes: Vec<Box<dyn SourceProbe>>,
}

impl FallbackOrchestrator {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self { probes: Vec::new() }
    }

    /// Adds a probe; the chain stays sorted by stage, registration order breaking ties.
    #[tracing::instrument(skip(self, probe), fields(probe_name = probe.name(), stage = %probe.stage()))]
    pub fn register(&mut self, probe: Box<dyn SourceProbe>) {
        debug!("Registering probe");
        self.probes.push(probe);
        self.probes.sort_by_key(|probe| probe.stage());
    }

    /// Number of registered probes.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    /// Stages of the registered probes, in chain order.
    #[must_use]
    pub fn stages(&self) -> Vec<ProbeStage> {
        self.probes.iter().map(|probe| probe.stage()).collect()
    }

    /// Processes one record to completion.
    ///
    /// Never fails: a probe error or panic ends the chain for this record and
    /// marks all three fields with the generic processing error.
    #[tracing::instrument(skip(self, record), fields(code = %record.code))]
    pub async fn process(&self, record: Record) -> ProcessingOutcome {
        let missing = record.missing_critical_attributes();
        if !missing.is_empty() {
            info!(missing = ?missing, "Missing critical input; skipping all sources");
            let fields = FieldTriple::uniform(&FieldValue::Error(FieldErrorKind::MissingCriticalInput));
            return ProcessingOutcome::new(record, fields, Vec::new());
        }

        let mut fields = FieldTriple::default();
        let mut stages_run = Vec::new();

        for probe in &self.probes {
            if is_complete(&fields) {
                break;
            }
            if !probe.is_applicable(&record) {
                debug!(stage = %probe.stage(), "Stage not applicable; skipping");
                continue;
            }

            stages_run.push(probe.stage());
            let attempt = AssertUnwindSafe(probe.probe(&record, &fields))
                .catch_unwind()
                .await;
            let Ok(result) = attempt else {
                error!(stage = %probe.stage(), "Probe panicked; record marked incomplete");
                let fields = FieldTriple::uniform(&FieldValue::Error(FieldErrorKind::Unexpected));
                return ProcessingOutcome::new(record, fields, stages_run);
            };
            match result {
                Ok(partial) => {
                    let newly_resolved = fields.merge(&partial);
                    debug!(
                        stage = %probe.stage(),
                        newly_resolved,
                        missing = ?evaluate(&fields).missing_fields(),
                        "Merged stage result"
                    );
                }
                Err(error) => {
                    warn!(stage = %probe.stage(), error = %error, "Probe failed; record marked incomplete");
                    let fields = FieldTriple::uniform(&FieldValue::Error(FieldErrorKind::Unexpected));
                    return ProcessingOutcome::new(record, fields, stages_run);
                }
            }
        }

        let outcome = ProcessingOutcome::new(record, fields, stages_run);
        debug!(
            complete = outcome.is_complete(),
            stages = outcome.stages_run.len(),
            "Record processed"
        );
        outcome
    }
}

impl std::fmt::Debug for FallbackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.probes.iter().map(|probe| probe.name()).collect();
        f.debug_struct("FallbackOrchestrator")
            .field("probe_count", &self.probes.len())
            .field("probes", &names)
            .finish()
    }
}

impl Default for FallbackOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

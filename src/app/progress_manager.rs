//! Progress bar for enrichment runs.

use std::time::Duration;

use drug_enricher::{ProcessingOutcome, RunObserver};
use indicatif::{ProgressBar, ProgressStyle};

/// Drives an `indicatif` bar from pipeline events; inert when disabled.
pub(crate) struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub(crate) fn new(use_progress_bar: bool) -> Self {
        Self {
            bar: use_progress_bar.then(ProgressBar::hidden),
        }
    }

    pub(crate) fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl RunObserver for ProgressReporter {
    fn on_start(&mut self, pending: usize) {
        let Some(bar) = &self.bar else {
            return;
        };
        bar.set_length(pending as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn on_record(&mut self, outcome: &ProcessingOutcome) {
        let Some(bar) = &self.bar else {
            return;
        };
        bar.inc(1);
        let status = if outcome.is_complete() { "complete" } else { "incomplete" };
        bar.set_message(format!("{} {status}", outcome.record.code));
    }
}

//! Search-fetch-extract probe, instantiated once per [`SearchStep`].

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::fields::{FieldTriple, PartialFields};
use crate::record::Record;

use super::{
    ExtractionDomain, ExtractionModelProbe, PageFetcher, ProbeError, ProbeStage, SearchEngine,
    SourceProbe,
};

/// Result URLs requested per query.
pub const DEFAULT_RESULTS_PER_QUERY: usize = 3;

/// Which record attribute drives the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStep {
    LocalName,
    ForeignName,
    Ingredient,
}

impl SearchStep {
    /// All steps in chain order.
    pub const ALL: [SearchStep; 3] = [Self::LocalName, Self::ForeignName, Self::Ingredient];

    /// Chain position of this step.
    #[must_use]
    pub fn stage(self) -> ProbeStage {
        match self {
            Self::LocalName => ProbeStage::LocalNameSearch,
            Self::ForeignName => ProbeStage::ForeignNameSearch,
            Self::Ingredient => ProbeStage::IngredientSearch,
        }
    }

    /// The record attribute this step searches by.
    #[must_use]
    pub fn query_term(self, record: &Record) -> &str {
        match self {
            Self::LocalName => record.name_local.trim(),
            Self::ForeignName => record.name_foreign.trim(),
            Self::Ingredient => record.ingredient.trim(),
        }
    }

    /// Query text: the term plus step-specific augmentation.
    #[must_use]
    pub fn build_query(self, term: &str) -> String {
        let suffix = match self {
            Self::LocalName => " 用法 用量 劑量 服用方法 適應症 副作用 禁忌",
            Self::ForeignName => " dosage administration contraindications side effects",
            Self::Ingredient => {
                " prescribing information dosage site:drugs.com OR site:medscape.com OR site:webmd.com"
            }
        };
        format!("{term}{suffix}")
    }

    /// Instruction variant for content found by this step.
    #[must_use]
    pub fn domain(self) -> ExtractionDomain {
        match self {
            Self::LocalName => ExtractionDomain::General,
            Self::ForeignName | Self::Ingredient => ExtractionDomain::TranslateThenExtract,
        }
    }
}

/// Searches the web for one record attribute and extracts fields from the pages found.
pub struct WebSearchProbe {
    step: SearchStep,
    engine: Arc<dyn SearchEngine>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<ExtractionModelProbe>,
    results_per_query: usize,
}

impl WebSearchProbe {
    /// Creates the probe for `step`; capabilities are shared across steps.
    #[must_use]
    pub fn new(
        step: SearchStep,
        engine: Arc<dyn SearchEngine>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<ExtractionModelProbe>,
    ) -> Self {
        Self {
            step,
            engine,
            fetcher,
            extractor,
            results_per_query: DEFAULT_RESULTS_PER_QUERY,
        }
    }

    /// Overrides the number of result URLs requested per query.
    #[must_use]
    pub fn with_results_per_query(mut self, results_per_query: usize) -> Self {
        self.results_per_query = results_per_query.max(1);
        self
    }

    /// Fetches each URL and concatenates the readable text in source blocks.
    async fn gather_content(&self, urls: &[String]) -> String {
        let mut combined = String::new();
        for (index, url) in urls.iter().enumerate() {
            if is_pdf(url) {
                debug!(url = %url, "Skipping PDF result");
                continue;
            }
            match self.fetcher.fetch_text(url).await {
                Ok(text) if !text.trim().is_empty() => {
                    let _ = write!(combined, "--- 來源 {}: {url} ---\n{text}\n\n", index + 1);
                }
                Ok(_) => debug!(url = %url, "Fetched page had no readable text"),
                Err(error) => warn!(url = %url, error = %error, "Page fetch failed; skipping"),
            }
        }
        combined
    }
}

fn is_pdf(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".pdf")
}

impl std::fmt::Debug for WebSearchProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchProbe")
            .field("step", &self.step)
            .field("results_per_query", &self.results_per_query)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceProbe for WebSearchProbe {
    fn name(&self) -> &'static str {
        self.step.stage().as_str()
    }

    fn stage(&self) -> ProbeStage {
        self.step.stage()
    }

    fn is_applicable(&self, record: &Record) -> bool {
        !self.step.query_term(record).is_empty()
    }

    #[tracing::instrument(skip(self, record, _current), fields(probe = %self.step.stage(), code = %record.code))]
    async fn probe(
        &self,
        record: &Record,
        _current: &FieldTriple,
    ) -> Result<PartialFields, ProbeError> {
        let query = self.step.build_query(self.step.query_term(record));

        let urls = match self.engine.search(&query, self.results_per_query).await {
            Ok(urls) => urls,
            Err(error) => {
                warn!(error = %error, "Search failed; treating as no results");
                return Ok(PartialFields::empty());
            }
        };
        if urls.is_empty() {
            info!("Search returned no URLs");
            return Ok(PartialFields::empty());
        }

        let content = self.gather_content(&urls).await;
        if content.is_empty() {
            info!(urls = urls.len(), "No readable content from search results");
            return Ok(PartialFields::empty());
        }

        Ok(self
            .extractor
            .extract(&content, self.step.domain(), &record.code)
            .await)
    }
}

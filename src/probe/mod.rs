//! Source probes: one information channel each, tried in stage order.
//!
//! # Architecture
//!
//! - [`SourceProbe`] - Async trait every channel implements
//! - [`ProbeStage`] - Fixed position of a probe in the fallback chain
//! - [`CacheProbe`] - Offline table of prior results keyed by drug code
//! - [`StructuredApiProbe`] - Open-data JSON endpoint with entry matching
//! - [`WebSearchProbe`] - Search, fetch and extract, one instance per [`SearchStep`]
//! - [`ExtractionModelProbe`] - Turns unstructured text into a field triple via an [`LlmClient`]
//!
//! A probe reports only the fields it could say something about. Network and
//! format failures are absorbed inside the probe as an empty result; an
//! `Err` from [`SourceProbe::probe`] means something unexpected happened and
//! ends processing for that record.

mod cache;
mod error;
mod extraction;
mod llm;
mod search;
mod structured_api;
mod web_search;

pub use cache::CacheProbe;
pub use error::{ModelError, ProbeError};
pub use extraction::{
    ExtractionDomain, ExtractionModelProbe, MAX_MODEL_CONTENT_CHARS, NormalizedReply,
    build_prompt, normalize_model_reply,
};
pub use llm::{DEFAULT_MODEL, DEFAULT_MODEL_URL, LlmClient, OllamaClient};
pub use search::{
    DEFAULT_SEARCH_ENDPOINT, HtmlSearchEngine, HttpPageFetcher, MAX_PAGE_CHARS, PageFetcher,
    SearchEngine, extract_readable_text,
};
pub use structured_api::{
    ApiEntry, DEFAULT_STRUCTURED_API_URL, MatchQuery, StructuredApiProbe, find_matching_entry,
};
pub use web_search::{DEFAULT_RESULTS_PER_QUERY, SearchStep, WebSearchProbe};

use std::fmt;

use async_trait::async_trait;

use crate::fields::{FieldTriple, PartialFields};
use crate::record::Record;

/// Position of a probe in the fallback chain.
///
/// Derives `Ord` so that sorting yields chain order: cache first, ingredient
/// search last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProbeStage {
    Cache = 0,
    StructuredApi = 1,
    LocalNameSearch = 2,
    ForeignNameSearch = 3,
    IngredientSearch = 4,
}

impl ProbeStage {
    /// Stable name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::StructuredApi => "structured_api",
            Self::LocalNameSearch => "local_name_search",
            Self::ForeignNameSearch => "foreign_name_search",
            Self::IngredientSearch => "ingredient_search",
        }
    }
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait that every information channel implements.
///
/// # Object Safety
///
/// Uses `async_trait` so probes can be held as `Box<dyn SourceProbe>` in the
/// orchestrator's chain.
#[async_trait]
pub trait SourceProbe: Send + Sync {
    /// Returns the probe's name (e.g. "cache", "structured_api").
    fn name(&self) -> &str;

    /// Returns the probe's chain position.
    fn stage(&self) -> ProbeStage;

    /// Returns false when the record lacks the attribute this probe queries by.
    fn is_applicable(&self, record: &Record) -> bool {
        let _ = record;
        true
    }

    /// Attempts to resolve fields for `record`.
    ///
    /// `current` holds the fields merged so far; probes may use it to skip
    /// work but must not assume it is complete.
    async fn probe(
        &self,
        record: &Record,
        current: &FieldTriple,
    ) -> Result<PartialFields, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_stage_ordering_matches_chain() {
        let mut stages = vec![
            ProbeStage::IngredientSearch,
            ProbeStage::Cache,
            ProbeStage::ForeignNameSearch,
            ProbeStage::StructuredApi,
            ProbeStage::LocalNameSearch,
        ];
        stages.sort();
        assert_eq!(
            stages,
            vec![
                ProbeStage::Cache,
                ProbeStage::StructuredApi,
                ProbeStage::LocalNameSearch,
                ProbeStage::ForeignNameSearch,
                ProbeStage::IngredientSearch,
            ]
        );
    }

    #[test]
    fn test_probe_stage_display() {
        assert_eq!(ProbeStage::ForeignNameSearch.to_string(), "foreign_name_search");
    }
}

//! Open-data drug registry probe.
//!
//! The endpoint returns one large JSON array of license entries. The array is
//! fetched on first use and kept for the rest of the run; failed fetches are
//! not kept, so the next record tries again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::fields::{FieldTriple, FieldValue, PartialFields, TargetField};
use crate::net::{
    FetchError, HttpSettings, RetryPolicy, build_http_client, default_api_user_agent,
    run_with_retry,
};
use crate::record::Record;

use super::{ProbeError, ProbeStage, SourceProbe};

/// Default registry export (JSON array of drug license entries).
pub const DEFAULT_STRUCTURED_API_URL: &str =
    "https://data.fda.gov.tw/opendata/exportDataList.do?method=openData&InfoId=36";

const ATTR_NAME_LOCAL: &str = "中文品名";
const ATTR_NAME_FOREIGN: &str = "英文品名";
const ATTR_MANUFACTURER: &str = "製造廠名稱";
const ATTR_APPLICANT: &str = "申請商名稱";
const ATTR_INGREDIENT: &str = "成份";

/// One registry entry: its string-valued attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiEntry {
    attributes: HashMap<String, String>,
}

impl ApiEntry {
    /// Builds an entry from attribute pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attributes: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    fn from_json(object: &serde_json::Map<String, Value>) -> Self {
        Self::from_pairs(
            object
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|text| (key.clone(), text.to_string()))),
        )
    }

    /// Attribute value, or `""` when absent.
    #[must_use]
    pub fn get(&self, attribute: &str) -> &str {
        self.attributes.get(attribute).map_or("", String::as_str)
    }

    /// Maps the entry's target attributes onto all three fields.
    ///
    /// Missing or blank attributes become [`FieldValue::Sentinel`].
    #[must_use]
    pub fn to_fields(&self) -> PartialFields {
        let mut fields = PartialFields::empty();
        for field in TargetField::ALL {
            fields.set(field, FieldValue::from_text(self.get(field.column_name())));
        }
        fields
    }
}

/// Case-folded, whitespace-free query terms for entry matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    name: String,
    manufacturer: String,
    ingredient: String,
}

impl MatchQuery {
    /// Builds the query from a record's local name, manufacturer and ingredient.
    ///
    /// Returns `None` when the name normalizes to nothing, since no entry
    /// could then satisfy the name condition.
    #[must_use]
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = normalize(&record.name_local);
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            manufacturer: normalize(&record.manufacturer),
            ingredient: normalize(&record.ingredient),
        })
    }

    /// `name_match AND (manufacturer_match OR ingredient_match)`.
    #[must_use]
    pub fn matches(&self, entry: &ApiEntry) -> bool {
        let contains = |attribute: &str, needle: &str| {
            !needle.is_empty() && normalize(entry.get(attribute)).contains(needle)
        };

        let name_match =
            contains(ATTR_NAME_LOCAL, &self.name) || contains(ATTR_NAME_FOREIGN, &self.name);
        let manufacturer_match = contains(ATTR_MANUFACTURER, &self.manufacturer)
            || contains(ATTR_APPLICANT, &self.manufacturer);
        let ingredient_match = contains(ATTR_INGREDIENT, &self.ingredient);

        name_match && (manufacturer_match || ingredient_match)
    }
}

/// Returns the first entry, in source order, that satisfies `query`.
#[must_use]
pub fn find_matching_entry<'a>(entries: &'a [ApiEntry], query: &MatchQuery) -> Option<&'a ApiEntry> {
    entries.iter().find(|entry| query.matches(entry))
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Probe backed by the open-data registry endpoint.
pub struct StructuredApiProbe {
    client: Client,
    url: String,
    policy: RetryPolicy,
    diagnostics: DiagnosticSink,
    entries: Mutex<Option<Arc<Vec<ApiEntry>>>>,
}

impl StructuredApiProbe {
    /// Creates a probe for `url` (use [`DEFAULT_STRUCTURED_API_URL`] in production).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if HTTP client construction fails.
    #[tracing::instrument(skip_all, fields(url = %url))]
    pub fn new(
        url: &str,
        settings: &HttpSettings,
        policy: RetryPolicy,
        diagnostics: DiagnosticSink,
    ) -> Result<Self, FetchError> {
        let client = build_http_client("structured_api", &default_api_user_agent(), settings)?;
        Ok(Self {
            client,
            url: url.to_string(),
            policy,
            diagnostics,
            entries: Mutex::new(None),
        })
    }

    async fn fetch_entries(&self) -> Result<Vec<ApiEntry>, FetchError> {
        debug!(url = %self.url, "Calling structured API");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(&self.url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&self.url, e))?;

        parse_entries(&self.url, &content_type, body)
    }

    async fn cached_entries(&self, code: &str) -> Result<Option<Arc<Vec<ApiEntry>>>, ProbeError> {
        let memo = self.lock_entries(code)?.clone();
        if memo.is_some() {
            return Ok(memo);
        }

        match run_with_retry(&self.policy, "structured_api", || self.fetch_entries()).await {
            Ok(entries) => {
                info!(entries = entries.len(), "Loaded structured API entries");
                let entries = Arc::new(entries);
                *self.lock_entries(code)? = Some(Arc::clone(&entries));
                Ok(Some(entries))
            }
            Err((error, attempts)) => {
                if let Some(body) = error.diagnostic_body() {
                    self.diagnostics
                        .record(DiagnosticKind::StructuredApi, code, body);
                }
                warn!(attempts, error = %error, "Structured API unavailable; treating as no match");
                Ok(None)
            }
        }
    }

    fn lock_entries(
        &self,
        code: &str,
    ) -> Result<std::sync::MutexGuard<'_, Option<Arc<Vec<ApiEntry>>>>, ProbeError> {
        self.entries
            .lock()
            .map_err(|_| ProbeError::unexpected("structured_api", code, "entry cache lock poisoned"))
    }
}

impl std::fmt::Debug for StructuredApiProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredApiProbe")
            .field("url", &self.url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Validates and decodes a registry response body.
fn parse_entries(url: &str, content_type: &str, body: String) -> Result<Vec<ApiEntry>, FetchError> {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    let declared_json = content_type.to_ascii_lowercase().contains("json");
    if !declared_json && !trimmed.starts_with('[') {
        return Err(FetchError::InvalidContentType {
            url: url.to_string(),
            content_type: content_type.to_string(),
            body,
        });
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(error) => {
            return Err(FetchError::InvalidJson {
                url: url.to_string(),
                reason: error.to_string(),
                body,
            });
        }
    };

    let Value::Array(items) = value else {
        return Err(FetchError::InvalidJson {
            url: url.to_string(),
            reason: "expected a JSON array of entries".to_string(),
            body,
        });
    };

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .map(ApiEntry::from_json)
        .collect())
}

#[async_trait]
impl SourceProbe for StructuredApiProbe {
    fn name(&self) -> &'static str {
        "structured_api"
    }

    fn stage(&self) -> ProbeStage {
        ProbeStage::StructuredApi
    }

    #[tracing::instrument(skip(self, record, _current), fields(probe = "structured_api", code = %record.code))]
    async fn probe(
        &self,
        record: &Record,
        _current: &FieldTriple,
    ) -> Result<PartialFields, ProbeError> {
        let Some(query) = MatchQuery::from_record(record) else {
            return Ok(PartialFields::empty());
        };
        let Some(entries) = self.cached_entries(&record.code).await? else {
            return Ok(PartialFields::empty());
        };

        match find_matching_entry(&entries, &query) {
            Some(entry) => {
                info!(entry = entry.get(ATTR_NAME_LOCAL), "Structured API entry matched");
                Ok(entry.to_fields())
            }
            None => {
                debug!("No structured API entry matched");
                Ok(PartialFields::empty())
            }
        }
    }
}

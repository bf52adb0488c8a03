//! Offline cache of prior results, keyed by drug code.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::fields::{FieldTriple, FieldValue, PartialFields, TargetField};
use crate::record::Record;
use crate::table::read_table;

use super::{ProbeError, ProbeStage, SourceProbe};

/// Looks up records in a precomputed results table. No network.
#[derive(Debug, Clone, Default)]
pub struct CacheProbe {
    entries: HashMap<String, PartialFields>,
}

impl CacheProbe {
    /// Creates a cache from `(code, fields)` pairs; the first entry per code wins.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (String, PartialFields)>) -> Self {
        let mut map = HashMap::new();
        for (code, fields) in entries {
            map.entry(code).or_insert(fields);
        }
        Self { entries: map }
    }

    /// Loads the cache table at `path`, keyed by `code_column`.
    ///
    /// A missing file yields an empty cache silently. An unreadable file or
    /// one without the key column is logged and also yields an empty cache.
    #[must_use]
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, code_column: &str) -> Self {
        if !path.exists() {
            debug!("No cache table; cache stage will be empty");
            return Self::default();
        }

        let table = match read_table(path) {
            Ok(table) => table,
            Err(error) => {
                warn!(error = %error, "Cache table unreadable; continuing without cache");
                return Self::default();
            }
        };

        let Some(code_index) = table.column_index(code_column) else {
            warn!(
                column = code_column,
                "Cache table lacks the code column; continuing without cache"
            );
            return Self::default();
        };

        let field_indexes: Vec<(TargetField, usize)> = TargetField::ALL
            .into_iter()
            .filter_map(|field| table.column_index(field.column_name()).map(|i| (field, i)))
            .collect();

        let entries = table.rows.iter().filter_map(|row| {
            let code = row.get(code_index)?.trim();
            if code.is_empty() {
                return None;
            }
            let mut fields = PartialFields::empty();
            for (field, index) in &field_indexes {
                if let Some(value) = row.get(*index).and_then(|cell| FieldValue::from_cell(cell)) {
                    fields.set(*field, value);
                }
            }
            Some((code.to_string(), fields))
        });

        let cache = Self::from_entries(entries);
        info!(entries = cache.len(), "Loaded cache table");
        cache
    }

    /// Number of cached codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SourceProbe for CacheProbe {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn stage(&self) -> ProbeStage {
        ProbeStage::Cache
    }

    async fn probe(
        &self,
        record: &Record,
        _current: &FieldTriple,
    ) -> Result<PartialFields, ProbeError> {
        Ok(self
            .entries
            .get(&record.code)
            .cloned()
            .unwrap_or_default())
    }
}

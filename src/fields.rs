//! Target fields and their per-record resolution state.
//!
//! Every record carries exactly one [`FieldValue`] per [`TargetField`]. Probes
//! produce [`PartialFields`] (only the fields they could speak to), which are
//! merged into the record's [`FieldTriple`] under first-resolved-wins rules.
//!
//! Values cross the tabular boundary (cache table, sinks) as plain text cells;
//! [`FieldValue::to_cell`] and [`FieldValue::from_cell`] define that encoding.

use std::fmt;

/// Placeholder meaning "no information found".
pub const SENTINEL_TEXT: &str = "資訊不足";

/// Maximum length of a resolved field, in characters.
pub const MAX_FIELD_CHARS: usize = 100;

/// One of the three values resolved per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetField {
    /// Indication (適應症).
    Indication,
    /// Dosage and usage (用法用量).
    Dosage,
    /// Precautions (注意事項).
    Precaution,
}

impl TargetField {
    /// All target fields in output column order.
    pub const ALL: [TargetField; 3] = [Self::Indication, Self::Dosage, Self::Precaution];

    /// Column name used in the cache table, the sinks, the structured API and
    /// the extraction model's JSON reply.
    #[must_use]
    pub fn column_name(self) -> &'static str {
        match self {
            Self::Indication => "適應症",
            Self::Dosage => "用法用量",
            Self::Precaution => "注意事項",
        }
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Indication => "indication",
            Self::Dosage => "dosage",
            Self::Precaution => "precaution",
        };
        f.write_str(label)
    }
}

/// Field-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldErrorKind {
    /// The extraction model replied with something that is not the expected JSON object.
    ModelFormatError,
    /// The extraction model call itself failed (transport or runtime error).
    ModelExtractionFailure,
    /// The record lacks name, manufacturer or ingredient and was never probed.
    MissingCriticalInput,
    /// Any other failure contained at the record boundary.
    Unexpected,
}

impl FieldErrorKind {
    /// Stable snake-case label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelFormatError => "model_format_error",
            Self::ModelExtractionFailure => "model_extraction_failure",
            Self::MissingCriticalInput => "missing_critical_input",
            Self::Unexpected => "unexpected",
        }
    }

    /// Text written into sink cells for this error.
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::ModelFormatError => "模型回傳格式錯誤",
            Self::ModelExtractionFailure => "模型提取失敗",
            Self::MissingCriticalInput => "資訊不足 - 關鍵資訊缺失",
            Self::Unexpected => "處理失敗",
        }
    }

    fn from_marker(text: &str) -> Option<Self> {
        [
            Self::ModelFormatError,
            Self::ModelExtractionFailure,
            Self::MissingCriticalInput,
            Self::Unexpected,
        ]
        .into_iter()
        .find(|kind| kind.marker() == text)
    }
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution state of one target field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Usable text, at most [`MAX_FIELD_CHARS`] characters.
    Resolved(String),
    /// No information found.
    Sentinel,
    /// Resolution failed with a classified error.
    Error(FieldErrorKind),
}

impl FieldValue {
    /// Builds a value from free text.
    ///
    /// Blank text and the sentinel text map to [`FieldValue::Sentinel`]; error
    /// markers map to their [`FieldValue::Error`]; anything else is trimmed and
    /// truncated to [`MAX_FIELD_CHARS`] characters.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == SENTINEL_TEXT {
            return Self::Sentinel;
        }
        if let Some(kind) = FieldErrorKind::from_marker(trimmed) {
            return Self::Error(kind);
        }
        Self::Resolved(truncate_chars(trimmed, MAX_FIELD_CHARS))
    }

    /// Decodes a tabular cell. Empty cells mean "not provided".
    #[must_use]
    pub fn from_cell(cell: &str) -> Option<Self> {
        if cell.trim().is_empty() {
            None
        } else {
            Some(Self::from_text(cell))
        }
    }

    /// Encodes the value as a tabular cell.
    #[must_use]
    pub fn to_cell(&self) -> String {
        match self {
            Self::Resolved(text) => text.clone(),
            Self::Sentinel => SENTINEL_TEXT.to_string(),
            Self::Error(kind) => kind.marker().to_string(),
        }
    }

    /// Returns true for [`FieldValue::Resolved`].
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// The three target fields of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTriple {
    pub indication: FieldValue,
    pub dosage: FieldValue,
    pub precaution: FieldValue,
}

impl Default for FieldTriple {
    fn default() -> Self {
        Self::uniform(&FieldValue::Sentinel)
    }
}

impl FieldTriple {
    /// Builds a triple with the same value in all three fields.
    #[must_use]
    pub fn uniform(value: &FieldValue) -> Self {
        Self {
            indication: value.clone(),
            dosage: value.clone(),
            precaution: value.clone(),
        }
    }

    /// Returns the value of one field.
    #[must_use]
    pub fn get(&self, field: TargetField) -> &FieldValue {
        match field {
            TargetField::Indication => &self.indication,
            TargetField::Dosage => &self.dosage,
            TargetField::Precaution => &self.precaution,
        }
    }

    fn get_mut(&mut self, field: TargetField) -> &mut FieldValue {
        match field {
            TargetField::Indication => &mut self.indication,
            TargetField::Dosage => &mut self.dosage,
            TargetField::Precaution => &mut self.precaution,
        }
    }

    /// Merges a probe's partial output into this triple.
    ///
    /// Fields already [`FieldValue::Resolved`] are never touched. Any other
    /// field takes the value the probe provided; omitted fields stay as they
    /// are. Returns the number of fields that became resolved by this merge.
    pub fn merge(&mut self, partial: &PartialFields) -> usize {
        let mut newly_resolved = 0;
        for field in TargetField::ALL {
            let Some(incoming) = partial.get(field) else {
                continue;
            };
            let current = self.get_mut(field);
            if current.is_resolved() {
                continue;
            }
            if incoming.is_resolved() {
                newly_resolved += 1;
            }
            *current = incoming.clone();
        }
        newly_resolved
    }

    /// Iterates fields in output column order.
    pub fn iter(&self) -> impl Iterator<Item = (TargetField, &FieldValue)> {
        TargetField::ALL
            .into_iter()
            .map(move |field| (field, self.get(field)))
    }
}

/// Output of one probe: only the fields it could speak to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialFields {
    pub indication: Option<FieldValue>,
    pub dosage: Option<FieldValue>,
    pub precaution: Option<FieldValue>,
}

impl PartialFields {
    /// Empty result: no field provided.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Provides the same value for all three fields.
    #[must_use]
    pub fn uniform(value: &FieldValue) -> Self {
        Self {
            indication: Some(value.clone()),
            dosage: Some(value.clone()),
            precaution: Some(value.clone()),
        }
    }

    /// Returns the provided value of one field, if any.
    #[must_use]
    pub fn get(&self, field: TargetField) -> Option<&FieldValue> {
        match field {
            TargetField::Indication => self.indication.as_ref(),
            TargetField::Dosage => self.dosage.as_ref(),
            TargetField::Precaution => self.precaution.as_ref(),
        }
    }

    /// Sets one field.
    pub fn set(&mut self, field: TargetField, value: FieldValue) {
        let slot = match field {
            TargetField::Indication => &mut self.indication,
            TargetField::Dosage => &mut self.dosage,
            TargetField::Precaution => &mut self.precaution,
        };
        *slot = Some(value);
    }

    /// Builder-style [`PartialFields::set`].
    #[must_use]
    pub fn with(mut self, field: TargetField, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }

    /// Returns true when no field is provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        TargetField::ALL.iter().all(|field| self.get(*field).is_none())
    }

    /// Number of provided fields that are resolved.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        TargetField::ALL
            .iter()
            .filter(|field| self.get(**field).is_some_and(FieldValue::is_resolved))
            .count()
    }
}

/// Truncates to at most `max_chars` Unicode scalar values.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

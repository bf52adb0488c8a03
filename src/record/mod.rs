//! Input records: the pharmaceutical products to enrich.
//!
//! A [`Record`] is immutable once read. It exposes the attributes the probes
//! need (code, names, manufacturer, ingredient) and keeps every input column,
//! in input order, so the sinks can carry them through unchanged.

mod error;
mod source;

pub use error::InputError;
pub use source::{InputTable, read_records};

/// Input column names for the attributes the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    /// Unique drug code (required).
    pub code: String,
    /// Local product name (required).
    pub name_local: String,
    /// Foreign product name (optional column).
    pub name_foreign: String,
    /// Manufacturer name (required).
    pub manufacturer: String,
    /// Active ingredient (required).
    pub ingredient: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            code: "藥品代號".to_string(),
            name_local: "藥品中文名稱".to_string(),
            name_foreign: "藥品英文名稱".to_string(),
            manufacturer: "製造廠名稱".to_string(),
            ingredient: "成份".to_string(),
        }
    }
}

impl ColumnMap {
    /// Columns that must be present in the input header.
    #[must_use]
    pub fn required(&self) -> [&str; 4] {
        [
            self.code.as_str(),
            self.name_local.as_str(),
            self.manufacturer.as_str(),
            self.ingredient.as_str(),
        ]
    }
}

/// One product row from the input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub code: String,
    pub name_local: String,
    pub name_foreign: String,
    pub manufacturer: String,
    pub ingredient: String,
    attributes: Vec<(String, String)>,
}

impl Record {
    /// Builds a record using the default [`ColumnMap`] for its attribute columns.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        name_local: impl Into<String>,
        manufacturer: impl Into<String>,
        ingredient: impl Into<String>,
    ) -> Self {
        Self::with_columns(
            &ColumnMap::default(),
            code.into(),
            name_local.into(),
            String::new(),
            manufacturer.into(),
            ingredient.into(),
        )
    }

    fn with_columns(
        columns: &ColumnMap,
        code: String,
        name_local: String,
        name_foreign: String,
        manufacturer: String,
        ingredient: String,
    ) -> Self {
        let attributes = vec![
            (columns.code.clone(), code.clone()),
            (columns.name_local.clone(), name_local.clone()),
            (columns.name_foreign.clone(), name_foreign.clone()),
            (columns.manufacturer.clone(), manufacturer.clone()),
            (columns.ingredient.clone(), ingredient.clone()),
        ];
        Self {
            code,
            name_local,
            name_foreign,
            manufacturer,
            ingredient,
            attributes,
        }
    }

    /// Sets the foreign product name.
    #[must_use]
    pub fn with_foreign_name(mut self, name_foreign: impl Into<String>) -> Self {
        let name_foreign = name_foreign.into();
        if let Some(slot) = self.attributes.get_mut(2) {
            slot.1.clone_from(&name_foreign);
        }
        self.name_foreign = name_foreign;
        self
    }

    /// Builds a record from an input row aligned with `headers`.
    ///
    /// Missing cells read as empty strings; cells are trimmed for the typed
    /// attributes but carried verbatim in [`Record::attributes`].
    #[must_use]
    pub fn from_row(headers: &[String], row: &[String], columns: &ColumnMap) -> Self {
        let cell = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .and_then(|index| row.get(index))
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        Self {
            code: cell(&columns.code),
            name_local: cell(&columns.name_local),
            name_foreign: cell(&columns.name_foreign),
            manufacturer: cell(&columns.manufacturer),
            ingredient: cell(&columns.ingredient),
            attributes: headers
                .iter()
                .cloned()
                .zip(row.iter().cloned().chain(std::iter::repeat(String::new())))
                .collect(),
        }
    }

    /// All input columns in input order.
    #[must_use]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Looks up an input column by name.
    #[must_use]
    pub fn attribute(&self, column: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Names of the critical attributes that are empty (name, manufacturer, ingredient).
    #[must_use]
    pub fn missing_critical_attributes(&self) -> Vec<&'static str> {
        [
            ("name", &self.name_local),
            ("manufacturer", &self.manufacturer),
            ("ingredient", &self.ingredient),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(label, _)| label)
        .collect()
    }
}

//! Completeness evaluation over a record's field triple.
//!
//! Pure and side-effect free. The orchestrator uses it to decide whether to
//! keep probing, and the pipeline uses it again to route the final outcome.

use crate::fields::{FieldErrorKind, FieldTriple, FieldValue, TargetField};

/// Classification of one field for completeness purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    /// The field holds usable text.
    Present,
    /// The field holds the "no information" placeholder.
    SentinelEmpty,
    /// The field holds a classified error.
    Error(FieldErrorKind),
}

impl From<&FieldValue> for FieldStatus {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Resolved(_) => Self::Present,
            FieldValue::Sentinel => Self::SentinelEmpty,
            FieldValue::Error(kind) => Self::Error(*kind),
        }
    }
}

/// Per-field statuses plus the reduced completeness flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletenessReport {
    pub indication: FieldStatus,
    pub dosage: FieldStatus,
    pub precaution: FieldStatus,
    pub complete: bool,
}

impl CompletenessReport {
    /// Fields that are not [`FieldStatus::Present`].
    #[must_use]
    pub fn missing_fields(&self) -> Vec<TargetField> {
        [
            (TargetField::Indication, self.indication),
            (TargetField::Dosage, self.dosage),
            (TargetField::Precaution, self.precaution),
        ]
        .into_iter()
        .filter(|(_, status)| *status != FieldStatus::Present)
        .map(|(field, _)| field)
        .collect()
    }
}

/// Classifies every field of the triple.
#[must_use]
pub fn evaluate(triple: &FieldTriple) -> CompletenessReport {
    let indication = FieldStatus::from(&triple.indication);
    let dosage = FieldStatus::from(&triple.dosage);
    let precaution = FieldStatus::from(&triple.precaution);
    CompletenessReport {
        indication,
        dosage,
        precaution,
        complete: [indication, dosage, precaution]
            .iter()
            .all(|status| *status == FieldStatus::Present),
    }
}

/// True iff all three fields are resolved.
#[must_use]
pub fn is_complete(triple: &FieldTriple) -> bool {
    triple.iter().all(|(_, value)| value.is_resolved())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states() -> Vec<FieldValue> {
        vec![
            FieldValue::Resolved("ok".to_string()),
            FieldValue::Sentinel,
            FieldValue::Error(FieldErrorKind::ModelFormatError),
            FieldValue::Error(FieldErrorKind::ModelExtractionFailure),
            FieldValue::Error(FieldErrorKind::MissingCriticalInput),
        ]
    }

    #[test]
    fn test_is_complete_only_when_all_three_resolved() {
        for indication in states() {
            for dosage in states() {
                for precaution in states() {
                    let expected = indication.is_resolved()
                        && dosage.is_resolved()
                        && precaution.is_resolved();
                    let triple = FieldTriple {
                        indication: indication.clone(),
                        dosage: dosage.clone(),
                        precaution: precaution.clone(),
                    };
                    assert_eq!(is_complete(&triple), expected, "{triple:?}");
                    assert_eq!(evaluate(&triple).complete, expected, "{triple:?}");
                }
            }
        }
    }

    #[test]
    fn test_evaluate_reports_field_statuses() {
        let triple = FieldTriple {
            indication: FieldValue::Resolved("高血壓".to_string()),
            dosage: FieldValue::Sentinel,
            precaution: FieldValue::Error(FieldErrorKind::ModelFormatError),
        };
        let report = evaluate(&triple);

        assert_eq!(report.indication, FieldStatus::Present);
        assert_eq!(report.dosage, FieldStatus::SentinelEmpty);
        assert_eq!(
            report.precaution,
            FieldStatus::Error(FieldErrorKind::ModelFormatError)
        );
        assert_eq!(
            report.missing_fields(),
            vec![TargetField::Dosage, TargetField::Precaution]
        );
    }

    #[test]
    fn test_default_triple_is_incomplete() {
        assert!(!is_complete(&FieldTriple::default()));
    }
}

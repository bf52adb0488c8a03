//! Error types for probes and the extraction model client.

use thiserror::Error;

/// Unexpected failure inside a probe; ends processing of the current record.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe hit a condition it cannot turn into a field result.
    #[error("probe '{probe}' failed for record {code}: {reason}\n  Suggestion: {suggestion}")]
    Unexpected {
        probe: String,
        code: String,
        reason: String,
        suggestion: String,
    },
}

impl ProbeError {
    /// Creates an `Unexpected` error with a generic suggestion.
    #[must_use]
    pub fn unexpected(probe: &str, code: &str, reason: impl Into<String>) -> Self {
        Self::Unexpected {
            probe: probe.to_string(),
            code: code.to_string(),
            reason: reason.into(),
            suggestion: "Re-run to retry this record; it was written to the incomplete output"
                .to_string(),
        }
    }
}

/// Transport or runtime failure talking to the extraction model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The model server could not be reached.
    #[error(
        "cannot reach model server at {base_url}\n  Suggestion: Start the model server or set --model-url"
    )]
    Connection { base_url: String },

    /// The request did not finish in time.
    #[error("model request timed out after {timeout_secs}s\n  Suggestion: Use a smaller model or raise the timeout")]
    Timeout { timeout_secs: u64 },

    /// The server answered with a non-success status.
    #[error("model server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The server's envelope could not be decoded.
    #[error("model response envelope could not be decoded: {reason}")]
    Decode { reason: String },

    /// Any other request failure.
    #[error("model request failed: {reason}")]
    Request { reason: String },
}

//! Diagnostic side-channel for malformed provider responses.
//!
//! Bodies that could not be interpreted (non-JSON API responses, unparsable
//! model replies) are written to `<output_dir>/diagnostics/` for later
//! inspection. Writing is best effort: failures are logged and swallowed.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Subdirectory of the output directory holding diagnostic files.
pub const DIAGNOSTICS_DIR: &str = "diagnostics";

/// Kind of provider whose response is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    StructuredApi,
    Model,
}

impl DiagnosticKind {
    fn file_name(self, code: &str) -> String {
        let code = sanitize_code(code);
        match self {
            Self::StructuredApi => format!("structured_api_{code}.html"),
            Self::Model => format!("model_{code}.txt"),
        }
    }
}

/// Writes diagnostic bodies under a fixed directory.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    dir: Option<PathBuf>,
}

impl DiagnosticSink {
    /// Sink writing into `<output_dir>/diagnostics`.
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self {
            dir: Some(output_dir.join(DIAGNOSTICS_DIR)),
        }
    }

    /// Sink that drops everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Records `body` for the record `code`. Returns the written path.
    pub fn record(&self, kind: DiagnosticKind, code: &str, body: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        if let Err(error) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), %error, "Cannot create diagnostics directory");
            return None;
        }
        let path = dir.join(kind.file_name(code));
        match std::fs::write(&path, body) {
            Ok(()) => {
                debug!(path = %path.display(), "Wrote diagnostic body");
                Some(path)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "Cannot write diagnostic body");
                None
            }
        }
    }
}

fn sanitize_code(code: &str) -> String {
    let cleaned: String = code
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

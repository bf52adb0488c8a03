//! Shared runtime context built after CLI/config handling.

use std::path::PathBuf;

use drug_enricher::RunSettings;

use crate::cli::RunArgs;

/// Holds the merged arguments and the library settings so the rest of
/// `run_enricher` reads `ctx.settings` instead of passing many arguments.
pub(crate) struct RunContext {
    pub(crate) args: RunArgs,
    pub(crate) settings: RunSettings,
    pub(crate) config_path: Option<PathBuf>,
}

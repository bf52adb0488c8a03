//! Configuration lifecycle: load file config, merge CLI, build run settings.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use drug_enricher::record::ColumnMap;
use drug_enricher::{RetryPolicy, RunSettings, WebSearchSettings};

use crate::app::config_runtime::{self, CliValueSources};
use crate::app_config::load_file_config;
use crate::cli::RunArgs;

/// Resolved configuration bundle used to build `RunContext`.
pub(crate) struct ResolvedConfig {
    pub(crate) args: RunArgs,
    pub(crate) settings: RunSettings,
    pub(crate) config_path: Option<PathBuf>,
}

/// Load file config, merge CLI overrides and build the library run settings.
pub(crate) fn resolve_config(
    args: &RunArgs,
    cli_sources: &CliValueSources,
) -> Result<ResolvedConfig> {
    let loaded = load_file_config(args.config.as_deref())?;
    let args = config_runtime::apply_config_defaults(
        args.clone(),
        cli_sources,
        loaded.config.as_ref(),
    )?;
    let settings = build_run_settings(&args)?;
    Ok(ResolvedConfig {
        args,
        settings,
        config_path: loaded.config.is_some().then_some(loaded.path).flatten(),
    })
}

/// Turns merged arguments into [`RunSettings`].
pub(crate) fn build_run_settings(args: &RunArgs) -> Result<RunSettings> {
    let Some(input) = args.input.clone() else {
        bail!(
            "No input table given\n  Suggestion: Pass --input <file> or set `input` in the config file"
        );
    };
    let output_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let mut settings = RunSettings::new(input, output_dir);
    settings.cache_table.clone_from(&args.cache_table);
    settings.columns = ColumnMap {
        code: args.code_column.clone(),
        name_local: args.name_column.clone(),
        name_foreign: args.foreign_name_column.clone(),
        manufacturer: args.manufacturer_column.clone(),
        ingredient: args.ingredient_column.clone(),
    };
    settings.batch_size = args.batch_size as usize;
    settings.demo_limit = args.demo.then_some(args.demo_limit as usize);
    settings.request_timeout = Duration::from_secs(args.request_timeout);
    settings.retry = RetryPolicy::with_max_attempts(u32::from(args.max_retries));
    settings.api_url.clone_from(&args.api_url);
    settings.web_search = (!args.no_web_search).then(|| WebSearchSettings {
        search_endpoint: args.search_endpoint.clone(),
        model_url: args.model_url.clone(),
        model: args.model.clone(),
        ..WebSearchSettings::default()
    });
    Ok(settings)
}

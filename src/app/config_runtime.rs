use anyhow::{Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::{Cli, RunArgs};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) input: bool,
    pub(crate) output_dir: bool,
    pub(crate) cache_table: bool,
    pub(crate) batch_size: bool,
    pub(crate) request_timeout: bool,
    pub(crate) max_retries: bool,
    pub(crate) api_url: bool,
    pub(crate) model_url: bool,
    pub(crate) model: bool,
    pub(crate) search_endpoint: bool,
    pub(crate) no_web_search: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
    pub(crate) debug: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let command = Cli::command();
    let matches = command.get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());

    let run_matches = match matches.subcommand() {
        Some(("run", sub_matches)) => sub_matches,
        _ => &matches,
    };
    (cli, sources_from_matches(run_matches))
}

fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        input: is_commandline_value(matches, "input"),
        output_dir: is_commandline_value(matches, "output_dir"),
        cache_table: is_commandline_value(matches, "cache_table"),
        batch_size: is_commandline_value(matches, "batch_size"),
        request_timeout: is_commandline_value(matches, "request_timeout"),
        max_retries: is_commandline_value(matches, "max_retries"),
        api_url: is_commandline_value(matches, "api_url"),
        model_url: is_commandline_value(matches, "model_url"),
        model: is_commandline_value(matches, "model"),
        search_endpoint: is_commandline_value(matches, "search_endpoint"),
        no_web_search: is_commandline_value(matches, "no_web_search"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
        debug: is_commandline_value(matches, "debug"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills every value not given on the command line from the file config.
pub(crate) fn apply_config_defaults(
    mut args: RunArgs,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<RunArgs> {
    if let Some(file_config) = file_config {
        if !cli_sources.input
            && args.input.is_none()
            && let Some(input) = &file_config.input
        {
            args.input = Some(input.clone());
        }

        if !cli_sources.output_dir
            && args.output_dir.is_none()
            && let Some(output_dir) = &file_config.output_dir
        {
            args.output_dir = Some(output_dir.clone());
        }

        if !cli_sources.cache_table
            && args.cache_table.is_none()
            && let Some(cache_table) = &file_config.cache_table
        {
            args.cache_table = Some(cache_table.clone());
        }

        if !cli_sources.batch_size
            && let Some(batch_size) = file_config.batch_size
        {
            args.batch_size = batch_size;
        }

        if !cli_sources.request_timeout
            && let Some(timeout) = file_config.request_timeout_secs
        {
            args.request_timeout = timeout;
        }

        if !cli_sources.max_retries
            && let Some(max_retries) = file_config.max_retries
        {
            args.max_retries = max_retries;
        }

        if !cli_sources.api_url
            && let Some(api_url) = &file_config.api_url
        {
            args.api_url.clone_from(api_url);
        }

        if !cli_sources.model_url
            && let Some(model_url) = &file_config.model_url
        {
            args.model_url.clone_from(model_url);
        }

        if !cli_sources.model
            && let Some(model) = &file_config.model
        {
            args.model.clone_from(model);
        }

        if !cli_sources.search_endpoint
            && let Some(endpoint) = &file_config.search_endpoint
        {
            args.search_endpoint.clone_from(endpoint);
        }

        if !cli_sources.no_web_search
            && !args.no_web_search
            && let Some(web_search) = file_config.web_search
        {
            args.no_web_search = !web_search;
        }

        if !cli_sources.verbose
            && !cli_sources.quiet
            && !cli_sources.debug
            && let Some(verbosity) = file_config.verbosity
        {
            apply_config_verbosity(&mut args, verbosity);
        }
    }

    if !(1..=10_000).contains(&args.batch_size) {
        bail!(
            "Invalid effective batch_size value: {}. Expected range: 1..=10000",
            args.batch_size
        );
    }
    if !(1..=10).contains(&args.max_retries) {
        bail!(
            "Invalid effective max_retries value: {}. Expected range: 1..=10",
            args.max_retries
        );
    }

    Ok(args)
}

fn apply_config_verbosity(args: &mut RunArgs, verbosity: VerbositySetting) {
    match verbosity {
        VerbositySetting::Default => {
            args.quiet = false;
            args.debug = false;
            args.verbose = 0;
        }
        VerbositySetting::Verbose => {
            args.quiet = false;
            args.debug = false;
            args.verbose = 1;
        }
        VerbositySetting::Quiet => {
            args.quiet = true;
            args.debug = false;
            args.verbose = 0;
        }
        VerbositySetting::Debug => {
            args.quiet = false;
            args.debug = true;
            args.verbose = 0;
        }
    }
}

pub(crate) fn resolve_default_log_level(args: &RunArgs) -> &'static str {
    if args.quiet {
        "error"
    } else if args.debug {
        "trace"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet || cli_sources.debug
}

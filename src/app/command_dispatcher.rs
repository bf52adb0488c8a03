//! CLI command routing: runs the `summary` command.
//!
//! If the user invoked `summary`, this module runs it and returns the exit
//! outcome. Otherwise returns `None` so the caller continues with the run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use drug_enricher::pipeline::CACHE_TABLE_FILE;
use drug_enricher::{SinkPaths, summarize_outputs};

use crate::app::terminal;
use crate::app_config::load_file_config;
use crate::cli::{Cli, Command, SummaryArgs};
use crate::{ProcessExit, output};

/// If `cli` has a non-run command, run it and return `Some(exit)`; otherwise return `None`.
pub(crate) fn try_dispatch(cli: &Cli) -> Result<Option<ProcessExit>> {
    let Some(Command::Summary(summary_args)) = &cli.command else {
        return Ok(None);
    };

    let no_color = terminal::should_disable_color(
        false,
        terminal::no_color_env_requested(),
        terminal::is_dumb_terminal(),
    );
    terminal::init_tracing("info", false, no_color);

    run_summary_command(summary_args)?;
    Ok(Some(ProcessExit::Success))
}

fn run_summary_command(args: &SummaryArgs) -> Result<()> {
    let loaded = load_file_config(args.config.as_deref())?;
    let file_config = loaded.config.unwrap_or_default();

    let output_dir = args
        .output_dir
        .clone()
        .or(file_config.output_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let cache_table = args
        .cache_table
        .clone()
        .or(file_config.cache_table)
        .unwrap_or_else(|| output_dir.join(CACHE_TABLE_FILE));

    let sinks = SinkPaths::in_dir(&output_dir);
    let summary = summarize_outputs(&sinks, &cache_table)
        .with_context(|| format!("Failed to read output tables in '{}'", output_dir.display()))?;

    for line in output::output_summary_lines(&summary, &sinks, &cache_table) {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::try_dispatch;
    use crate::cli::Cli;
    use clap::Parser;

    /// Without a command, try_dispatch returns None so runtime continues to the run.
    #[test]
    fn test_try_dispatch_returns_none_when_no_command() {
        let cli = Cli::parse_from(["drug-enricher"]);
        assert!(cli.command.is_none());
        assert_eq!(try_dispatch(&cli).unwrap(), None);
    }

    #[test]
    fn test_try_dispatch_returns_none_for_run_command() {
        let cli = Cli::parse_from(["drug-enricher", "run", "-i", "catalog.csv"]);
        assert_eq!(try_dispatch(&cli).unwrap(), None);
    }
}

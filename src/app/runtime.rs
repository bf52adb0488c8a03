use std::future::Future;
use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use drug_enricher::run_pipeline;
use tracing::{debug, info, warn};

use crate::app::{
    command_dispatcher, config_manager, config_runtime, context, progress_manager, terminal,
};
use crate::{ProcessExit, output};

pub(crate) async fn run_enricher() -> Result<ProcessExit> {
    let (cli, cli_sources) = config_runtime::parse_cli_with_sources();

    if let Some(exit) = command_dispatcher::try_dispatch(&cli)? {
        return Ok(exit);
    }

    let resolved = config_manager::resolve_config(cli.run_args(), &cli_sources)?;

    let default_level = config_runtime::resolve_default_log_level(&resolved.args);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&cli_sources);
    let no_color = terminal::is_no_color_requested(&resolved.args);
    terminal::init_tracing(default_level, force_cli_log_level, no_color);

    let ctx = context::RunContext {
        args: resolved.args,
        settings: resolved.settings,
        config_path: resolved.config_path,
    };

    if let Some(path) = &ctx.config_path {
        debug!(path = %path.display(), "Loaded config file");
    }
    info!(
        input = %ctx.settings.input.display(),
        output_dir = %ctx.settings.output_dir.display(),
        web_search = ctx.settings.web_search.is_some(),
        demo_limit = ?ctx.settings.demo_limit,
        "Drug enricher starting"
    );

    let use_progress_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        ctx.args.quiet,
        terminal::is_dumb_terminal(),
    );
    let mut progress = progress_manager::ProgressReporter::new(use_progress_bar);

    let result = tokio::select! {
        result = run_pipeline(&ctx.settings, &mut progress) => Some(result),
        () = wait_for_interrupt(tokio::signal::ctrl_c()) => None,
    };
    progress.finish();

    let Some(result) = result else {
        warn!("Interrupted. Records since the last flush were not written; run again to resume.");
        return Ok(ProcessExit::Failure);
    };
    let summary = result.context("Enrichment run failed")?;

    if !ctx.args.quiet {
        for line in output::run_summary_lines(&summary, &ctx.settings.sink_paths()) {
            println!("{line}");
        }
    }

    Ok(ProcessExit::Success)
}

/// Resolves when `signal` fires; never resolves if the handler cannot be installed.
async fn wait_for_interrupt(signal: impl Future<Output = io::Result<()>>) {
    if let Err(error) = signal.await {
        warn!(%error, "Failed to listen for interrupt; continuing without ctrl-c handling");
        std::future::pending::<()>().await;
    }
}

//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use drug_enricher::net::DEFAULT_MAX_ATTEMPTS;
use drug_enricher::pipeline::DEFAULT_DEMO_LIMIT;
use drug_enricher::probe::{
    DEFAULT_MODEL, DEFAULT_MODEL_URL, DEFAULT_SEARCH_ENDPOINT, DEFAULT_STRUCTURED_API_URL,
};
use drug_enricher::sink::DEFAULT_BATCH_SIZE;

/// Enrich a pharmaceutical product catalog with indication, dosage and
/// precaution fields.
///
/// Each product is looked up in an offline cache, a structured open-data API,
/// and finally web search plus a local extraction model, stopping as soon as
/// all three fields are known. Finished products are appended to a complete or
/// an incomplete output table; rerunning resumes where the last run stopped.
#[derive(Parser, Debug)]
#[command(name = "drug-enricher")]
#[command(author, version, about)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// Run arguments, whether given at top level or after `run`.
    #[must_use]
    pub fn run_args(&self) -> &RunArgs {
        match &self.command {
            Some(Command::Run(args)) => args,
            _ => &self.run,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Enrich the input table (the default when no command is given)
    Run(RunArgs),

    /// Report row counts of the output tables and the cache table
    Summary(SummaryArgs),
}

/// Arguments of the enrichment run.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Input catalog table (CSV)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory for the output tables and diagnostics (default: current directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Offline cache table keyed by drug code
    #[arg(long)]
    pub cache_table: Option<PathBuf>,

    /// Records buffered before each append to the output tables
    #[arg(short = 'b', long, default_value_t = DEFAULT_BATCH_SIZE as u32, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub batch_size: u32,

    /// Delete both output tables, then process at most --demo-limit records
    #[arg(long)]
    pub demo: bool,

    /// Record limit for --demo runs
    #[arg(long, default_value_t = DEFAULT_DEMO_LIMIT as u32, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub demo_limit: u32,

    /// Skip the web search stages
    #[arg(long)]
    pub no_web_search: bool,

    /// Maximum attempts per network request, including the first (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: u8,

    /// Per-request timeout in seconds (1-3600)
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub request_timeout: u64,

    /// Structured open-data API URL
    #[arg(long, default_value = DEFAULT_STRUCTURED_API_URL)]
    pub api_url: String,

    /// Extraction model server base URL
    #[arg(long, default_value = DEFAULT_MODEL_URL)]
    pub model_url: String,

    /// Extraction model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// HTML search results endpoint
    #[arg(long, default_value = DEFAULT_SEARCH_ENDPOINT)]
    pub search_endpoint: String,

    /// Input column holding the drug code
    #[arg(long, default_value = "藥品代號")]
    pub code_column: String,

    /// Input column holding the local product name
    #[arg(long, default_value = "藥品中文名稱")]
    pub name_column: String,

    /// Input column holding the foreign product name
    #[arg(long, default_value = "藥品英文名稱")]
    pub foreign_name_column: String,

    /// Input column holding the manufacturer
    #[arg(long, default_value = "製造廠名稱")]
    pub manufacturer_column: String,

    /// Input column holding the active ingredient
    #[arg(long, default_value = "成份")]
    pub ingredient_column: String,

    /// Config file (default: $XDG_CONFIG_HOME/drug-enricher/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Trace-level logging
    #[arg(long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments of the `summary` command.
#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    /// Directory holding the output tables (default: current directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Cache table to count (default: the cache file in the output directory)
    #[arg(long)]
    pub cache_table: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/drug-enricher/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

//! CLI argument parsing for the support workflow runner.
//!
//! The CLI is intentionally thin: it resolves a config, assembles the engine,
//! and hands the final state to the summary renderer, so the orchestration
//! core stays reusable outside the binary.
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the support workflow.
///
/// Keeping a single `RootArgs` type makes command routing obvious and avoids
/// hidden defaults in subcommand constructors.
#[derive(Parser, Debug)]
#[command(
    name = "caseflow",
    version,
    about = "Staged workflow orchestrator for customer support requests",
    after_help = "Commands:\n  init                 Write a starter provider/stage config\n  run --input <JSON>   Run the workflow over one request payload\n  demo                 Run the built-in damaged-order demo request\n\nExamples:\n  caseflow init\n  caseflow run --input '{\"customer_name\":\"Aisha Jain\",\"query\":\"Order #A123 arrived damaged.\"}'\n  caseflow run --input-file request.json --json\n  caseflow demo --verbose",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Run(RunArgs),
    Demo(DemoArgs),
}

/// Init command inputs for bootstrapping a config file.
#[derive(Parser, Debug)]
#[command(about = "Write a starter provider/stage config")]
pub struct InitArgs {
    /// Config path (defaults to CASEFLOW_CONFIG, then the user config dir)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Run command inputs for a single support request.
///
/// The payload group makes exactly one of `--input` and `--input-file`
/// mandatory, so a missing payload is a usage error rather than a mid-run
/// failure.
#[derive(Parser, Debug)]
#[command(about = "Run the support workflow over one request")]
#[command(group(
    ArgGroup::new("payload")
        .required(true)
        .args(["input", "input_file"]),
))]
pub struct RunArgs {
    /// Config path (defaults to CASEFLOW_CONFIG, then the user config dir)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Request payload as an inline JSON object
    #[arg(long, value_name = "JSON")]
    pub input: Option<String>,

    /// Read the request payload from a JSON file
    #[arg(long, value_name = "FILE")]
    pub input_file: Option<PathBuf>,

    /// Emit the full final state as JSON instead of the text summary
    #[arg(long)]
    pub json: bool,

    /// Per-call timeout in seconds for provider requests
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub call_timeout: Option<u64>,

    /// Emit a verbose transcript of the run
    #[arg(long)]
    pub verbose: bool,
}

/// Demo command inputs for the built-in sample request.
#[derive(Parser, Debug)]
#[command(about = "Run the built-in damaged-order demo request")]
pub struct DemoArgs {
    /// Config path (defaults to CASEFLOW_CONFIG, then the user config dir)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit the full final state as JSON instead of the text summary
    #[arg(long)]
    pub json: bool,

    /// Emit a verbose transcript of the run
    #[arg(long)]
    pub verbose: bool,
}

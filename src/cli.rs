// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `cycleflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cycleflow",
    version,
    about = "Cycling workflow orchestrator for batch/HPC schedulers.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CYCLEFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one orchestration pass: admit cycles, run tasks, persist state.
    Run(WorkflowArgs),

    /// Halt cycles: cancel running jobs and stop submitting for them.
    Halt(ControlArgs),

    /// Pause cycles: stop submitting for them, leave running jobs alone.
    Pause(ControlArgs),

    /// Resume halted or paused cycles.
    Resume(ControlArgs),

    /// Parse and validate the workflow document, print a summary.
    Check(WorkflowArgs),
}

#[derive(Debug, Clone, Args)]
pub struct WorkflowArgs {
    /// Path to the workflow document (TOML).
    #[arg(short = 'w', long = "workflow", value_name = "PATH")]
    pub workflow: String,

    /// Path to the persisted workflow state.
    #[arg(
        short = 'd',
        long = "database",
        value_name = "PATH",
        default_value = "cycleflow.state"
    )]
    pub database: String,
}

#[derive(Debug, Clone, Args)]
pub struct ControlArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    /// Target every known cycle.
    #[arg(long, conflicts_with = "cycle")]
    pub all: bool,

    /// Target a specific cycle (YYYYMMDDHHMM, UTC). May be repeated.
    #[arg(long = "cycle", value_name = "YYYYMMDDHHMM")]
    pub cycle: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

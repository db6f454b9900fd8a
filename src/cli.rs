// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::PropagationPolicy;

/// Command-line arguments for `dynadag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dynadag",
    version,
    about = "Validate a dynamic workflow and render its graph, including the parts still to be decided.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML).
    ///
    /// Default: `Dynadag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Dynadag.toml")]
    pub config: String,

    /// Output format for the rendered snapshot.
    #[arg(long, value_enum, value_name = "FORMAT", default_value = "summary")]
    pub format: OutputFormat,

    /// Override `[config].constraint_propagation` from the workflow file.
    #[arg(long, value_name = "POLICY")]
    pub propagation: Option<PropagationPolicy>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DYNADAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// How the snapshot is written to stdout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Dot,
    Summary,
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

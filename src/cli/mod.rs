//! Command-line interface definitions for the `crashd` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `crashd` binary.
#[derive(Debug, Parser)]
#[command(
    name = "crashd",
    about = "Collect diagnostics files and command output from remote machines",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Parse a diagnostics script and run it against its hosts.
    #[command(name = "run", about = "Run a diagnostics script against its hosts")]
    Run(RunCommand),
    /// Parse a diagnostics script without contacting any host.
    #[command(name = "check", about = "Validate a diagnostics script")]
    Check(CheckCommand),
}

/// Arguments for the `crashd run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Override the working directory that receives collected artifacts.
    ///
    /// A `WORKDIR` instruction in the script still takes precedence.
    #[arg(long, value_name = "DIR")]
    pub(crate) workdir: Option<String>,
    /// Number of hosts processed at once; 1 processes hosts sequentially.
    #[arg(long, value_name = "N")]
    pub(crate) concurrency: Option<usize>,
    /// Path to the diagnostics script.
    #[arg(value_name = "FILE")]
    pub(crate) file: String,
}

/// Arguments for the `crashd check` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CheckCommand {
    /// Path to the diagnostics script.
    #[arg(value_name = "FILE")]
    pub(crate) file: String,
}

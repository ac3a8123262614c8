//! Binary entry point for the crashd CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crashd::{
    ConfigError, CrashdConfig, FanOutExecutor, RunError, Script, ScriptActionResult, ScriptError,
    ScriptRunner, SshSessionProvider,
};

mod cli;

use cli::{CheckCommand, Cli, RunCommand};

/// Exit status when the script ran but at least one resource failed.
const EXIT_PARTIAL_FAILURE: i32 = 2;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
    #[error("run failed: {0}")]
    Run(#[from] RunError),
    #[error("failed to write results: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli, io::stdout()).await {
        Ok(code) => code,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crashd=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli, out: impl Write) -> Result<i32, CliError> {
    match cli {
        Cli::Run(command) => run_command(command, out).await,
        Cli::Check(command) => check_command(&command, out),
    }
}

async fn run_command(args: RunCommand, out: impl Write) -> Result<i32, CliError> {
    let config = effective_config(CrashdConfig::load_without_cli_args()?, &args);
    config.validate()?;
    let script = Script::parse_file(Utf8Path::new(&args.file))?;

    let provider = SshSessionProvider::with_process_runner(config.tooling());
    let executor = FanOutExecutor::new(provider, config.concurrency_policy());
    let runner = ScriptRunner::new(config.defaults(), executor);
    let results = runner.execute(&script).await?;

    write_results(out, &results)
}

/// Applies command-line overrides on top of layered configuration.
fn effective_config(mut config: CrashdConfig, args: &RunCommand) -> CrashdConfig {
    if let Some(workdir) = &args.workdir {
        workdir.clone_into(&mut config.workdir);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    config
}

fn check_command(args: &CheckCommand, mut out: impl Write) -> Result<i32, CliError> {
    let script = Script::parse_file(Utf8Path::new(&args.file))?;
    let actions = script.actions().count();
    writeln!(
        out,
        "{}: {} instructions, {actions} actions",
        args.file,
        script.len()
    )
    .map_err(|err| CliError::Output(err.to_string()))?;
    Ok(0)
}

/// Writes one JSON line per action and derives the exit status.
fn write_results(mut out: impl Write, results: &[ScriptActionResult]) -> Result<i32, CliError> {
    for result in results {
        let line =
            serde_json::to_string(result).map_err(|err| CliError::Output(err.to_string()))?;
        writeln!(out, "{line}").map_err(|err| CliError::Output(err.to_string()))?;
    }
    let failed = results.iter().any(|result| result.result.has_failures());
    Ok(if failed { EXIT_PARTIAL_FAILURE } else { 0 })
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

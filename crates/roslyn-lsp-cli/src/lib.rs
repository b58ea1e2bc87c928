//! Command-line front end for the Roslyn language server supervisor.
//!
//! Each invocation loads configuration, installs logging on stderr, runs a
//! single subcommand against a supervised server, and shuts the server down.
//! Results go to stdout as JSON so the tool composes with shell pipelines.
//! Usage errors exit with status 2; operational failures exit with status 1
//! after printing the error chain.

use std::error::Error as _;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use roslyn_lsp_config::{Config, ConfigError};
use roslyn_lsp_host::{
    BinaryAcquirer, Platform, REQUIRED_CAPABILITIES, RoslynSupervisor, telemetry,
};
use serde_json::{Map, Value};
use tracing::debug;

mod cli;
mod errors;

use cli::{Cli, CliCommand};
use errors::AppError;

/// Log target for the CLI runtime.
const CLI_TARGET: &str = "roslyn_lsp_cli";

/// Source of the configuration used by a run.
pub(crate) trait ConfigLoader {
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Reads `ROSLYN_LSP_*` variables from the process environment.
pub(crate) struct EnvConfigLoader;

impl ConfigLoader for EnvConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::from_env()
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &EnvConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let result = Cli::try_parse_from(args)
        .map_err(AppError::from)
        .and_then(|cli| {
            let config = loader.load().map_err(AppError::Configuration)?;
            telemetry::initialise(&config).map_err(AppError::Telemetry)?;
            execute(cli.command, &config, stdout)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::CliUsage(error)) if !error.use_stderr() => {
            let _ignored = write!(stdout, "{error}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            let _ignored = write!(stderr, "{}", render_error(&error));
            error.exit_code()
        }
    }
}

fn execute<W: Write>(command: CliCommand, config: &Config, stdout: &mut W) -> Result<(), AppError> {
    debug!(target: CLI_TARGET, ?command, "running command");
    match command {
        CliCommand::Fetch => {
            let artifact = BinaryAcquirer::from_config(config).ensure_binary(&Platform::current())?;
            writeln!(stdout, "{}", artifact.path().display()).map_err(AppError::Output)
        }
        CliCommand::Check { root } => {
            let supervisor = RoslynSupervisor::start_for_workspace(config, &root)?;
            let encoded = serde_json::to_value(supervisor.capabilities());
            supervisor.shutdown();
            let negotiated = encoded.map_err(AppError::Encode)?;
            emit(stdout, &capability_summary(&negotiated))
        }
        CliCommand::Request {
            root,
            method,
            params,
            timeout_secs,
        } => {
            let params: Value = serde_json::from_str(&params).map_err(AppError::InvalidParams)?;
            let result = forward_once(config, &root, &method, params, timeout_secs)?;
            emit(stdout, &result)
        }
    }
}

fn forward_once(
    config: &Config,
    root: &Path,
    method: &str,
    params: Value,
    timeout_secs: Option<u64>,
) -> Result<Value, AppError> {
    let mut supervisor = RoslynSupervisor::start_for_workspace(config, root)?;
    let outcome = supervisor.forward(method, params, timeout_secs.map(Duration::from_secs));
    supervisor.shutdown();
    outcome.map_err(AppError::from)
}

/// Projects the negotiated capabilities onto the ones the supervisor requires.
fn capability_summary(negotiated: &Value) -> Value {
    let summary: Map<String, Value> = REQUIRED_CAPABILITIES
        .iter()
        .map(|name| {
            let value = negotiated.get(*name).cloned().unwrap_or(Value::Null);
            ((*name).to_owned(), value)
        })
        .collect();
    Value::Object(summary)
}

fn emit<W: Write>(stdout: &mut W, value: &Value) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value).map_err(AppError::Encode)?;
    writeln!(stdout, "{text}").map_err(AppError::Output)
}

/// Formats an error followed by its chain of causes.
fn render_error(error: &AppError) -> String {
    if let AppError::CliUsage(usage) = error {
        return usage.to_string();
    }
    let mut rendered = format!("error: {error}\n");
    let mut cause = error.source();
    while let Some(current) = cause {
        let _ignored = writeln!(rendered, "  caused by: {current}");
        cause = current.source();
    }
    rendered
}

//! Errors surfaced by the CLI runtime.

use std::io;
use std::process::ExitCode;

use roslyn_lsp_config::ConfigError;
use roslyn_lsp_host::SupervisorError;
use roslyn_lsp_host::telemetry::TelemetryError;
use thiserror::Error;

/// Exit status for usage errors, matching clap.
pub(crate) const USAGE_EXIT: u8 = 2;

/// Failures reported to the operator.
#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    CliUsage(#[from] clap::Error),
    #[error("request parameters are not valid JSON: {0}")]
    InvalidParams(#[source] serde_json::Error),
    #[error("failed to load configuration")]
    Configuration(#[source] ConfigError),
    #[error("failed to initialise logging")]
    Telemetry(#[source] TelemetryError),
    #[error("{step} step failed")]
    Supervisor {
        step: roslyn_lsp_host::SupervisorStep,
        #[source]
        source: SupervisorError,
    },
    #[error("failed to encode output")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write output")]
    Output(#[source] io::Error),
}

impl AppError {
    /// Usage mistakes exit with 2, everything else with 1.
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::CliUsage(error) if !error.use_stderr() => ExitCode::SUCCESS,
            Self::CliUsage(_) | Self::InvalidParams(_) => ExitCode::from(USAGE_EXIT),
            _ => ExitCode::FAILURE,
        }
    }
}

impl From<SupervisorError> for AppError {
    fn from(source: SupervisorError) -> Self {
        Self::Supervisor {
            step: source.step(),
            source,
        }
    }
}

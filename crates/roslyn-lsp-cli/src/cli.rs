//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface for the Roslyn language server supervisor.
#[derive(Parser, Debug)]
#[command(name = "roslyn-lsp", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations offered by the CLI.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Ensures the server binary for this host is installed and prints its path.
    Fetch,
    /// Starts the server for a workspace and prints its required capabilities.
    Check {
        /// Workspace root to open.
        root: PathBuf,
    },
    /// Forwards one request through the restart-and-retry protocol.
    Request {
        /// Workspace root to open.
        root: PathBuf,
        /// LSP method, for example `workspace/symbol`.
        method: String,
        /// Request parameters as JSON.
        #[arg(default_value = "{}")]
        params: String,
        /// Overrides the configured request timeout.
        #[arg(long, value_name = "SECONDS")]
        timeout_secs: Option<u64>,
    },
}

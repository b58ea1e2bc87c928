//! CLI entrypoint for the Roslyn language server supervisor.
//!
//! The binary delegates to [`roslyn_lsp_cli::run`], which loads
//! configuration from the environment, installs logging, and runs one
//! subcommand against a supervised server.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: helper threads log to stderr while a command runs.
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    roslyn_lsp_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}

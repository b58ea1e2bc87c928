//! Integration tests for the `roslyn-lsp` binary entry point.
//!
//! Verifies exit codes and user-facing error output without reaching a real
//! language server.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn missing_subcommand_is_a_usage_error() {
    let mut command = cargo_bin_cmd!("roslyn-lsp");
    command.assert().code(2).stderr(contains("Usage"));
}

#[test]
fn version_flag_succeeds() {
    let mut command = cargo_bin_cmd!("roslyn-lsp");
    command.arg("--version");
    command.assert().success().stdout(contains("roslyn-lsp"));
}

#[test]
fn invalid_environment_fails_before_any_work() {
    let mut command = cargo_bin_cmd!("roslyn-lsp");
    command
        .env("ROSLYN_LSP_REQUEST_TIMEOUT_SECS", "soon")
        .arg("fetch");
    command
        .assert()
        .code(1)
        .stderr(contains("ROSLYN_LSP_REQUEST_TIMEOUT_SECS"));
}

#[test]
fn unreachable_package_source_is_an_operational_failure() -> anyhow::Result<()> {
    let cache = TempDir::new()?;
    let mut command = cargo_bin_cmd!("roslyn-lsp");
    command
        .env("ROSLYN_LSP_CACHE_DIR", cache.path())
        .env("ROSLYN_LSP_PACKAGE_SOURCE", "http://127.0.0.1:9/feed")
        .env("ROSLYN_LSP_LOG_FILTER", "off")
        .arg("fetch");
    command.assert().code(1).stderr(contains("error: acquisition step failed"));
    Ok(())
}

#[test]
fn malformed_request_params_exit_with_two() {
    let mut command = cargo_bin_cmd!("roslyn-lsp");
    command.args(["request", ".", "workspace/symbol", "{oops"]);
    command
        .assert()
        .code(2)
        .stderr(contains("not valid JSON"));
}

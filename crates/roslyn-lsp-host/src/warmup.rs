//! Best-effort design-time build before the server starts.
//!
//! Resolving references ahead of time populates the MSBuild caches the
//! server's BuildHost would otherwise fill while loading the solution, which
//! shortens the window in which the named-pipe timeout can strike. Nothing
//! here can fail startup.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use roslyn_lsp_config::Config;
use tracing::{debug, info, warn};

use crate::handshake::Workspace;
use crate::launch::{environment_with_defaults, locate_dotnet};
use crate::process::lifecycle::{self, ExitWait};

/// Log target for the warm-up.
const WARMUP_TARGET: &str = "roslyn_lsp_host::warmup";

/// Bound on `dotnet build-server shutdown`.
const BUILD_SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Why the warm-up did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Disabled by configuration.
    Disabled,
    /// No solution or project was found.
    NoTarget,
    /// No `dotnet` toolchain is available.
    NoToolchain,
}

/// Result of a warm-up attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupOutcome {
    /// The build was not attempted.
    Skipped(SkipReason),
    /// The build finished successfully.
    Completed,
    /// The build exited unsuccessfully or could not start.
    Failed {
        /// Exit code, when the process produced one.
        code: Option<i32>,
    },
    /// The build exceeded its time bound and was killed.
    TimedOut,
}

/// Runs the design-time build for a workspace.
#[derive(Debug, Clone)]
pub struct WarmupCoordinator {
    toolchain: Option<PathBuf>,
    timeout: Duration,
    enabled: bool,
}

impl WarmupCoordinator {
    /// Creates a coordinator using an explicit `dotnet` executable.
    #[must_use]
    pub const fn new(toolchain: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            toolchain,
            timeout,
            enabled: true,
        }
    }

    /// Creates a coordinator from configuration, locating `dotnet` on `PATH`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let toolchain = if config.warmup_enabled() {
            locate_dotnet()
        } else {
            None
        };
        Self {
            toolchain,
            timeout: config.warmup_timeout(),
            enabled: config.warmup_enabled(),
        }
    }

    /// Creates a coordinator that never builds.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            toolchain: None,
            timeout: Duration::ZERO,
            enabled: false,
        }
    }

    /// Warms the build caches for `workspace`. Never fails.
    pub fn warmup(&self, workspace: &Workspace) -> WarmupOutcome {
        let outcome = self.run(workspace);
        match outcome {
            WarmupOutcome::Skipped(reason) => {
                info!(target: WARMUP_TARGET, ?reason, "design-time build skipped");
            }
            WarmupOutcome::Completed => {
                info!(target: WARMUP_TARGET, "design-time build completed");
            }
            WarmupOutcome::Failed { code } => {
                warn!(
                    target: WARMUP_TARGET,
                    ?code,
                    "design-time build failed, continuing without warm caches"
                );
            }
            WarmupOutcome::TimedOut => {
                warn!(
                    target: WARMUP_TARGET,
                    timeout_secs = self.timeout.as_secs(),
                    "design-time build timed out, continuing without warm caches"
                );
            }
        }
        outcome
    }

    fn run(&self, workspace: &Workspace) -> WarmupOutcome {
        if !self.enabled {
            return WarmupOutcome::Skipped(SkipReason::Disabled);
        }
        let Some(target) = workspace.target() else {
            return WarmupOutcome::Skipped(SkipReason::NoTarget);
        };
        let Some(dotnet) = self.toolchain.as_deref() else {
            return WarmupOutcome::Skipped(SkipReason::NoToolchain);
        };

        self.shutdown_build_servers(dotnet, workspace.root());

        info!(
            target: WARMUP_TARGET,
            target_path = %target.path().display(),
            "running design-time build"
        );
        let started = Instant::now();
        let mut build = command(dotnet, workspace.root());
        build
            .arg("msbuild")
            .arg(target.path())
            .args([
                "-t:ResolveReferences",
                "-p:DesignTimeBuild=true",
                "-p:BuildProjectReferences=false",
                "-p:SkipCompilerExecution=true",
                "-nologo",
                "-v:q",
            ]);
        let mut child = match build.spawn() {
            Ok(child) => child,
            Err(error) => {
                debug!(target: WARMUP_TARGET, error = %error, "failed to start msbuild");
                return WarmupOutcome::Failed { code: None };
            }
        };

        match lifecycle::wait_with_deadline(&mut child, self.timeout) {
            ExitWait::Exited(status) if status.success() => {
                debug!(
                    target: WARMUP_TARGET,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "msbuild finished"
                );
                WarmupOutcome::Completed
            }
            ExitWait::Exited(status) => WarmupOutcome::Failed {
                code: status.code(),
            },
            ExitWait::TimedOut => {
                lifecycle::kill(&mut child);
                WarmupOutcome::TimedOut
            }
            ExitWait::Failed(error) => {
                debug!(target: WARMUP_TARGET, error = %error, "lost track of msbuild");
                lifecycle::kill(&mut child);
                WarmupOutcome::Failed { code: None }
            }
        }
    }

    /// Stops lingering compiler servers so the build starts clean.
    fn shutdown_build_servers(&self, dotnet: &Path, root: &Path) {
        let mut shutdown = command(dotnet, root);
        shutdown.args(["build-server", "shutdown"]);
        let bound = BUILD_SERVER_SHUTDOWN_TIMEOUT.min(self.timeout);
        match shutdown.spawn() {
            Ok(mut child) => match lifecycle::wait_with_deadline(&mut child, bound) {
                ExitWait::Exited(status) => {
                    debug!(target: WARMUP_TARGET, ?status, "build servers shut down");
                }
                ExitWait::TimedOut | ExitWait::Failed(_) => lifecycle::kill(&mut child),
            },
            Err(error) => {
                debug!(
                    target: WARMUP_TARGET,
                    error = %error,
                    "failed to shut down build servers"
                );
            }
        }
    }
}

fn command(dotnet: &Path, root: &Path) -> Command {
    let mut command = Command::new(dotnet);
    command
        .current_dir(root)
        .envs(environment_with_defaults(&[]))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    command
}

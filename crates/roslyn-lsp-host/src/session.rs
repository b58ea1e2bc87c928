//! Launching a ready-to-use server session.
//!
//! A session is one process that has completed the handshake. The
//! supervisor only ever sees the [`ServerSession`] and [`SessionLauncher`]
//! traits, so its restart protocol can be driven by scripted doubles.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lsp_types::ServerCapabilities;
use roslyn_lsp_config::Config;
use serde_json::Value;
use tracing::debug;

use crate::acquire::{BinaryAcquirer, ServerArtifact};
use crate::errors::SupervisorError;
use crate::forwarder::TimeoutWindow;
use crate::handshake::{self, Workspace};
use crate::launch::LaunchCommand;
use crate::platform::Platform;
use crate::process::ServerProcess;
use crate::transport::{ResponsePolicies, TransportError};
use crate::warmup::{WarmupCoordinator, WarmupOutcome};
use crate::watchdog::FailureSignal;

/// Log target for session launches.
const SESSION_TARGET: &str = "roslyn_lsp_host::session";

/// A live, initialised server.
pub trait ServerSession {
    /// Forwards a request with an already-computed timeout.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] raised by the exchange.
    fn request(&mut self, method: &str, params: Value, timeout: Duration)
    -> Result<Value, TransportError>;

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] raised by the write.
    fn notify(&mut self, method: &str, params: Value) -> Result<(), TransportError>;

    /// Waits up to `bound` for the diagnostic stream of a dead process to
    /// be fully inspected.
    fn settle(&mut self, bound: Duration);

    /// Capabilities negotiated during the handshake.
    fn capabilities(&self) -> &ServerCapabilities;

    /// Stops the session. Total and idempotent.
    fn stop(&mut self);
}

/// Produces sessions wired to a given failure signal.
pub trait SessionLauncher {
    /// Session type produced.
    type Session: ServerSession;

    /// Starts a session whose diagnostic stream trips `signal`.
    ///
    /// # Errors
    ///
    /// Returns a [`SupervisorError`] when the launch or handshake fails.
    fn launch(&mut self, signal: &FailureSignal) -> Result<Self::Session, SupervisorError>;
}

/// Launches the Roslyn server: warm-up, spawn, then handshake.
#[derive(Debug)]
pub struct RoslynLauncher {
    command: LaunchCommand,
    workspace: Workspace,
    warmup: WarmupCoordinator,
    policies: Arc<ResponsePolicies>,
    request_timeout: Duration,
    grace: Duration,
    last_warmup: Option<WarmupOutcome>,
}

impl RoslynLauncher {
    /// Assembles a launcher from its parts.
    #[must_use]
    pub fn new(command: LaunchCommand, workspace: Workspace, warmup: WarmupCoordinator) -> Self {
        let policies = Arc::new(handshake::roslyn_policies(&workspace));
        Self {
            command,
            workspace,
            warmup,
            policies,
            request_timeout: roslyn_lsp_config::DEFAULT_REQUEST_TIMEOUT,
            grace: roslyn_lsp_config::DEFAULT_FIRST_REQUEST_GRACE,
            last_warmup: None,
        }
    }

    /// Sets the timeouts applied to the `initialize` request.
    #[must_use]
    pub const fn with_timeouts(mut self, request_timeout: Duration, grace: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.grace = grace;
        self
    }

    /// Acquires the server for this host and prepares to serve `root`.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error, or [`SupervisorError::MissingRuntime`]
    /// when the installed server needs a `dotnet` host that is absent.
    pub fn prepare(config: &Config, root: &Path) -> Result<Self, SupervisorError> {
        let artifact = BinaryAcquirer::from_config(config).ensure_binary(&Platform::current())?;
        Self::for_artifact(config, &artifact, root)
    }

    /// Prepares to serve `root` with an already-installed server.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::MissingRuntime`] when the artifact needs a
    /// `dotnet` host that is absent.
    pub fn for_artifact(
        config: &Config,
        artifact: &ServerArtifact,
        root: &Path,
    ) -> Result<Self, SupervisorError> {
        let log_dir = config.cache_dir().join("logs");
        let command = LaunchCommand::for_server(
            artifact,
            config.server_log_level(),
            log_dir.as_std_path(),
            root,
        )?;
        let workspace = Workspace::discover(root);
        Ok(
            Self::new(command, workspace, WarmupCoordinator::from_config(config))
                .with_timeouts(config.request_timeout(), config.first_request_grace()),
        )
    }

    /// Workspace served by launched sessions.
    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Outcome of the most recent warm-up.
    #[must_use]
    pub const fn last_warmup(&self) -> Option<WarmupOutcome> {
        self.last_warmup
    }
}

impl SessionLauncher for RoslynLauncher {
    type Session = RoslynSession;

    fn launch(&mut self, signal: &FailureSignal) -> Result<RoslynSession, SupervisorError> {
        self.last_warmup = Some(self.warmup.warmup(&self.workspace));

        let mut process =
            ServerProcess::spawn(&self.command, Arc::clone(&self.policies), signal.clone())?;
        let now = Instant::now();
        let timeout =
            TimeoutWindow::open(now, self.grace).effective_timeout(self.request_timeout, now);
        debug!(
            target: SESSION_TARGET,
            pid = process.pid(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "starting handshake"
        );
        match handshake::initialize(&process, &self.workspace, timeout) {
            Ok(capabilities) => Ok(RoslynSession {
                process,
                capabilities,
            }),
            Err(error) => {
                process.stop();
                Err(error)
            }
        }
    }
}

/// A handshaken Roslyn server process.
#[derive(Debug)]
pub struct RoslynSession {
    process: ServerProcess,
    capabilities: ServerCapabilities,
}

impl RoslynSession {
    /// Underlying process.
    #[must_use]
    pub const fn process(&self) -> &ServerProcess {
        &self.process
    }
}

impl ServerSession for RoslynSession {
    fn request(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        self.process.request(method, params, timeout)
    }

    fn notify(&mut self, method: &str, params: Value) -> Result<(), TransportError> {
        self.process.notify(method, params)
    }

    fn settle(&mut self, bound: Duration) {
        if !self.process.await_diagnostics(bound) {
            debug!(
                target: SESSION_TARGET,
                pid = self.process.pid(),
                "diagnostic stream still open after failure"
            );
        }
    }

    fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    fn stop(&mut self) {
        self.process.stop();
    }
}

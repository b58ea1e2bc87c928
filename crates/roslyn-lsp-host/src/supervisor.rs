//! The supervisor and its restart-and-retry protocol.
//!
//! The supervisor owns at most one live session. Requests go through an
//! adaptive timeout window; a failed request earns exactly one
//! restart-and-retry, and only when the failure watchdog saw the BuildHost
//! pipe timeout on the dying process's diagnostic stream. Every other
//! failure is returned unchanged.

use std::path::Path;
use std::time::{Duration, Instant};

use lsp_types::ServerCapabilities;
use roslyn_lsp_config::Config;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::SupervisorError;
use crate::forwarder::TimeoutWindow;
use crate::session::{RoslynLauncher, ServerSession, SessionLauncher};
use crate::transport::TransportError;
use crate::watchdog::FailureSignal;

/// Log target for supervisor decisions.
const SUPERVISOR_TARGET: &str = "roslyn_lsp_host::supervisor";

/// How long a failed request waits for a dead process's stderr to drain
/// before the watchdog signal is consulted.
pub const DIAGNOSTIC_DRAIN: Duration = Duration::from_millis(500);

/// Observable state of the failure watchdog for the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    /// No signature seen since the last spawn.
    Armed,
    /// The signature was seen and not yet acted upon.
    Tripped,
    /// A trip was consumed by a restart decision.
    Consumed,
}

/// Whether an automatic restart-and-retry is still available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u8,
}

impl RetryBudget {
    /// A budget allowing one restart-and-retry.
    #[must_use]
    pub const fn full() -> Self {
        Self { remaining: 1 }
    }

    /// Restores the single allowance.
    pub fn reset(&mut self) {
        self.remaining = 1;
    }

    /// Uses the allowance, returning whether one was left.
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining = 0;
        true
    }

    /// Allowances left, `0` or `1`.
    #[must_use]
    pub const fn remaining(&self) -> u8 {
        self.remaining
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::full()
    }
}

/// Tunables of the forwarding and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Grace window opened on every spawn.
    pub first_request_grace: Duration,
    /// Timeout for requests that do not specify one.
    pub request_timeout: Duration,
    /// Whether a signature-correlated failure triggers a restart-and-retry.
    pub retry_on_signature: bool,
}

impl SupervisorOptions {
    /// Reads the options from configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            first_request_grace: config.first_request_grace(),
            request_timeout: config.request_timeout(),
            retry_on_signature: config.retry_on_signature(),
        }
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            first_request_grace: roslyn_lsp_config::DEFAULT_FIRST_REQUEST_GRACE,
            request_timeout: roslyn_lsp_config::DEFAULT_REQUEST_TIMEOUT,
            retry_on_signature: true,
        }
    }
}

/// Supervises one language server on behalf of a single caller.
pub struct Supervisor<L: SessionLauncher> {
    launcher: L,
    session: Option<L::Session>,
    signal: FailureSignal,
    consumed: bool,
    budget: RetryBudget,
    window: TimeoutWindow,
    options: SupervisorOptions,
    generation: u64,
}

/// Supervisor of the real Roslyn server.
pub type RoslynSupervisor = Supervisor<RoslynLauncher>;

impl Supervisor<RoslynLauncher> {
    /// Acquires the server, starts it for `root`, and completes the
    /// handshake.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`SupervisorError`] of the first failing step.
    pub fn start_for_workspace(config: &Config, root: &Path) -> Result<Self, SupervisorError> {
        let launcher = RoslynLauncher::prepare(config, root)?;
        let mut supervisor = Self::new(launcher, SupervisorOptions::from_config(config));
        supervisor.start()?;
        Ok(supervisor)
    }
}

impl<L: SessionLauncher> Supervisor<L> {
    /// Creates a supervisor with no running server.
    pub fn new(launcher: L, options: SupervisorOptions) -> Self {
        Self {
            launcher,
            session: None,
            signal: FailureSignal::new(),
            consumed: false,
            budget: RetryBudget::full(),
            window: TimeoutWindow::closed(),
            options,
            generation: 0,
        }
    }

    /// Starts the server unless one is already running.
    ///
    /// # Errors
    ///
    /// Returns the launcher's error when the server cannot be started.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if self.session.is_some() {
            return Ok(());
        }
        self.spawn()
    }

    /// Stops any running server and starts a fresh one.
    ///
    /// # Errors
    ///
    /// Returns the launcher's error when the server cannot be started.
    pub fn restart(&mut self) -> Result<(), SupervisorError> {
        self.spawn()
    }

    /// Forwards a request, applying the adaptive timeout and retry policy.
    ///
    /// `timeout` defaults to the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotRunning`] when no server runs,
    /// [`SupervisorError::Transport`] when the request fails and no retry
    /// applies (or the retry also fails), and the launcher's error when the
    /// restart itself fails.
    pub fn forward(
        &mut self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, SupervisorError> {
        let requested = timeout.unwrap_or(self.options.request_timeout);
        let failure = match self.attempt(method, params.clone(), requested)? {
            Ok(result) => return Ok(result),
            Err(failure) => failure,
        };

        if !self.claim_retry(method, &failure) {
            return Err(SupervisorError::transport(method, failure));
        }

        warn!(
            target: SUPERVISOR_TARGET,
            method,
            error = %failure,
            "request failed after BuildHost pipe timeout, restarting language server"
        );
        self.spawn()?;

        match self.attempt(method, params, requested)? {
            Ok(result) => {
                info!(target: SUPERVISOR_TARGET, method, "request succeeded after restart");
                Ok(result)
            }
            Err(retry_failure) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    method,
                    error = %retry_failure,
                    "retried request failed, giving up"
                );
                Err(SupervisorError::transport(method, retry_failure))
            }
        }
    }

    /// Sends a notification to the running server.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotRunning`] when no server runs and
    /// [`SupervisorError::Transport`] when the write fails.
    pub fn notify(&mut self, method: &str, params: Value) -> Result<(), SupervisorError> {
        let session = self.session.as_mut().ok_or(SupervisorError::NotRunning)?;
        session
            .notify(method, params)
            .map_err(|source| SupervisorError::transport(method, source))
    }

    /// Stops the running server. Total and idempotent.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            info!(
                target: SUPERVISOR_TARGET,
                generation = self.generation,
                "stopping language server"
            );
            session.stop();
        }
        self.window = TimeoutWindow::closed();
    }

    /// Stops the server and releases the supervisor.
    pub fn shutdown(mut self) {
        self.stop();
    }

    /// Whether a server session is live.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Number of sessions started so far.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// State of the failure watchdog for the current process.
    #[must_use]
    pub fn phase(&self) -> WatchdogPhase {
        if self.signal.is_tripped() {
            WatchdogPhase::Tripped
        } else if self.consumed {
            WatchdogPhase::Consumed
        } else {
            WatchdogPhase::Armed
        }
    }

    /// Restart-and-retry allowances left for the current process.
    #[must_use]
    pub const fn retry_budget(&self) -> RetryBudget {
        self.budget
    }

    /// Current adaptive timeout window.
    #[must_use]
    pub const fn timeout_window(&self) -> TimeoutWindow {
        self.window
    }

    /// Capabilities negotiated with the running server.
    #[must_use]
    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.session.as_ref().map(ServerSession::capabilities)
    }

    /// Launcher used for (re)starts.
    #[must_use]
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Sends one request to the current session.
    ///
    /// The outer `Result` carries [`SupervisorError::NotRunning`]; the inner
    /// one the transport outcome.
    fn attempt(
        &mut self,
        method: &str,
        params: Value,
        requested: Duration,
    ) -> Result<Result<Value, TransportError>, SupervisorError> {
        let session = self.session.as_mut().ok_or(SupervisorError::NotRunning)?;
        let timeout = self.window.effective_timeout(requested, Instant::now());
        Ok(session.request(method, params, timeout))
    }

    /// Decides whether `failure` earns a restart-and-retry, consuming the
    /// trip and the budget when it does.
    fn claim_retry(&mut self, method: &str, failure: &TransportError) -> bool {
        if !self.options.retry_on_signature || self.budget.remaining() == 0 {
            return false;
        }
        if matches!(failure, TransportError::Closed | TransportError::Io(_)) {
            if let Some(session) = self.session.as_mut() {
                session.settle(DIAGNOSTIC_DRAIN);
            }
        }
        if !self.signal.take() {
            debug!(
                target: SUPERVISOR_TARGET,
                method,
                error = %failure,
                "request failed without the BuildHost signature, not retrying"
            );
            return false;
        }
        self.consumed = true;
        self.budget.consume()
    }

    /// Replaces the current session with a fresh one.
    fn spawn(&mut self) -> Result<(), SupervisorError> {
        self.stop();
        let signal = FailureSignal::new();
        let session = self.launcher.launch(&signal)?;

        self.session = Some(session);
        self.signal = signal;
        self.consumed = false;
        self.budget.reset();
        self.window = TimeoutWindow::open(Instant::now(), self.options.first_request_grace);
        self.generation += 1;
        info!(
            target: SUPERVISOR_TARGET,
            generation = self.generation,
            "language server ready"
        );
        Ok(())
    }
}

impl<L: SessionLauncher> Drop for Supervisor<L> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<L: SessionLauncher> std::fmt::Debug for Supervisor<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("running", &self.is_running())
            .field("generation", &self.generation)
            .field("phase", &self.phase())
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

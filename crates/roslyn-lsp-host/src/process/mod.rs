//! Ownership of one language server process.

pub(crate) mod lifecycle;

use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::SupervisorError;
use crate::launch::LaunchCommand;
use crate::transport::{Connection, ResponsePolicies, RpcChannel, TransportError};
use crate::watchdog::{FailureSignal, spawn_watchdog};
use lifecycle::PROCESS_TARGET;

/// Time the server gets to exit after `exit` before it is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Bound on the `shutdown` request sent while stopping.
const SHUTDOWN_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

enum ProcessState {
    Running {
        child: Child,
        connection: Connection,
        watchdog: JoinHandle<()>,
    },
    Stopped,
}

/// A spawned server with its transport and diagnostic watchdog.
///
/// Stopping is total: it never fails, never panics, may be called any
/// number of times, and runs automatically on drop.
pub struct ServerProcess {
    pid: u32,
    signal: FailureSignal,
    state: ProcessState,
}

impl ServerProcess {
    /// Starts the server described by `command`.
    ///
    /// Standard input and output carry the protocol; standard error is
    /// drained by a watchdog thread that trips `signal` on the failure
    /// signature. `policies` answers server-initiated requests.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Spawn`] if the process or its helper
    /// threads cannot be started.
    pub fn spawn(
        command: &LaunchCommand,
        policies: Arc<ResponsePolicies>,
        signal: FailureSignal,
    ) -> Result<Self, SupervisorError> {
        debug!(
            target: PROCESS_TARGET,
            command = %command.program().display(),
            args = ?command.args(),
            "spawning language server process"
        );

        let mut process = Command::new(command.program());
        process
            .args(command.args())
            .envs(command.environment())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = command.working_dir() {
            process.current_dir(dir);
        }

        let spawn_error = |source: io::Error| SupervisorError::Spawn {
            command: command.program().to_path_buf(),
            source: Arc::new(source),
        };

        let mut child = process.spawn().map_err(spawn_error)?;
        let pid = child.id();

        let streams = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = streams else {
            lifecycle::kill(&mut child);
            return Err(spawn_error(io::Error::other("failed to capture server stdio")));
        };

        let watchdog = match spawn_watchdog(stderr, signal.clone()) {
            Ok(handle) => handle,
            Err(error) => {
                lifecycle::kill(&mut child);
                return Err(spawn_error(error));
            }
        };
        let connection = match Connection::open(stdout, stdin, policies) {
            Ok(connection) => connection,
            Err(error) => {
                lifecycle::kill(&mut child);
                return Err(spawn_error(io::Error::other(error.to_string())));
            }
        };

        info!(target: PROCESS_TARGET, pid, "language server process started");
        Ok(Self {
            pid,
            signal,
            state: ProcessState::Running {
                child,
                connection,
                watchdog,
            },
        })
    }

    /// Operating system identifier of the process.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Signal tripped by this process's watchdog.
    #[must_use]
    pub const fn signal(&self) -> &FailureSignal {
        &self.signal
    }

    /// Whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        match &mut self.state {
            ProcessState::Running { child, .. } => matches!(child.try_wait(), Ok(None)),
            ProcessState::Stopped => false,
        }
    }

    /// Forwards a request to the server.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] raised by the connection, or
    /// [`TransportError::Closed`] once the process has been stopped.
    pub fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        match &self.state {
            ProcessState::Running { connection, .. } => connection.request(method, params, timeout),
            ProcessState::Stopped => Err(TransportError::Closed),
        }
    }

    /// Sends a notification to the server.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] raised by the connection, or
    /// [`TransportError::Closed`] once the process has been stopped.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        match &self.state {
            ProcessState::Running { connection, .. } => connection.notify(method, params),
            ProcessState::Stopped => Err(TransportError::Closed),
        }
    }

    /// Waits up to `bound` for the diagnostic stream to reach end of file.
    ///
    /// Returns `true` once every stderr line has been inspected. A process
    /// that is still alive keeps its stderr open, so callers use this only
    /// after the process died.
    pub fn await_diagnostics(&self, bound: Duration) -> bool {
        let ProcessState::Running { watchdog, .. } = &self.state else {
            return true;
        };
        let start = Instant::now();
        while !watchdog.is_finished() {
            if start.elapsed() >= bound {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// Stops the process: `shutdown`, `exit`, a grace period, then kill.
    pub fn stop(&mut self) {
        let ProcessState::Running {
            mut child,
            connection,
            watchdog,
        } = std::mem::replace(&mut self.state, ProcessState::Stopped)
        else {
            return;
        };

        debug!(target: PROCESS_TARGET, pid = self.pid, "stopping language server");
        if matches!(child.try_wait(), Ok(None)) && !connection.is_closed() {
            if let Err(error) = connection.request("shutdown", Value::Null, SHUTDOWN_REQUEST_TIMEOUT)
            {
                debug!(
                    target: PROCESS_TARGET,
                    pid = self.pid,
                    error = %error,
                    "shutdown request failed"
                );
            }
            if let Err(error) = connection.notify("exit", Value::Null) {
                debug!(
                    target: PROCESS_TARGET,
                    pid = self.pid,
                    error = %error,
                    "exit notification failed"
                );
            }
        }

        lifecycle::terminate(&mut child, STOP_GRACE);
        drop(connection);
        // The stderr reader ends at EOF on its own.
        drop(watchdog);
        info!(target: PROCESS_TARGET, pid = self.pid, "language server process stopped");
    }

    /// Whether [`ServerProcess::stop`] has run.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self.state, ProcessState::Stopped)
    }
}

impl RpcChannel for ServerProcess {
    fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        Self::request(self, method, params, timeout)
    }

    fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        Self::notify(self, method, params)
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ServerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProcess")
            .field("pid", &self.pid)
            .field("stopped", &self.is_stopped())
            .field("tripped", &self.signal.is_tripped())
            .finish()
    }
}

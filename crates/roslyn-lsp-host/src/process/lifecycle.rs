//! Bounded waiting on child processes.

use std::io;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Log target for process lifecycle events.
pub(crate) const PROCESS_TARGET: &str = "roslyn_lsp_host::process";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of waiting on a child with a deadline.
#[derive(Debug)]
pub(crate) enum ExitWait {
    /// The child exited on its own.
    Exited(ExitStatus),
    /// The deadline passed with the child still running.
    TimedOut,
    /// The exit status could not be queried.
    Failed(io::Error),
}

/// Polls the child until it exits or `timeout` elapses.
pub(crate) fn wait_with_deadline(child: &mut Child, timeout: Duration) -> ExitWait {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return ExitWait::Exited(status),
            Ok(None) if start.elapsed() >= timeout => return ExitWait::TimedOut,
            Ok(None) => thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(start.elapsed()))),
            Err(error) => return ExitWait::Failed(error),
        }
    }
}

/// Kills the child and reaps it. Errors are logged, never returned.
pub(crate) fn kill(child: &mut Child) {
    if let Err(error) = child.kill() {
        debug!(
            target: PROCESS_TARGET,
            pid = child.id(),
            error = %error,
            "kill failed, process has likely exited"
        );
    }
    drop(child.wait());
}

/// Waits up to `grace` for the child to exit, then kills it.
pub(crate) fn terminate(child: &mut Child, grace: Duration) {
    let pid = child.id();
    match wait_with_deadline(child, grace) {
        ExitWait::Exited(status) => {
            debug!(
                target: PROCESS_TARGET,
                pid,
                ?status,
                "language server exited"
            );
        }
        ExitWait::TimedOut => {
            warn!(
                target: PROCESS_TARGET,
                pid,
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "language server did not exit gracefully, killing"
            );
            kill(child);
        }
        ExitWait::Failed(error) => {
            warn!(
                target: PROCESS_TARGET,
                pid,
                error = %error,
                "failed to check process status, killing"
            );
            kill(child);
        }
    }
}

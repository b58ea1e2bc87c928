//! Shared fixtures and helpers for supervisor tests.

mod scripted;
mod world;

use std::time::Duration;

use crate::supervisor::{Supervisor, SupervisorOptions};
use crate::transport::TransportError;

pub use scripted::{Call, JournalHandle, LaunchPlan, ScriptedLauncher, Step};
pub use world::RetryWorld;

/// Timeout used when a test does not care about the window.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Options with the grace window disabled so timeouts pass through as-is.
#[must_use]
pub const fn options() -> SupervisorOptions {
    SupervisorOptions {
        first_request_grace: Duration::ZERO,
        request_timeout: REQUEST_TIMEOUT,
        retry_on_signature: true,
    }
}

/// Builds a started supervisor replaying `plans`.
pub fn started(
    plans: impl IntoIterator<Item = LaunchPlan>,
    options: SupervisorOptions,
) -> (Supervisor<ScriptedLauncher>, JournalHandle) {
    let launcher = ScriptedLauncher::new(plans);
    let journal = launcher.journal();
    let mut supervisor = Supervisor::new(launcher, options);
    if let Err(error) = supervisor.start() {
        panic!("scripted launch failed: {error}");
    }
    (supervisor, journal)
}

/// The error a dead process produces.
#[must_use]
pub const fn closed() -> TransportError {
    TransportError::Closed
}

/// The error an unanswered request produces.
#[must_use]
pub fn timed_out() -> TransportError {
    TransportError::timeout(REQUEST_TIMEOUT)
}

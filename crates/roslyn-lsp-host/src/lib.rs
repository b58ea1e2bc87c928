//! Supervisor for the Roslyn C# language server.
#![deny(missing_docs)]
//!
//! The crate acquires the server package for the host platform, launches
//! it over stdio, completes the LSP handshake, and forwards requests under
//! an adaptive timeout. A watchdog scans the server's stderr for the
//! BuildHost named-pipe timeout; when a request fails after that signature
//! appeared, the [`Supervisor`] restarts the server and retries the request
//! exactly once.
//!
//! The supervisor talks to servers through the [`SessionLauncher`] and
//! [`ServerSession`] traits so the restart protocol can be exercised without
//! spawning real processes.

mod acquire;
mod errors;
mod forwarder;
mod handshake;
mod launch;
mod platform;
mod process;
mod project;
mod session;
mod settings;
mod supervisor;
pub mod telemetry;
pub mod transport;
mod warmup;
mod watchdog;

pub use acquire::{
    BinaryAcquirer, FetchError, HttpFetcher, PackageDescriptor, PackageFetcher, ServerArtifact,
};
pub use errors::{AcquisitionStage, SupervisorError, SupervisorStep};
pub use forwarder::TimeoutWindow;
pub use handshake::{
    REQUIRED_CAPABILITIES, Workspace, initialize, initialize_params, missing_capabilities,
    roslyn_policies,
};
pub use launch::{DEFAULT_ENVIRONMENT, LaunchCommand, environment_with_defaults};
pub use platform::{PACKAGE_PREFIX, Platform};
pub use process::{STOP_GRACE, ServerProcess};
pub use project::{ProjectTarget, discover};
pub use session::{RoslynLauncher, RoslynSession, ServerSession, SessionLauncher};
pub use settings::{answer_configuration, section_value};
pub use supervisor::{
    DIAGNOSTIC_DRAIN, RetryBudget, RoslynSupervisor, Supervisor, SupervisorOptions, WatchdogPhase,
};
pub use warmup::{SkipReason, WarmupCoordinator, WarmupOutcome};
pub use watchdog::{FailureSignal, matches_failure_signature, observe_line, spawn_watchdog};

#[cfg(test)]
mod tests;

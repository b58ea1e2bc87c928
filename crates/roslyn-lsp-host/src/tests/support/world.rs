//! BDD world for the restart-and-retry protocol.

use serde_json::{Value, json};

use crate::errors::SupervisorError;
use crate::supervisor::{Supervisor, SupervisorOptions};

use super::scripted::{JournalHandle, LaunchPlan, ScriptedLauncher};

/// Shared state exercised by BDD step implementations.
#[derive(Debug)]
pub struct RetryWorld {
    /// Plans queued before the supervisor starts.
    pub plans: Vec<LaunchPlan>,
    /// Forwarding policy used once the supervisor starts.
    pub options: SupervisorOptions,
    supervisor: Option<Supervisor<ScriptedLauncher>>,
    journal: JournalHandle,
    /// Outcome of the last forwarded request.
    pub outcome: Option<Result<Value, SupervisorError>>,
}

impl RetryWorld {
    /// Creates a world with nothing scripted yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plans: Vec::new(),
            options: super::options(),
            supervisor: None,
            journal: JournalHandle::default(),
            outcome: None,
        }
    }

    /// Starts the supervisor on the queued plans and forwards one request.
    pub fn forward(&mut self, method: &str) {
        let supervisor = self.supervisor.get_or_insert_with(|| {
            let launcher = ScriptedLauncher::new(self.plans.drain(..));
            let journal = launcher.journal();
            self.journal = journal;
            Supervisor::new(launcher, self.options)
        });
        if let Err(error) = supervisor.start() {
            self.outcome = Some(Err(error));
            return;
        }
        self.outcome = Some(supervisor.forward(method, json!({}), None));
    }

    /// Launch attempts so far.
    #[must_use]
    pub fn launches(&self) -> u64 {
        self.journal.borrow().launches
    }

    /// Whether a server session is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.supervisor
            .as_ref()
            .is_some_and(Supervisor::is_running)
    }
}

impl Default for RetryWorld {
    fn default() -> Self {
        Self::new()
    }
}

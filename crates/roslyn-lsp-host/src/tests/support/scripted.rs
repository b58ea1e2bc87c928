//! Launcher and session doubles that replay scripted outcomes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use lsp_types::ServerCapabilities;
use serde_json::{Value, json};

use crate::errors::SupervisorError;
use crate::session::{ServerSession, SessionLauncher};
use crate::transport::TransportError;
use crate::watchdog::FailureSignal;

/// What a session does with one request.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answers with the given result.
    Answer(Value),
    /// Fails without emitting the signature.
    Fail(TransportError),
    /// Emits the signature, then fails.
    TripAndFail(TransportError),
    /// Fails; the signature only arrives once the caller settles.
    FailThenTrip(TransportError),
}

/// What one launch produces.
#[derive(Debug, Clone)]
pub enum LaunchPlan {
    /// A session replaying `steps`, echoing once they run out.
    Session(Vec<Step>),
    /// The launch fails.
    Refuse(SupervisorError),
}

/// A request observed by a scripted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Launch number of the session that received it.
    pub generation: u64,
    /// Request method.
    pub method: String,
    /// Timeout the supervisor applied.
    pub timeout: Duration,
}

/// Everything the doubles observed.
#[derive(Debug, Default)]
pub struct Journal {
    /// Launch attempts, successful or not.
    pub launches: u64,
    /// Requests in arrival order.
    pub calls: Vec<Call>,
    /// Notifications in arrival order.
    pub notifications: Vec<String>,
    /// Sessions stopped.
    pub stops: u64,
    /// Times a session was asked to settle.
    pub settles: u64,
}

/// Shared view of a [`Journal`].
pub type JournalHandle = Rc<RefCell<Journal>>;

/// Launches sessions from a queue of plans.
///
/// Once the queue is empty every launch yields a session that answers
/// everything.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    plans: VecDeque<LaunchPlan>,
    journal: JournalHandle,
}

impl ScriptedLauncher {
    /// Creates a launcher replaying `plans` in order.
    pub fn new(plans: impl IntoIterator<Item = LaunchPlan>) -> Self {
        Self {
            plans: plans.into_iter().collect(),
            journal: JournalHandle::default(),
        }
    }

    /// Handle on the shared journal.
    pub fn journal(&self) -> JournalHandle {
        Rc::clone(&self.journal)
    }

    /// Queues another plan.
    pub fn push(&mut self, plan: LaunchPlan) {
        self.plans.push_back(plan);
    }
}

impl SessionLauncher for ScriptedLauncher {
    type Session = ScriptedSession;

    fn launch(&mut self, signal: &FailureSignal) -> Result<ScriptedSession, SupervisorError> {
        let generation = {
            let mut journal = self.journal.borrow_mut();
            journal.launches += 1;
            journal.launches
        };
        match self.plans.pop_front() {
            Some(LaunchPlan::Refuse(error)) => Err(error),
            Some(LaunchPlan::Session(steps)) => Ok(ScriptedSession::new(
                generation,
                steps,
                signal.clone(),
                self.journal(),
            )),
            None => Ok(ScriptedSession::new(
                generation,
                Vec::new(),
                signal.clone(),
                self.journal(),
            )),
        }
    }
}

/// A session replaying its steps against the supervisor.
#[derive(Debug)]
pub struct ScriptedSession {
    generation: u64,
    steps: VecDeque<Step>,
    signal: FailureSignal,
    journal: JournalHandle,
    capabilities: ServerCapabilities,
    pending_trip: bool,
    stopped: bool,
}

impl ScriptedSession {
    fn new(
        generation: u64,
        steps: Vec<Step>,
        signal: FailureSignal,
        journal: JournalHandle,
    ) -> Self {
        Self {
            generation,
            steps: steps.into(),
            signal,
            journal,
            capabilities: ServerCapabilities::default(),
            pending_trip: false,
            stopped: false,
        }
    }
}

impl ServerSession for ScriptedSession {
    fn request(
        &mut self,
        method: &str,
        _params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        self.journal.borrow_mut().calls.push(Call {
            generation: self.generation,
            method: method.to_owned(),
            timeout,
        });
        if self.stopped {
            return Err(TransportError::Closed);
        }
        match self.steps.pop_front() {
            Some(Step::Answer(result)) => Ok(result),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::TripAndFail(error)) => {
                self.signal.trip();
                Err(error)
            }
            Some(Step::FailThenTrip(error)) => {
                self.pending_trip = true;
                Err(error)
            }
            None => Ok(json!({ "generation": self.generation, "method": method })),
        }
    }

    fn notify(&mut self, method: &str, _params: Value) -> Result<(), TransportError> {
        if self.stopped {
            return Err(TransportError::Closed);
        }
        self.journal
            .borrow_mut()
            .notifications
            .push(method.to_owned());
        Ok(())
    }

    fn settle(&mut self, _bound: Duration) {
        self.journal.borrow_mut().settles += 1;
        if self.pending_trip {
            self.pending_trip = false;
            self.signal.trip();
        }
    }

    fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.journal.borrow_mut().stops += 1;
        }
    }
}

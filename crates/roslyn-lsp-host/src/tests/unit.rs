//! Unit tests for the supervisor's forwarding and retry policy.

use std::time::Duration;

use rstest::rstest;
use serde_json::json;

use super::support::{
    Call, LaunchPlan, REQUEST_TIMEOUT, ScriptedLauncher, Step, closed, options, started,
    timed_out,
};
use crate::errors::{SupervisorError, SupervisorStep};
use crate::supervisor::{RetryBudget, Supervisor, SupervisorOptions, WatchdogPhase};
use crate::transport::TransportError;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[rstest]
fn start_launches_once_and_arms_the_watchdog() {
    let (mut supervisor, journal) = started([], options());

    supervisor.start().expect("second start is a no-op");

    assert!(supervisor.is_running());
    assert_eq!(supervisor.generation(), 1);
    assert_eq!(supervisor.phase(), WatchdogPhase::Armed);
    assert_eq!(supervisor.retry_budget(), RetryBudget::full());
    assert!(supervisor.capabilities().is_some());
    assert_eq!(journal.borrow().launches, 1);
}

#[rstest]
fn forwarding_before_start_reports_not_running() {
    let mut supervisor = Supervisor::new(ScriptedLauncher::default(), options());

    let error = supervisor
        .forward("textDocument/hover", json!({}), None)
        .expect_err("nothing running");

    assert!(matches!(error, SupervisorError::NotRunning));
    assert_eq!(error.step(), SupervisorStep::Forward);
}

#[rstest]
fn restart_replaces_the_session() {
    let (mut supervisor, journal) = started([], options());

    supervisor.restart().expect("restart");

    assert_eq!(supervisor.generation(), 2);
    assert_eq!(journal.borrow().launches, 2);
    assert_eq!(journal.borrow().stops, 1);
}

#[rstest]
fn stop_is_idempotent_and_closes_the_window() {
    let mut grace = options();
    grace.first_request_grace = Duration::from_secs(60);
    let (mut supervisor, journal) = started([], grace);
    assert!(supervisor.timeout_window().is_open());

    supervisor.stop();
    supervisor.stop();

    assert!(!supervisor.is_running());
    assert!(!supervisor.timeout_window().is_open());
    assert_eq!(journal.borrow().stops, 1);
    assert!(matches!(
        supervisor.forward("textDocument/hover", json!({}), None),
        Err(SupervisorError::NotRunning)
    ));
    assert!(matches!(
        supervisor.notify("textDocument/didOpen", json!({})),
        Err(SupervisorError::NotRunning)
    ));
}

#[rstest]
fn dropping_the_supervisor_stops_the_session() {
    let (supervisor, journal) = started([], options());

    drop(supervisor);

    assert_eq!(journal.borrow().stops, 1);
}

#[rstest]
fn notifications_reach_the_session() {
    let (mut supervisor, journal) = started([], options());

    supervisor
        .notify("textDocument/didOpen", json!({}))
        .expect("notify");

    assert_eq!(journal.borrow().notifications, vec!["textDocument/didOpen"]);
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[rstest]
fn default_timeout_applies_when_none_is_given() {
    let (mut supervisor, journal) = started([], options());

    supervisor
        .forward("textDocument/hover", json!({}), None)
        .expect("answered");

    let calls = journal.borrow().calls.clone();
    assert_eq!(
        calls,
        vec![Call {
            generation: 1,
            method: String::from("textDocument/hover"),
            timeout: REQUEST_TIMEOUT,
        }]
    );
}

#[rstest]
fn grace_window_extends_early_requests() {
    let grace = SupervisorOptions {
        first_request_grace: Duration::from_secs(60),
        ..options()
    };
    let (mut supervisor, journal) = started([], grace);

    supervisor
        .forward("textDocument/hover", json!({}), Some(Duration::from_secs(1)))
        .expect("answered");

    let timeout = journal.borrow().calls[0].timeout;
    assert!(timeout > Duration::from_secs(50), "got {timeout:?}");
    assert!(timeout <= Duration::from_secs(60), "got {timeout:?}");
}

#[rstest]
fn longer_requested_timeout_wins_over_the_window() {
    let grace = SupervisorOptions {
        first_request_grace: Duration::from_secs(5),
        ..options()
    };
    let (mut supervisor, journal) = started([], grace);

    supervisor
        .forward("textDocument/hover", json!({}), Some(Duration::from_secs(90)))
        .expect("answered");

    assert_eq!(journal.borrow().calls[0].timeout, Duration::from_secs(90));
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[rstest]
fn signature_correlated_failure_is_retried_on_a_fresh_server() {
    let (mut supervisor, journal) = started(
        [LaunchPlan::Session(vec![Step::TripAndFail(closed())])],
        options(),
    );

    let result = supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect("retry succeeds");

    assert_eq!(result["generation"], 2);
    assert_eq!(supervisor.generation(), 2);
    assert_eq!(supervisor.phase(), WatchdogPhase::Armed);
    assert_eq!(supervisor.retry_budget().remaining(), 1);
    let record = journal.borrow();
    assert_eq!(record.launches, 2);
    assert_eq!(record.stops, 1);
    let generations: Vec<u64> = record.calls.iter().map(|call| call.generation).collect();
    assert_eq!(generations, vec![1, 2]);
}

#[rstest]
#[case::closed(closed())]
#[case::timed_out(timed_out())]
#[case::rpc(TransportError::Rpc { code: -32603, message: String::from("internal") })]
fn failures_without_the_signature_are_returned_unchanged(#[case] failure: TransportError) {
    let (mut supervisor, journal) =
        started([LaunchPlan::Session(vec![Step::Fail(failure)])], options());

    let error = supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect_err("no retry");

    assert!(matches!(error, SupervisorError::Transport { .. }));
    assert_eq!(journal.borrow().launches, 1);
    assert_eq!(supervisor.retry_budget().remaining(), 1);
    assert_eq!(supervisor.phase(), WatchdogPhase::Armed);
}

#[rstest]
fn any_failure_kind_is_retried_once_the_signature_was_seen() {
    let rpc = TransportError::Rpc {
        code: -32603,
        message: String::from("BuildHost unavailable"),
    };
    let (mut supervisor, journal) =
        started([LaunchPlan::Session(vec![Step::TripAndFail(rpc)])], options());

    supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect("retry succeeds");

    assert_eq!(journal.borrow().launches, 2);
}

#[rstest]
fn dead_process_is_given_time_to_report_the_signature() {
    let (mut supervisor, journal) = started(
        [LaunchPlan::Session(vec![Step::FailThenTrip(closed())])],
        options(),
    );

    supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect("retry succeeds");

    assert_eq!(journal.borrow().settles, 1);
    assert_eq!(journal.borrow().launches, 2);
}

#[rstest]
fn timeouts_do_not_wait_for_late_diagnostics() {
    let (mut supervisor, journal) = started(
        [LaunchPlan::Session(vec![Step::FailThenTrip(timed_out())])],
        options(),
    );

    supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect_err("no retry");

    assert_eq!(journal.borrow().settles, 0);
    assert_eq!(journal.borrow().launches, 1);
}

#[rstest]
fn retried_request_is_not_retried_again() {
    let (mut supervisor, journal) = started(
        [
            LaunchPlan::Session(vec![Step::TripAndFail(closed())]),
            LaunchPlan::Session(vec![Step::TripAndFail(closed())]),
        ],
        options(),
    );

    let error = supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect_err("retry fails");

    assert!(matches!(
        error,
        SupervisorError::Transport {
            source: TransportError::Closed,
            ..
        }
    ));
    assert_eq!(journal.borrow().launches, 2);
    assert_eq!(journal.borrow().calls.len(), 2);
}

#[rstest]
fn each_trip_earns_its_own_retry() {
    let (mut supervisor, journal) = started(
        [
            LaunchPlan::Session(vec![Step::TripAndFail(closed())]),
            LaunchPlan::Session(vec![
                Step::Answer(json!("first")),
                Step::TripAndFail(closed()),
            ]),
        ],
        options(),
    );

    let first = supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect("first retry");
    let second = supervisor
        .forward("textDocument/references", json!({}), None)
        .expect("second retry");

    assert_eq!(first, json!("first"));
    assert_eq!(second["generation"], 3);
    assert_eq!(journal.borrow().launches, 3);
}

#[rstest]
fn retry_can_be_disabled() {
    let disabled = SupervisorOptions {
        retry_on_signature: false,
        ..options()
    };
    let (mut supervisor, journal) = started(
        [LaunchPlan::Session(vec![Step::TripAndFail(closed())])],
        disabled,
    );

    supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect_err("no retry");

    assert_eq!(journal.borrow().launches, 1);
    assert_eq!(supervisor.phase(), WatchdogPhase::Tripped);
}

#[rstest]
fn failed_restart_surfaces_the_launch_error() {
    let refusal = SupervisorError::Handshake {
        missing: vec!["definitionProvider"],
    };
    let (mut supervisor, journal) = started(
        [
            LaunchPlan::Session(vec![Step::TripAndFail(closed())]),
            LaunchPlan::Refuse(refusal),
        ],
        options(),
    );

    let error = supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect_err("restart fails");

    assert!(matches!(error, SupervisorError::Handshake { .. }));
    assert_eq!(error.step(), SupervisorStep::Handshake);
    assert!(!supervisor.is_running());
    assert_eq!(journal.borrow().launches, 2);
}

#[rstest]
fn consumed_trip_is_reported_until_the_next_spawn() {
    let mut launcher = ScriptedLauncher::new([LaunchPlan::Session(vec![Step::TripAndFail(
        closed(),
    )])]);
    launcher.push(LaunchPlan::Refuse(SupervisorError::NotRunning));
    let journal = launcher.journal();
    let mut supervisor = Supervisor::new(launcher, options());
    supervisor.start().expect("start");

    supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect_err("restart refused");

    assert_eq!(supervisor.phase(), WatchdogPhase::Consumed);
    assert_eq!(supervisor.retry_budget().remaining(), 0);
    assert_eq!(journal.borrow().launches, 2);

    supervisor.start().expect("fresh launch");
    assert_eq!(supervisor.phase(), WatchdogPhase::Armed);
    assert_eq!(supervisor.retry_budget(), RetryBudget::full());
}

//! End-to-end tests driving the supervisor against the stub server binary.

use std::fs;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use roslyn_lsp_host::transport::TransportError;
use roslyn_lsp_host::{
    LaunchCommand, ProjectTarget, RoslynLauncher, Supervisor, SupervisorError, SupervisorOptions,
    WarmupCoordinator, Workspace,
};
use serde_json::{Value, json};
use tempfile::TempDir;

const STUB: &str = env!("CARGO_BIN_EXE_roslyn-lsp-stub");
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

struct Project {
    dir: TempDir,
}

impl Project {
    fn workspace(&self) -> Workspace {
        Workspace::discover(self.dir.path())
    }

    fn supervisor(&self, command: LaunchCommand) -> Supervisor<RoslynLauncher> {
        let launcher = RoslynLauncher::new(command, self.workspace(), WarmupCoordinator::disabled())
            .with_timeouts(REQUEST_TIMEOUT, Duration::ZERO);
        Supervisor::new(
            launcher,
            SupervisorOptions {
                first_request_grace: Duration::ZERO,
                request_timeout: REQUEST_TIMEOUT,
                retry_on_signature: true,
            },
        )
    }

    fn state_dir(&self) -> String {
        self.dir.path().join("stub-state").display().to_string()
    }
}

#[fixture]
fn project() -> Project {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("App.sln"), "").expect("write solution");
    Project { dir }
}

fn stub() -> LaunchCommand {
    LaunchCommand::new(STUB)
}

fn launch_number(result: &Value) -> u64 {
    result["launch"].as_u64().expect("launch number")
}

#[rstest]
fn handshake_announces_the_discovered_solution(project: Project) {
    let mut supervisor = project.supervisor(stub());
    supervisor.start().expect("start");

    let notifications = supervisor
        .forward("stub/notifications", json!({}), None)
        .expect("notifications");

    assert_eq!(notifications, json!(["initialized", "solution/open"]));
    assert!(supervisor.capabilities().is_some());
    supervisor.shutdown();
}

#[rstest]
fn configuration_requests_are_answered_from_the_settings_table(project: Project) {
    let mut supervisor = project.supervisor(stub());
    supervisor.start().expect("start");

    let mut answer = Value::Null;
    for _ in 0..50 {
        answer = supervisor
            .forward("stub/configuration", json!({}), None)
            .expect("configuration");
        if !answer.is_null() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }

    let solution = answer[0].as_str().expect("solution path");
    assert!(solution.ends_with("App.sln"), "got {solution}");
    assert_eq!(answer[1], 4);
}

#[rstest]
fn requests_are_forwarded_to_the_server(project: Project) {
    let mut supervisor = project.supervisor(stub());
    supervisor.start().expect("start");

    let result = supervisor
        .forward("textDocument/hover", json!({ "position": 3 }), None)
        .expect("hover");

    assert_eq!(result["method"], "textDocument/hover");
    assert_eq!(result["params"]["position"], 3);
    assert_eq!(launch_number(&result), 1);
}

#[rstest]
fn pipe_timeout_restarts_the_server_and_retries(project: Project) {
    let command = stub()
        .env("ROSLYN_STUB_TRIP_ON", "textDocument/definition")
        .env("ROSLYN_STUB_STATE_DIR", project.state_dir());
    let mut supervisor = project.supervisor(command);
    supervisor.start().expect("start");

    let result = supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect("retried definition");

    assert_eq!(launch_number(&result), 2);
    assert_eq!(supervisor.generation(), 2);
    assert!(supervisor.is_running());
}

#[rstest]
fn crash_without_the_signature_is_not_retried(project: Project) {
    let command = stub()
        .env("ROSLYN_STUB_FAIL_ON", "textDocument/definition")
        .env("ROSLYN_STUB_STATE_DIR", project.state_dir());
    let mut supervisor = project.supervisor(command);
    supervisor.start().expect("start");

    let error = supervisor
        .forward("textDocument/definition", json!({}), None)
        .expect_err("crash surfaces");

    assert!(
        matches!(error, SupervisorError::Transport { .. }),
        "got {error:?}"
    );
    assert_eq!(supervisor.generation(), 1);
}

#[rstest]
fn unanswered_request_times_out_without_restart(project: Project) {
    let command = stub().env("ROSLYN_STUB_STALL_ON", "textDocument/references");
    let mut supervisor = project.supervisor(command);
    supervisor.start().expect("start");

    let error = supervisor
        .forward(
            "textDocument/references",
            json!({}),
            Some(Duration::from_millis(300)),
        )
        .expect_err("stalled");

    assert!(
        matches!(
            error,
            SupervisorError::Transport {
                source: TransportError::Timeout { .. },
                ..
            }
        ),
        "got {error:?}"
    );
    assert_eq!(supervisor.generation(), 1);
    let later = supervisor
        .forward("textDocument/hover", json!({}), None)
        .expect("server still serves");
    assert_eq!(launch_number(&later), 1);
}

#[rstest]
fn missing_capabilities_fail_the_handshake(project: Project) {
    let command = stub().env("ROSLYN_STUB_OMIT", "referencesProvider,documentSymbolProvider");
    let mut supervisor = project.supervisor(command);

    let error = supervisor.start().expect_err("gate rejects the server");

    match error {
        SupervisorError::Handshake { missing } => {
            assert_eq!(missing, vec!["referencesProvider", "documentSymbolProvider"]);
        }
        other => panic!("expected handshake error, got {other:?}"),
    }
    assert!(!supervisor.is_running());
}

#[rstest]
fn explicit_project_target_uses_project_open(project: Project) {
    let csproj = project.dir.path().join("App.csproj");
    fs::write(&csproj, "<Project />").expect("write project");
    let workspace = Workspace::new(project.dir.path(), Some(ProjectTarget::Project(csproj)));
    let launcher = RoslynLauncher::new(stub(), workspace, WarmupCoordinator::disabled())
        .with_timeouts(REQUEST_TIMEOUT, Duration::ZERO);
    let mut supervisor = Supervisor::new(launcher, SupervisorOptions::default());
    supervisor.start().expect("start");

    let notifications = supervisor
        .forward("stub/notifications", json!({}), None)
        .expect("notifications");

    assert_eq!(notifications, json!(["initialized", "project/open"]));
}

#[rstest]
fn stopped_supervisor_rejects_requests(project: Project) {
    let mut supervisor = project.supervisor(stub());
    supervisor.start().expect("start");

    supervisor.stop();
    supervisor.stop();

    assert!(matches!(
        supervisor.forward("textDocument/hover", json!({}), None),
        Err(SupervisorError::NotRunning)
    ));
}

#[cfg(unix)]
#[rstest]
fn overrunning_warmup_does_not_block_startup(project: Project) {
    use std::os::unix::fs::PermissionsExt;

    use roslyn_lsp_host::WarmupOutcome;

    let dotnet = project.dir.path().join("dotnet");
    fs::write(&dotnet, "#!/bin/sh\nif [ \"$1\" = msbuild ]; then exec sleep 30; fi\n")
        .expect("write toolchain");
    fs::set_permissions(&dotnet, fs::Permissions::from_mode(0o755)).expect("chmod");
    let warmup = WarmupCoordinator::new(Some(dotnet), Duration::from_millis(300));
    let launcher = RoslynLauncher::new(stub(), project.workspace(), warmup)
        .with_timeouts(REQUEST_TIMEOUT, Duration::ZERO);
    let mut supervisor = Supervisor::new(launcher, SupervisorOptions::default());

    supervisor.start().expect("startup survives the warm-up timeout");

    assert_eq!(
        supervisor.launcher().last_warmup(),
        Some(WarmupOutcome::TimedOut)
    );
    assert!(supervisor.is_running());
}

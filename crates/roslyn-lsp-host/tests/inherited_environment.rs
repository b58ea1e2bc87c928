//! Checks that the server inherits variables exported by the caller instead
//! of receiving the built-in defaults.
//!
//! Kept in its own test binary because it mutates the process environment.

use std::ffi::{OsStr, OsString};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use roslyn_lsp_host::transport::ResponsePolicies;
use roslyn_lsp_host::{FailureSignal, LaunchCommand, ServerProcess, environment_with_defaults};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe on edition 2024; the mutex serialises it.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

#[test]
fn exported_roll_forward_is_not_overridden() {
    let _override = EnvOverride::set_var("DOTNET_ROLL_FORWARD", OsStr::new("Disable"));

    let merged = environment_with_defaults(&[]);
    assert!(
        merged.iter().all(|(key, _)| key != "DOTNET_ROLL_FORWARD"),
        "got {merged:?}"
    );

    let command = LaunchCommand::new("sh").arg("-c").arg(
        r#"[ "$DOTNET_ROLL_FORWARD" = Disable ] && echo "connect to BuildHost pipe timed out" >&2"#,
    );
    let signal = FailureSignal::new();
    let mut process =
        ServerProcess::spawn(&command, Arc::new(ResponsePolicies::new()), signal.clone())
            .expect("spawn");

    assert!(process.await_diagnostics(Duration::from_secs(5)));
    assert!(signal.is_tripped(), "child did not see the exported value");
    process.stop();
}

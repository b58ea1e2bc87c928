//! Scriptable stand-in for the Roslyn language server.
//!
//! Speaks just enough LSP over stdio for end-to-end tests of the supervisor.
//! Behaviour is driven by environment variables:
//!
//! - `ROSLYN_STUB_OMIT`: comma-separated capabilities left out of the
//!   `initialize` result.
//! - `ROSLYN_STUB_TRIP_ON`: request method on which the stub writes the
//!   BuildHost pipe timeout to stderr and exits without answering.
//! - `ROSLYN_STUB_FAIL_ON`: request method on which the stub exits without
//!   answering and without the signature.
//! - `ROSLYN_STUB_STALL_ON`: request method the stub never answers.
//! - `ROSLYN_STUB_STATE_DIR`: directory holding a launch counter; when set,
//!   trips and failures only happen on the first launch.
//!
//! Every other request is answered with an echo of its method, parameters,
//! and the launch number.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use roslyn_lsp_host::transport::{
    ClientReply, JsonRpcMessage, JsonRpcRequest, MessageReader, MessageWriter,
};
use serde::Serialize;
use serde_json::{Value, json};

const SIGNATURE: &str = "fail: Failed to connect to BuildHost named pipe: \
     System.TimeoutException: The operation has timed out.";

/// Identifier of the configuration request the stub sends after
/// `initialized`.
const CONFIGURATION_REQUEST_ID: i64 = 900;

struct Script {
    omit: Vec<String>,
    trip_on: Option<String>,
    fail_on: Option<String>,
    stall_on: Option<String>,
    launch: u64,
}

impl Script {
    fn from_env() -> io::Result<Self> {
        let method = |key: &str| env::var(key).ok().filter(|value| !value.is_empty());
        let launch = match env::var_os("ROSLYN_STUB_STATE_DIR") {
            Some(dir) => record_launch(Path::new(&dir))?,
            None => 1,
        };
        Ok(Self {
            omit: env::var("ROSLYN_STUB_OMIT")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect(),
            trip_on: method("ROSLYN_STUB_TRIP_ON"),
            fail_on: method("ROSLYN_STUB_FAIL_ON"),
            stall_on: method("ROSLYN_STUB_STALL_ON"),
            launch,
        })
    }

    fn matches(&self, scripted: Option<&String>, method: &str) -> bool {
        self.launch == 1 && scripted.is_some_and(|name| name == method)
    }
}

/// Bumps the launch counter in `dir`, returning this launch's number.
fn record_launch(dir: &Path) -> io::Result<u64> {
    fs::create_dir_all(dir)?;
    let counter: PathBuf = dir.join("launches");
    let previous = fs::read_to_string(&counter)
        .ok()
        .and_then(|text| text.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let launch = previous + 1;
    fs::write(&counter, launch.to_string())?;
    Ok(launch)
}

struct Stub {
    script: Script,
    writer: MessageWriter<io::Stdout>,
    notifications: Vec<String>,
    configuration: Value,
}

impl Stub {
    fn send<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let bytes = serde_json::to_vec(message)?;
        self.writer.send(&bytes).map_err(io::Error::other)
    }

    fn reply(&mut self, id: Value, result: Value) -> io::Result<()> {
        self.send(&ClientReply::result(id, result))
    }

    fn capabilities(&self) -> Value {
        let mut capabilities = json!({
            "textDocumentSync": 1,
            "definitionProvider": true,
            "referencesProvider": true,
            "documentSymbolProvider": true,
            "hoverProvider": true,
        });
        if let Some(map) = capabilities.as_object_mut() {
            for name in &self.script.omit {
                map.remove(name);
            }
        }
        capabilities
    }

    /// Handles one client request; `Ok(false)` ends the session.
    fn on_request(&mut self, id: Value, method: &str, params: Value) -> io::Result<bool> {
        if self.script.matches(self.script.trip_on.as_ref(), method) {
            let mut stderr = io::stderr();
            writeln!(stderr, "{SIGNATURE}")?;
            stderr.flush()?;
            thread::sleep(Duration::from_millis(200));
            return Ok(false);
        }
        if self.script.matches(self.script.fail_on.as_ref(), method) {
            writeln!(io::stderr(), "fail: unhandled exception in {method}")?;
            return Ok(false);
        }
        if self.script.stall_on.as_deref() == Some(method) {
            return Ok(true);
        }

        let result = match method {
            "initialize" => json!({
                "capabilities": self.capabilities(),
                "serverInfo": { "name": "roslyn-lsp-stub" },
            }),
            "shutdown" => Value::Null,
            "stub/notifications" => json!(self.notifications),
            "stub/configuration" => self.configuration.clone(),
            _ => json!({
                "method": method,
                "params": params,
                "launch": self.script.launch,
            }),
        };
        self.reply(id, result)?;
        Ok(true)
    }

    fn on_notification(&mut self, method: &str) -> io::Result<()> {
        self.notifications.push(method.to_owned());
        if method == "initialized" {
            let request = JsonRpcRequest::with_id(
                CONFIGURATION_REQUEST_ID,
                "workspace/configuration",
                Some(json!({
                    "items": [
                        { "section": "csharp.solution" },
                        { "section": "tab_width" },
                    ]
                })),
            );
            self.send(&request)?;
        }
        Ok(())
    }
}

fn serve() -> io::Result<()> {
    let mut stub = Stub {
        script: Script::from_env()?,
        writer: MessageWriter::new(io::stdout()),
        notifications: Vec::new(),
        configuration: Value::Null,
    };
    let mut reader = MessageReader::new(io::stdin());

    while let Some(payload) = reader.receive().map_err(io::Error::other)? {
        match JsonRpcMessage::from_bytes(&payload)? {
            JsonRpcMessage::ServerRequest(request) => {
                if !stub.on_request(request.id, &request.method, request.params)? {
                    return Ok(());
                }
            }
            JsonRpcMessage::Notification(notification) => {
                if notification.method == "exit" {
                    return Ok(());
                }
                stub.on_notification(&notification.method)?;
            }
            JsonRpcMessage::Response(response) => {
                if response.id == Some(CONFIGURATION_REQUEST_ID) {
                    stub.configuration = response.result.unwrap_or(Value::Null);
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ignored = writeln!(io::stderr(), "roslyn-lsp-stub: {error}");
            ExitCode::FAILURE
        }
    }
}

//! LSP initialisation handshake with the Roslyn server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lsp_types::{InitializeResult, ServerCapabilities};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::SupervisorError;
use crate::project::{self, ProjectTarget};
use crate::settings;
use crate::transport::{ResponsePolicies, RpcChannel};

/// Log target for the handshake.
const HANDSHAKE_TARGET: &str = "roslyn_lsp_host::handshake";

/// Log target for messages relayed from the server.
const SERVER_TARGET: &str = "roslyn_lsp_host::server";

/// Capabilities the supervisor's callers rely on.
pub const REQUIRED_CAPABILITIES: [&str; 4] = [
    "textDocumentSync",
    "definitionProvider",
    "referencesProvider",
    "documentSymbolProvider",
];

/// Number of LSP symbol kinds, `File` (1) through `TypeParameter` (26).
const SYMBOL_KIND_COUNT: u8 = 26;

/// Root directory and build target of the code base being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    target: Option<ProjectTarget>,
}

impl Workspace {
    /// Describes `root`, discovering its solution or project.
    #[must_use]
    pub fn discover(root: &Path) -> Self {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let target = project::discover(&root);
        match &target {
            Some(found) => info!(
                target: HANDSHAKE_TARGET,
                path = %found.path().display(),
                "discovered build target"
            ),
            None => info!(
                target: HANDSHAKE_TARGET,
                root = %root.display(),
                "no solution or project found, the server will open loose files only"
            ),
        }
        Self { root, target }
    }

    /// Describes `root` with an explicit target.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, target: Option<ProjectTarget>) -> Self {
        Self {
            root: root.into(),
            target,
        }
    }

    /// Workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Solution or project loaded by the server.
    #[must_use]
    pub const fn target(&self) -> Option<&ProjectTarget> {
        self.target.as_ref()
    }
}

/// Builds the answers for server-initiated traffic.
///
/// Requests without an entry here are answered with `MethodNotFound` by the
/// transport.
#[must_use]
pub fn roslyn_policies(workspace: &Workspace) -> ResponsePolicies {
    let solution = workspace
        .target()
        .map(|target| target.path().to_path_buf());
    let mut policies = ResponsePolicies::new();
    policies
        .on_request("workspace/configuration", move |params| {
            settings::answer_configuration(params, solution.as_deref())
        })
        .on_request("window/workDoneProgress/create", |_| Value::Null)
        .on_request("client/registerCapability", |_| Value::Null)
        .on_request("client/unregisterCapability", |_| Value::Null)
        .on_request("workspace/_roslyn_projectNeedsRestore", |_| Value::Null)
        .on_notification("window/logMessage", log_server_message)
        .on_notification("$/progress", log_progress)
        .on_notification("textDocument/publishDiagnostics", |_| {});
    policies
}

/// Re-emits `window/logMessage` at the matching level.
fn log_server_message(params: &Value) {
    let message = params.get("message").and_then(Value::as_str).unwrap_or("");
    match params.get("type").and_then(Value::as_u64) {
        Some(1) => error!(target: SERVER_TARGET, "{message}"),
        Some(2) => warn!(target: SERVER_TARGET, "{message}"),
        Some(3) => info!(target: SERVER_TARGET, "{message}"),
        _ => debug!(target: SERVER_TARGET, "{message}"),
    }
}

/// Logs `$/progress` begin, report, and end events.
fn log_progress(params: &Value) {
    let token = params.get("token").map(ToString::to_string).unwrap_or_default();
    let value = params.get("value").unwrap_or(&Value::Null);
    let text = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or("");
    let percentage = value.get("percentage").and_then(Value::as_u64);
    match value.get("kind").and_then(Value::as_str) {
        Some("begin") => info!(
            target: SERVER_TARGET,
            token = %token,
            title = text("title"),
            message = text("message"),
            percentage,
            "progress started"
        ),
        Some("report") => debug!(
            target: SERVER_TARGET,
            token = %token,
            message = text("message"),
            percentage,
            "progress"
        ),
        Some("end") => info!(
            target: SERVER_TARGET,
            token = %token,
            message = text("message"),
            "progress finished"
        ),
        _ => debug!(target: SERVER_TARGET, token = %token, "unrecognised progress notification"),
    }
}

fn file_uri(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

/// Builds the `initialize` request parameters.
#[must_use]
pub fn initialize_params(workspace: &Workspace) -> Value {
    let root = workspace.root();
    let root_uri = file_uri(root);
    if root_uri.is_none() {
        warn!(
            target: HANDSHAKE_TARGET,
            root = %root.display(),
            "workspace root cannot be expressed as a file URI"
        );
    }
    let name = root
        .file_name()
        .map_or_else(|| root.display().to_string(), |name| name.to_string_lossy().into_owned());
    let symbol_kinds: Vec<u8> = (1..=SYMBOL_KIND_COUNT).collect();

    let mut params = json!({
        "processId": std::process::id(),
        "rootPath": root.display().to_string(),
        "rootUri": root_uri,
        "workspaceFolders": [{"uri": root_uri, "name": name}],
        "capabilities": {
            "window": {
                "workDoneProgress": true,
                "showMessage": {"messageActionItem": {"additionalPropertiesSupport": true}},
                "showDocument": {"support": true},
            },
            "workspace": {
                "applyEdit": true,
                "workspaceEdit": {"documentChanges": true},
                "didChangeConfiguration": {"dynamicRegistration": true},
                "didChangeWatchedFiles": {"dynamicRegistration": true},
                "symbol": {
                    "dynamicRegistration": true,
                    "symbolKind": {"valueSet": symbol_kinds},
                },
                "executeCommand": {"dynamicRegistration": true},
                "configuration": true,
                "workspaceFolders": true,
                "workDoneProgress": true,
            },
            "textDocument": {
                "synchronization": {
                    "dynamicRegistration": true,
                    "willSave": true,
                    "willSaveWaitUntil": true,
                    "didSave": true,
                },
                "hover": {"dynamicRegistration": true, "contentFormat": ["markdown", "plaintext"]},
                "signatureHelp": {
                    "dynamicRegistration": true,
                    "signatureInformation": {
                        "documentationFormat": ["markdown", "plaintext"],
                        "parameterInformation": {"labelOffsetSupport": true},
                    },
                },
                "definition": {"dynamicRegistration": true},
                "references": {"dynamicRegistration": true},
                "documentSymbol": {
                    "dynamicRegistration": true,
                    "symbolKind": {"valueSet": symbol_kinds},
                    "hierarchicalDocumentSymbolSupport": true,
                },
            },
        },
    });
    if let Some(target) = workspace.target() {
        params["initializationOptions"] = json!({
            "csharp": {
                "solution": target.path().display().to_string(),
                "applyFormattingOptions": true,
            }
        });
    }
    params
}

/// Names the required capabilities absent from an `initialize` result.
#[must_use]
pub fn missing_capabilities(result: &Value) -> Vec<&'static str> {
    let capabilities = result.get("capabilities");
    REQUIRED_CAPABILITIES
        .into_iter()
        .filter(|name| {
            capabilities
                .and_then(|caps| caps.get(*name))
                .is_none_or(Value::is_null)
        })
        .collect()
}

/// Parameters announcing the build target after `initialized`.
fn open_params(target: &ProjectTarget) -> Value {
    let uri = file_uri(target.path())
        .unwrap_or_else(|| target.path().display().to_string());
    match target {
        ProjectTarget::Solution(_) => json!({"solution": uri}),
        ProjectTarget::Project(_) => json!({"projects": [uri]}),
    }
}

/// Runs `initialize`, the capability gate, `initialized`, and the target
/// announcement, in that order.
///
/// # Errors
///
/// Returns [`SupervisorError::HandshakeTransport`] when an exchange fails
/// and [`SupervisorError::Handshake`] when a required capability is absent.
pub fn initialize<C: RpcChannel + ?Sized>(
    channel: &C,
    workspace: &Workspace,
    timeout: Duration,
) -> Result<ServerCapabilities, SupervisorError> {
    debug!(
        target: HANDSHAKE_TARGET,
        root = %workspace.root().display(),
        "sending initialize request"
    );
    let result = channel
        .request("initialize", initialize_params(workspace), timeout)
        .map_err(|source| SupervisorError::HandshakeTransport { source })?;

    let missing = missing_capabilities(&result);
    if !missing.is_empty() {
        error!(
            target: HANDSHAKE_TARGET,
            missing = ?missing,
            "language server lacks required capabilities"
        );
        return Err(SupervisorError::Handshake { missing });
    }
    let negotiated: InitializeResult = serde_json::from_value(result).map_err(|error| {
        SupervisorError::HandshakeTransport {
            source: error.into(),
        }
    })?;

    channel
        .notify("initialized", json!({}))
        .map_err(|source| SupervisorError::HandshakeTransport { source })?;

    if let Some(target) = workspace.target() {
        info!(
            target: HANDSHAKE_TARGET,
            method = target.open_method(),
            path = %target.path().display(),
            "opening build target"
        );
        channel
            .notify(target.open_method(), open_params(target))
            .map_err(|source| SupervisorError::HandshakeTransport { source })?;
    }

    info!(target: HANDSHAKE_TARGET, "language server initialised");
    Ok(negotiated.capabilities)
}

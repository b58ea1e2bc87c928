//! Construction of the server command line.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use roslyn_lsp_config::ServerLogLevel;
use tracing::warn;

use crate::acquire::ServerArtifact;
use crate::errors::SupervisorError;

/// Log target for launch preparation.
const LAUNCH_TARGET: &str = "roslyn_lsp_host::launch";

/// Environment applied to the server unless the caller sets the key, either
/// on the command or in the inherited process environment.
pub const DEFAULT_ENVIRONMENT: [(&str, &str); 3] = [
    ("DOTNET_ROLL_FORWARD", "LatestMajor"),
    ("DOTNET_CLI_TELEMETRY_OPTOUT", "1"),
    ("MSBUILDDISABLENODEREUSE", "1"),
];

const DOTNET: &str = "dotnet";
const DOTNET_HINT: &str = "install the .NET runtime (https://dotnet.microsoft.com/download) and ensure `dotnet` is on PATH";

/// Fully resolved command used to start the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: PathBuf,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl LaunchCommand {
    /// Creates a command running `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Builds the server command for an installed artifact.
    ///
    /// Native executables run directly; assemblies run through `dotnet`.
    /// The server runs in `workspace_root`. The extension log directory
    /// `<log_dir>` is created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::MissingRuntime`] when the artifact is an
    /// assembly and no `dotnet` executable is on `PATH`.
    pub fn for_server(
        artifact: &ServerArtifact,
        log_level: ServerLogLevel,
        log_dir: &Path,
        workspace_root: &Path,
    ) -> Result<Self, SupervisorError> {
        let mut command = match artifact {
            ServerArtifact::Native(path) => Self::new(path),
            ServerArtifact::Dll(path) => {
                let dotnet = locate_dotnet().ok_or(SupervisorError::MissingRuntime {
                    runtime: DOTNET,
                    hint: DOTNET_HINT,
                })?;
                Self::new(dotnet).arg(path)
            }
        };

        if let Err(error) = fs::create_dir_all(log_dir) {
            warn!(
                target: LAUNCH_TARGET,
                path = %log_dir.display(),
                error = %error,
                "failed to create server log directory"
            );
        }

        let mut log_dir_arg = OsString::from("--extensionLogDirectory=");
        log_dir_arg.push(log_dir);
        command = command
            .arg(format!("--logLevel={}", log_level.as_arg()))
            .arg(log_dir_arg)
            .arg("--stdio")
            .current_dir(workspace_root);
        Ok(command)
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory of the process.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets an environment variable, overriding any default.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env.retain(|(existing, _)| existing != &key);
        self.env.push((key, value.into()));
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Working directory, when set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Caller-supplied variables merged with [`DEFAULT_ENVIRONMENT`].
    #[must_use]
    pub fn environment(&self) -> Vec<(String, String)> {
        environment_with_defaults(&self.env)
    }
}

/// Adds every default whose key neither `supplied` nor the current process
/// environment sets.
#[must_use]
pub fn environment_with_defaults(supplied: &[(String, String)]) -> Vec<(String, String)> {
    merge_defaults(supplied, &|key| env::var_os(key).is_some())
}

fn merge_defaults(
    supplied: &[(String, String)],
    inherited: &dyn Fn(&str) -> bool,
) -> Vec<(String, String)> {
    let mut merged = supplied.to_vec();
    for (key, value) in DEFAULT_ENVIRONMENT {
        let explicit = supplied.iter().any(|(existing, _)| existing == key);
        if !explicit && !inherited(key) {
            merged.push((key.to_owned(), value.to_owned()));
        }
    }
    merged
}

/// Resolves the `dotnet` host executable on `PATH`.
pub(crate) fn locate_dotnet() -> Option<PathBuf> {
    which::which(DOTNET).ok()
}

//! Error types surfaced by the supervisor.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::transport::TransportError;

/// Step of the startup or steady-state sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorStep {
    /// Resolving, downloading, or extracting the server package.
    Acquire,
    /// Building the launch command and spawning the process.
    Launch,
    /// The `initialize` handshake.
    Handshake,
    /// Forwarding a client request.
    Forward,
}

impl fmt::Display for SupervisorStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Acquire => "acquisition",
            Self::Launch => "launch",
            Self::Handshake => "handshake",
            Self::Forward => "request forwarding",
        };
        formatter.write_str(label)
    }
}

/// Stage of package acquisition that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStage {
    /// Preparing cache directories.
    Cache,
    /// Fetching the archive.
    Download,
    /// Unpacking the archive.
    Extract,
    /// Locating the server binary in the extracted tree.
    Locate,
}

impl fmt::Display for AcquisitionStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cache => "cache preparation",
            Self::Download => "download",
            Self::Extract => "extraction",
            Self::Locate => "binary lookup",
        };
        formatter.write_str(label)
    }
}

/// Errors returned by the supervisor and its components.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// No server package is published for the host platform.
    #[error("no language server package is available for platform '{platform}'")]
    UnsupportedPlatform {
        /// Platform key derived from the host OS and architecture.
        platform: String,
    },

    /// A host runtime required to run the server is absent.
    #[error("required runtime '{runtime}' was not found: {hint}")]
    MissingRuntime {
        /// Name of the missing runtime executable.
        runtime: &'static str,
        /// How to install it.
        hint: &'static str,
    },

    /// The server package could not be acquired.
    #[error("language server {stage} failed: {message}")]
    Acquisition {
        /// Acquisition stage that failed.
        stage: AcquisitionStage,
        /// Description of the failure.
        message: String,
        /// Underlying cause, when one exists.
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// The server process could not be started.
    #[error("failed to spawn language server '{command}': {source}")]
    Spawn {
        /// Program that failed to start.
        command: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The server does not advertise a capability the supervisor relies on.
    #[error(
        "language server is missing required capabilities: {}; the installed server build is incompatible",
        missing.join(", ")
    )]
    Handshake {
        /// Capabilities absent from the `initialize` response.
        missing: Vec<&'static str>,
    },

    /// The handshake exchange itself failed.
    #[error("language server initialisation failed: {source}")]
    HandshakeTransport {
        /// Transport failure during the handshake.
        #[source]
        source: TransportError,
    },

    /// A forwarded request failed after the retry policy was applied.
    #[error("request '{method}' failed: {source}")]
    Transport {
        /// Method of the failed request.
        method: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// A request was forwarded while no server process is running.
    #[error("language server is not running")]
    NotRunning,
}

impl SupervisorError {
    /// Returns the step whose failure this error describes.
    #[must_use]
    pub const fn step(&self) -> SupervisorStep {
        match self {
            Self::UnsupportedPlatform { .. } | Self::Acquisition { .. } => SupervisorStep::Acquire,
            Self::MissingRuntime { .. } | Self::Spawn { .. } => SupervisorStep::Launch,
            Self::Handshake { .. } | Self::HandshakeTransport { .. } => SupervisorStep::Handshake,
            Self::Transport { .. } | Self::NotRunning => SupervisorStep::Forward,
        }
    }

    /// Whether the error ends startup rather than a single request.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Transport { .. } | Self::NotRunning)
    }

    /// Builds an acquisition error without an underlying cause.
    pub(crate) fn acquisition(stage: AcquisitionStage, message: impl Into<String>) -> Self {
        Self::Acquisition {
            stage,
            message: message.into(),
            source: None,
        }
    }

    /// Builds an acquisition error wrapping its cause.
    pub(crate) fn acquisition_caused_by<E>(
        stage: AcquisitionStage,
        message: impl Into<String>,
        source: E,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Acquisition {
            stage,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Wraps a steady-state transport failure.
    pub(crate) fn transport(method: &str, source: TransportError) -> Self {
        Self::Transport {
            method: method.to_owned(),
            source,
        }
    }
}

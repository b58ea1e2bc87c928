use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    Json,
    /// Human-readable single line output.
    #[default]
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Verbosity passed to the language server through `--logLevel`.
///
/// The names follow the `Microsoft.Extensions.Logging` levels the server
/// understands, so [`ServerLogLevel::as_arg`] can be handed over verbatim.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[strum(ascii_case_insensitive)]
pub enum ServerLogLevel {
    /// Every message, including protocol traces.
    Trace,
    /// Debugging detail.
    Debug,
    /// Normal operational messages.
    #[default]
    Information,
    /// Recoverable problems.
    Warning,
    /// Failures of a single operation.
    Error,
    /// Failures of the whole server.
    Critical,
    /// Disables server logging.
    None,
}

impl ServerLogLevel {
    /// Returns the value expected by the server's `--logLevel` switch.
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Information => "Information",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
            Self::None => "None",
        }
    }
}

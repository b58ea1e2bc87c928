//! Transport-layer errors.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use super::jsonrpc::JsonRpcError;

/// Failures raised while exchanging messages with the server process.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// Missing Content-Length header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// Invalid header format.
    #[error("invalid header format")]
    InvalidHeader,

    /// JSON serialisation or deserialisation failed.
    #[error("JSON codec error: {0}")]
    Codec(Arc<serde_json::Error>),

    /// No response arrived within the effective timeout.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// Effective timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The server closed its output stream before answering.
    #[error("connection to the language server closed")]
    Closed,

    /// The server answered with a JSON-RPC error object.
    #[error("server returned error: {message} (code: {code})")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
    },
}

impl TransportError {
    /// Builds a timeout error from the elapsed duration.
    #[must_use]
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Converts a JSON-RPC error object into a transport error.
    #[must_use]
    pub fn from_jsonrpc(error: JsonRpcError) -> Self {
        Self::Rpc {
            code: error.code,
            message: error.message,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(Arc::new(error))
    }
}

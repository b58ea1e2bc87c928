//! JSON-RPC transport to the language server process.
//!
//! The transport is deliberately thin: it frames messages, correlates
//! responses with requests, enforces per-request timeouts, and answers
//! server-initiated requests from a [`ResponsePolicies`] table. It knows
//! nothing about restarts or the failure watchdog; those live in the
//! supervisor.
//!
//! - [`MessageReader`] / [`MessageWriter`]: `Content-Length` framing
//! - [`JsonRpcMessage`] and friends: JSON-RPC 2.0 encoding
//! - [`Connection`]: request/response correlation with a dispatcher thread
//! - [`RpcChannel`]: the seam callers use to send traffic
//! - [`TransportError`]: every way a request can fail

mod channel;
mod connection;
mod error;
mod framing;
mod jsonrpc;
mod policies;

pub use channel::RpcChannel;
pub use connection::Connection;
pub use error::TransportError;
pub use framing::{MessageReader, MessageWriter};
pub use jsonrpc::{
    ClientReply, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, METHOD_NOT_FOUND, ServerNotification, ServerRequest, next_request_id,
};
pub use policies::ResponsePolicies;

//! Request/notification seam over a live connection.

use std::time::Duration;

use serde_json::Value;

use super::connection::Connection;
use super::error::TransportError;

/// Anything that can carry client-to-server traffic.
///
/// Handshake and forwarding code talk to this trait rather than to a
/// concrete process so they can be exercised against doubles.
pub trait RpcChannel {
    /// Sends a request and waits up to `timeout` for its result.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the request fails.
    fn request(&self, method: &str, params: Value, timeout: Duration)
    -> Result<Value, TransportError>;

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the notification cannot be written.
    fn notify(&self, method: &str, params: Value) -> Result<(), TransportError>;
}

impl RpcChannel for Connection {
    fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        Self::request(self, method, params, timeout)
    }

    fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        Self::notify(self, method, params)
    }
}

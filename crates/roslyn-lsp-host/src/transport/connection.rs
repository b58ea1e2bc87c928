//! Request/response correlation over a framed byte stream.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::error::TransportError;
use super::framing::{MessageReader, MessageWriter};
use super::jsonrpc::{
    ClientReply, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ServerNotification, ServerRequest,
};
use super::policies::ResponsePolicies;

/// Log target for transport operations.
const TRANSPORT_TARGET: &str = "roslyn_lsp_host::transport";

type SharedWriter = Arc<Mutex<MessageWriter<Box<dyn Write + Send>>>>;
type PendingMap = Arc<Mutex<HashMap<i64, Sender<JsonRpcResponse>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A JSON-RPC connection to one server process.
///
/// A dispatcher thread reads every framed message from the server, hands
/// responses to the request waiting on them, and answers server-initiated
/// requests using the supplied [`ResponsePolicies`]. The dispatcher exits when
/// the server closes its output stream; waiting requests then fail with
/// [`TransportError::Closed`].
pub struct Connection {
    writer: SharedWriter,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Connection {
    /// Starts the dispatcher over the given server streams.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the dispatcher thread cannot be started.
    pub fn open<R, W>(
        reader: R,
        writer: W,
        policies: Arc<ResponsePolicies>,
    ) -> Result<Self, TransportError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let boxed: Box<dyn Write + Send> = Box::new(writer);
        let writer = Arc::new(Mutex::new(MessageWriter::new(boxed)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let dispatcher = Dispatcher {
            reader: MessageReader::new(reader),
            writer: Arc::clone(&writer),
            pending: Arc::clone(&pending),
            closed: Arc::clone(&closed),
            policies,
        };
        let handle = thread::Builder::new()
            .name(String::from("roslyn-lsp-dispatch"))
            .spawn(move || dispatcher.run())?;

        Ok(Self {
            writer,
            pending,
            closed,
            dispatcher: Some(handle),
        })
    }

    /// Sends a request and blocks until its response or the timeout.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Timeout` when no response arrives in time,
    /// `TransportError::Closed` when the server stream ends first,
    /// `TransportError::Rpc` when the server answers with an error object,
    /// and `TransportError::Io` when the request cannot be written.
    pub fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let request = JsonRpcRequest::new(method, Some(params));
        let request_id = request.id;
        let payload = serde_json::to_vec(&request)?;
        let (sender, receiver) = mpsc::channel();
        lock(&self.pending).insert(request_id, sender);
        // The dispatcher flags closure before draining `pending`.
        if self.is_closed() {
            lock(&self.pending).remove(&request_id);
            return Err(TransportError::Closed);
        }

        debug!(
            target: TRANSPORT_TARGET,
            method,
            id = request_id,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "sending request"
        );

        if let Err(error) = lock(&self.writer).send(&payload) {
            lock(&self.pending).remove(&request_id);
            return Err(error);
        }

        match receiver.recv_timeout(timeout) {
            Ok(response) => {
                if let Some(error) = response.error {
                    return Err(TransportError::from_jsonrpc(error));
                }
                Ok(response.result.unwrap_or(Value::Null))
            }
            Err(RecvTimeoutError::Timeout) => {
                lock(&self.pending).remove(&request_id);
                warn!(
                    target: TRANSPORT_TARGET,
                    method,
                    id = request_id,
                    "request timed out"
                );
                Err(TransportError::timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// Sends a notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the notification cannot be written.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        let notification = JsonRpcNotification::new(method, Some(params));
        let payload = serde_json::to_vec(&notification)?;

        debug!(
            target: TRANSPORT_TARGET,
            method,
            "sending notification"
        );

        lock(&self.writer).send(&payload)
    }

    /// Whether the server has closed its output stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The dispatcher ends once the server's stdout closes; it is not joined
        // here because a wedged server must not block the caller.
        drop(self.dispatcher.take());
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("pending", &lock(&self.pending).len())
            .finish()
    }
}

struct Dispatcher<R: Read> {
    reader: MessageReader<R>,
    writer: SharedWriter,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    policies: Arc<ResponsePolicies>,
}

impl<R: Read> Dispatcher<R> {
    fn run(mut self) {
        loop {
            match self.reader.receive() {
                Ok(Some(bytes)) => self.dispatch(&bytes),
                Ok(None) => {
                    debug!(target: TRANSPORT_TARGET, "server closed its output stream");
                    break;
                }
                Err(error) => {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        "failed to read from server, closing connection"
                    );
                    break;
                }
            }
        }

        self.closed.store(true, Ordering::SeqCst);
        // Dropping the senders wakes every waiting request with `Closed`.
        lock(&self.pending).clear();
    }

    fn dispatch(&self, bytes: &[u8]) {
        match JsonRpcMessage::from_bytes(bytes) {
            Ok(JsonRpcMessage::Response(response)) => self.route_response(response),
            Ok(JsonRpcMessage::ServerRequest(request)) => self.answer_request(request),
            Ok(JsonRpcMessage::Notification(notification)) => self.observe(&notification),
            Err(error) => warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "discarding malformed message from server"
            ),
        }
    }

    fn route_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id else {
            warn!(target: TRANSPORT_TARGET, "discarding response without id");
            return;
        };
        match lock(&self.pending).remove(&id) {
            Some(waiter) => {
                // The waiter may have timed out and gone away.
                drop(waiter.send(response));
            }
            None => debug!(
                target: TRANSPORT_TARGET,
                id,
                "discarding response for a request nobody awaits"
            ),
        }
    }

    fn answer_request(&self, request: ServerRequest) {
        let reply = match self.policies.answer(&request.method, &request.params) {
            Some(result) => {
                trace!(
                    target: TRANSPORT_TARGET,
                    method = %request.method,
                    "answering server request"
                );
                ClientReply::result(request.id, result)
            }
            None => {
                warn!(
                    target: TRANSPORT_TARGET,
                    method = %request.method,
                    "no policy for server request, replying MethodNotFound"
                );
                ClientReply::method_not_found(request.id, &request.method)
            }
        };

        let outcome = serde_json::to_vec(&reply)
            .map_err(TransportError::from)
            .and_then(|payload| lock(&self.writer).send(&payload));
        if let Err(error) = outcome {
            debug!(
                target: TRANSPORT_TARGET,
                error = %error,
                "failed to reply to server request"
            );
        }
    }

    fn observe(&self, notification: &ServerNotification) {
        if !self
            .policies
            .observe(&notification.method, &notification.params)
        {
            debug!(
                target: TRANSPORT_TARGET,
                method = %notification.method,
                "skipping server notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{PipeReader, PipeWriter, pipe};

    use rstest::rstest;
    use serde_json::json;

    use super::*;

    /// Server side of an in-memory connection.
    struct FakeServer {
        reader: MessageReader<PipeReader>,
        writer: MessageWriter<PipeWriter>,
    }

    impl FakeServer {
        fn read_json(&mut self) -> Value {
            let bytes = self
                .reader
                .receive()
                .expect("read failed")
                .expect("client closed");
            serde_json::from_slice(&bytes).expect("invalid json")
        }

        fn write_json(&mut self, value: &Value) {
            let bytes = serde_json::to_vec(value).expect("encode failed");
            self.writer.send(&bytes).expect("write failed");
        }
    }

    fn connect(policies: ResponsePolicies) -> (Connection, FakeServer) {
        let (server_in, client_out) = pipe().expect("pipe");
        let (client_in, server_out) = pipe().expect("pipe");
        let connection =
            Connection::open(client_in, client_out, Arc::new(policies)).expect("open failed");
        let server = FakeServer {
            reader: MessageReader::new(server_in),
            writer: MessageWriter::new(server_out),
        };
        (connection, server)
    }

    #[rstest]
    fn correlates_response_with_request() {
        let (connection, mut server) = connect(ResponsePolicies::new());
        let handle = thread::spawn(move || {
            let request = server.read_json();
            server.write_json(&json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": {"echo": request["method"]},
            }));
            server
        });

        let result = connection
            .request("workspace/symbol", json!({"query": ""}), Duration::from_secs(5))
            .expect("request failed");

        assert_eq!(result, json!({"echo": "workspace/symbol"}));
        drop(handle.join());
    }

    #[rstest]
    fn answers_server_requests_while_waiting() {
        let mut policies = ResponsePolicies::new();
        policies.on_request("workspace/configuration", |_| json!([4]));
        let (connection, mut server) = connect(policies);
        let handle = thread::spawn(move || {
            let request = server.read_json();
            server.write_json(&json!({
                "jsonrpc": "2.0",
                "id": "cfg-1",
                "method": "workspace/configuration",
                "params": {"items": [{"section": "tab_width"}]},
            }));
            let reply = server.read_json();
            server.write_json(&json!({"jsonrpc": "2.0", "id": request["id"], "result": null}));
            reply
        });

        let result = connection
            .request("initialize", json!({}), Duration::from_secs(5))
            .expect("request failed");
        let reply = handle.join().expect("server thread panicked");

        assert_eq!(result, Value::Null);
        assert_eq!(reply["id"], json!("cfg-1"));
        assert_eq!(reply["result"], json!([4]));
    }

    #[rstest]
    fn surfaces_error_responses() {
        let (connection, mut server) = connect(ResponsePolicies::new());
        let handle = thread::spawn(move || {
            let request = server.read_json();
            server.write_json(&json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": {"code": -32603, "message": "boom"},
            }));
            server
        });

        let result = connection.request("textDocument/hover", json!({}), Duration::from_secs(5));

        assert!(matches!(result, Err(TransportError::Rpc { code: -32603, .. })));
        drop(handle.join());
    }

    #[rstest]
    fn times_out_when_server_stays_silent() {
        let (connection, server) = connect(ResponsePolicies::new());

        let result = connection.request("workspace/symbol", json!({}), Duration::from_millis(50));

        assert!(matches!(result, Err(TransportError::Timeout { timeout_ms: 50 })));
        drop(server);
    }

    #[rstest]
    fn closed_stream_fails_waiting_requests() {
        let (connection, mut server) = connect(ResponsePolicies::new());
        let handle = thread::spawn(move || {
            drop(server.read_json());
            drop(server);
        });

        let result = connection.request("workspace/symbol", json!({}), Duration::from_secs(5));
        drop(handle.join());

        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(connection.is_closed());
    }
}

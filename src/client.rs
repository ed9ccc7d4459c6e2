//! Async JSON-RPC 2.0 request correlation
//!
//! [`JsonRpcClient`] is a channel-backed JSON-RPC 2.0 client decoupled from
//! the underlying transport. Outbound messages are written to an unbounded
//! channel as newline-free JSON strings; the transport layer is responsible
//! for framing. Inbound frames arrive on a second channel and are consumed by
//! the read loop started with [`start_read_loop`].
//!
//! In-flight requests live in a `pending` map keyed by `u64` request id. Each
//! entry is a [`oneshot::Sender`] resolved when the matching response
//! arrives. An entry leaves the map exactly once: on response arrival, on
//! timeout (the slot is freed so a late response is discarded), or on
//! teardown (cancellation or inbound-channel close drops every sender, which
//! rejects every waiting caller).
//!
//! Frames that are not valid JSON, lack the JSON-RPC envelope, or carry an
//! unknown id are logged and discarded; one malformed line never takes down
//! an otherwise healthy connection. Server-sent notifications are observed
//! only for diagnostics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{McpherdError, Result};
use crate::types::{JsonRpcError, JsonRpcNotification, JsonRpcRequest};

/// Timeout applied to every request when the caller does not specify one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The pending-response map: request id to the oneshot resolving that call.
type PendingMap =
    HashMap<u64, oneshot::Sender<std::result::Result<serde_json::Value, JsonRpcError>>>;

/// Channel-backed JSON-RPC 2.0 client for one connection.
///
/// Create one with [`JsonRpcClient::new`], wire the outbound receiver to a
/// transport writer, and call [`start_read_loop`] with the inbound receiver.
/// Issue requests with [`request`](JsonRpcClient::request) and
/// fire-and-forget notifications with [`notify`](JsonRpcClient::notify).
pub struct JsonRpcClient {
    /// Monotonically increasing request id counter; starts at 1, never
    /// reused, never reset for the lifetime of the connection.
    next_id: AtomicU64,
    /// In-flight requests waiting for a response.
    pending: Mutex<PendingMap>,
    /// Channel carrying serialized JSON-RPC messages to the transport.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Name of the server this connection belongs to; used in diagnostics
    /// and error values.
    server_name: String,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("server_name", &self.server_name)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    /// Create a new client for the named server.
    ///
    /// The caller is responsible for wiring the outbound receiver to a
    /// transport writer and for calling [`start_read_loop`] with the
    /// corresponding inbound receiver.
    pub fn new(server_name: impl Into<String>, outbound_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound_tx,
            server_name: server_name.into(),
        }
    }

    /// Send a JSON-RPC request and await the typed response.
    ///
    /// Assigns the next monotonic id, registers the pending slot, serializes
    /// the envelope, sends it, and waits for the matching response.
    ///
    /// # Errors
    ///
    /// Returns [`McpherdError::Transport`] if the outbound channel is closed.
    /// Returns [`McpherdError::Timeout`] if no response arrives in time; the
    /// pending slot is freed so a late response is discarded.
    /// Returns [`McpherdError::ProcessExit`] if the connection is torn down
    /// while the request is in flight.
    /// Returns [`McpherdError::Rpc`] if the server answers with an error
    /// object, and [`McpherdError::Serialization`] if the result does not
    /// match the expected type.
    pub async fn request<P, R>(&self, method: &str, params: P, timeout: Option<Duration>) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Register the pending slot before sending so the response can never
        // arrive before we are ready to receive it.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        let message = serde_json::to_string(&JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(id)),
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;

        if self.outbound_tx.send(message).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(McpherdError::Transport("outbound channel closed".to_string()).into());
        }

        let deadline = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(v) => v,
            Err(_) => {
                // Free the slot; a response arriving after this point finds
                // no pending entry and is discarded by the read loop.
                self.pending.lock().await.remove(&id);
                return Err(McpherdError::Timeout {
                    server: self.server_name.clone(),
                    method: method.to_string(),
                }
                .into());
            }
        };

        // The sender was dropped: teardown rejected this request in place.
        let rpc_result = outcome.map_err(|_| {
            McpherdError::ProcessExit(format!(
                "connection to `{}` closed before a response to `{}` arrived",
                self.server_name, method
            ))
        })?;

        let value = rpc_result.map_err(|e| McpherdError::Rpc {
            code: e.code,
            message: e.message,
        })?;

        serde_json::from_value(value).map_err(|e| McpherdError::Serialization(e).into())
    }

    /// Send a JSON-RPC notification (no id, no response expected).
    ///
    /// # Errors
    ///
    /// Returns [`McpherdError::Transport`] if the outbound channel is closed
    /// and [`McpherdError::Serialization`] if serialization fails.
    pub fn notify<P: serde::Serialize + Send>(&self, method: &str, params: P) -> Result<()> {
        let message = serde_json::to_string(&JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;

        self.outbound_tx
            .send(message)
            .map_err(|_| McpherdError::Transport("outbound channel closed".to_string()))?;

        Ok(())
    }

    /// Number of in-flight requests.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drop every pending sender, rejecting all in-flight callers with a
    /// `ProcessExit`-class failure. Used by `stop()` and the exit watcher.
    pub(crate) async fn abort_pending(&self) {
        self.pending.lock().await.clear();
    }

    /// The server name this client was created for.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

/// Start the read loop for one connection as a background Tokio task.
///
/// The loop consumes framed JSON strings from `inbound_rx` and dispatches
/// each one:
///
/// - a response (`id` + `result`/`error`) resolves the matching pending
///   entry; unknown ids are discarded with a `debug!`;
/// - a notification (`method`, no `id`) is observed at `debug!` and
///   discarded;
/// - anything unparseable or missing the envelope is discarded with a
///   `warn!`.
///
/// On cancellation, or when the inbound channel closes (the process went
/// away), all pending senders are dropped so that every waiting caller
/// settles with an error instead of blocking indefinitely.
pub fn start_read_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancellation: CancellationToken,
    client: Arc<JsonRpcClient>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    client.abort_pending().await;
                    break;
                }

                maybe_frame = inbound_rx.recv() => {
                    match maybe_frame {
                        Some(raw) => dispatch_frame(&raw, &client).await,
                        None => {
                            client.abort_pending().await;
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Classify and dispatch a single inbound frame.
async fn dispatch_frame(raw: &str, client: &JsonRpcClient) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                server = %client.server_name,
                "discarding unparseable frame: {e}"
            );
            return;
        }
    };

    if !value.is_object() || value.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        tracing::warn!(
            server = %client.server_name,
            "discarding frame without a JSON-RPC 2.0 envelope"
        );
        return;
    }

    let has_id = value.get("id").map(|v| !v.is_null()).unwrap_or(false);
    let has_method = value.get("method").is_some();
    let has_payload = value.get("result").is_some() || value.get("error").is_some();

    if has_id && has_payload && !has_method {
        resolve_response(value, client).await;
    } else if has_method && !has_id {
        let method = value.get("method").and_then(|m| m.as_str()).unwrap_or("");
        tracing::debug!(
            server = %client.server_name,
            "ignoring notification `{method}`"
        );
    } else {
        tracing::debug!(
            server = %client.server_name,
            "ignoring unclassifiable frame (has_id={has_id} has_method={has_method})"
        );
    }
}

/// Resolve a pending request with the response's result or error.
async fn resolve_response(value: serde_json::Value, client: &JsonRpcClient) {
    let Some(id) = value.get("id").and_then(|v| v.as_u64()) else {
        tracing::warn!(
            server = %client.server_name,
            "discarding response with non-numeric id: {}",
            value["id"]
        );
        return;
    };

    let tx = {
        let mut pending = client.pending.lock().await;
        pending.remove(&id)
    };

    let Some(tx) = tx else {
        // Timed out, torn down, or never ours. Either way nobody is waiting.
        tracing::debug!(
            server = %client.server_name,
            "discarding response for unknown id {id}"
        );
        return;
    };

    let outcome: std::result::Result<serde_json::Value, JsonRpcError> =
        if let Some(error_val) = value.get("error") {
            match serde_json::from_value::<JsonRpcError>(error_val.clone()) {
                Ok(e) => Err(e),
                Err(_) => Err(JsonRpcError {
                    code: -32603,
                    message: format!("malformed error object: {error_val}"),
                    data: None,
                }),
            }
        } else {
            Ok(value
                .get("result")
                .cloned()
                .unwrap_or(serde_json::Value::Null))
        };

    // Ignore send failures: the caller may have timed out in the interim.
    let _ = tx.send(outcome);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

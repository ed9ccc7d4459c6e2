//! Per-server connection state machine
//!
//! A [`ServerConnection`] owns everything belonging to one configured server:
//! the transport (and through it the child process), the JSON-RPC client with
//! its id counter and pending map, the read loop, and the lifecycle state.
//! Connections are created `Ready` by [`ServerConnection::start`] -- the
//! `Starting` and `HandshakeInFlight` states are transient inside that call --
//! and end in `Stopped` (explicit stop) or `Errored` (unexpected process
//! exit). There is no auto-restart; a failed connection is replaced by a
//! fresh `start()`.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::client::{start_read_loop, JsonRpcClient};
use crate::config::{ServerConfig, TransportKind};
use crate::error::{McpherdError, Result};
use crate::protocol::{McpHandshake, McpSession};
use crate::transport::stdio::StdioTransport;
use crate::transport::Transport;
use crate::types::{ClientCapabilities, Implementation, ToolDescriptor};

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Process is being spawned.
    Starting,
    /// Process is up; the initialize exchange is in flight.
    HandshakeInFlight,
    /// Handshake complete; calls are accepted.
    Ready,
    /// An explicit stop is in progress.
    Stopping,
    /// Explicitly stopped.
    Stopped,
    /// The process went away or the handshake failed; calls are rejected.
    Errored,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Starting => "starting",
            ConnectionState::HandshakeInFlight => "handshake-in-flight",
            ConnectionState::Ready => "ready",
            ConnectionState::Stopping => "stopping",
            ConnectionState::Stopped => "stopped",
            ConnectionState::Errored => "errored",
        };
        write!(f, "{s}")
    }
}

/// One live (or once-live) connection to a configured server.
#[derive(Debug)]
pub struct ServerConnection {
    name: String,
    transport: Arc<dyn Transport>,
    client: Arc<JsonRpcClient>,
    session: McpSession,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ServerConnection {
    /// Spawn the configured server and drive it to `Ready`.
    ///
    /// Spawns the process with the configured command/args and the parent
    /// environment overlaid with the server's overrides, wires its output
    /// through the frame reader into the read loop, performs the handshake,
    /// and installs the exit watcher.
    ///
    /// # Errors
    ///
    /// Returns [`McpherdError::UnsupportedTransport`] for non-stdio configs,
    /// [`McpherdError::Spawn`] when no process could be created, and
    /// [`McpherdError::Handshake`] when the process started but the
    /// initialize exchange failed (error response, malformed reply, or
    /// timeout) -- in that case the process has already been signalled to
    /// terminate. The caller must retry with a fresh `start()`.
    pub async fn start(config: &ServerConfig) -> Result<Arc<Self>> {
        if config.transport != TransportKind::Stdio {
            return Err(
                McpherdError::UnsupportedTransport(config.transport.to_string()).into(),
            );
        }
        let transport = StdioTransport::spawn(&config.command, &config.args, &config.env)?;
        Self::establish(config, Arc::new(transport)).await
    }

    /// Drive an already-spawned transport through the handshake.
    pub(crate) async fn establish(
        config: &ServerConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>> {
        let state = Arc::new(watch::channel(ConnectionState::Starting).0);
        let cancel = CancellationToken::new();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let client = Arc::new(JsonRpcClient::new(&config.name, out_tx));
        start_read_loop(in_rx, cancel.clone(), Arc::clone(&client));

        // Bridge: outbound JSON-RPC messages -> transport.
        let outbound_transport = Arc::clone(&transport);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if outbound_transport.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Bridge: framed transport output -> read loop.
        let inbound_transport = Arc::clone(&transport);
        tokio::spawn(async move {
            let mut stream = inbound_transport.receive();
            while let Some(frame) = stream.next().await {
                if in_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        state.send_replace(ConnectionState::HandshakeInFlight);

        let handshake = McpHandshake::new(Arc::clone(&client), config.request_timeout());
        let client_info = Implementation {
            name: "mcpherd".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let session = match handshake
            .initialize(client_info, ClientCapabilities::default())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                state.send_replace(ConnectionState::Errored);
                cancel.cancel();
                transport.shutdown();
                return Err(McpherdError::Handshake {
                    server: config.name.clone(),
                    message: format!("{e:#}"),
                }
                .into());
            }
        };

        state.send_replace(ConnectionState::Ready);
        tracing::info!(
            server = %config.name,
            server_impl = %session.server_info().name,
            "connection ready"
        );

        // Exit watcher: an unexpected process exit fails every pending
        // request and parks the connection in Errored.
        let mut exit_rx = transport.exit_signal();
        let watcher_state = Arc::clone(&state);
        let watcher_cancel = cancel.clone();
        let watcher_client = Arc::clone(&client);
        let watcher_name = config.name.clone();
        tokio::spawn(async move {
            loop {
                if *exit_rx.borrow() {
                    let was_ready = watcher_state.send_if_modified(|s| {
                        if *s == ConnectionState::Ready {
                            *s = ConnectionState::Errored;
                            true
                        } else {
                            false
                        }
                    });
                    if was_ready {
                        tracing::warn!(
                            server = %watcher_name,
                            "server process exited unexpectedly"
                        );
                        watcher_cancel.cancel();
                        watcher_client.abort_pending().await;
                    }
                    break;
                }
                if exit_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        Ok(Arc::new(Self {
            name: config.name.clone(),
            transport,
            client,
            session,
            cancel,
            state,
        }))
    }

    /// The configured server name this connection belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// True iff the connection is `Ready`.
    pub fn is_running(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Identity the server reported during the handshake.
    pub fn server_info(&self) -> &Implementation {
        self.session.server_info()
    }

    /// Number of in-flight requests on this connection.
    pub async fn pending_count(&self) -> usize {
        self.client.pending_count().await
    }

    /// Enumerate the server's tools.
    ///
    /// Tool discovery is advisory: any failure -- including a connection that
    /// is not `Ready` -- reports an empty list rather than propagating.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        if !self.is_running() {
            tracing::warn!(
                server = %self.name,
                state = %self.state(),
                "tools/list on a connection that is not ready"
            );
            return Vec::new();
        }
        match self.session.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!(server = %self.name, "tools/list failed: {e:#}");
                Vec::new()
            }
        }
    }

    /// Send a `ping` and wait for the acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`McpherdError::NotReady`] when the connection is not `Ready`,
    /// otherwise whatever failure the request produced.
    pub async fn ping(&self) -> Result<()> {
        if !self.is_running() {
            return Err(McpherdError::NotReady(self.name.clone()).into());
        }
        self.session.ping().await
    }

    /// Stop the connection: reject every pending request, signal the process,
    /// and park the state in `Stopped`.
    ///
    /// Idempotent -- calling `stop()` on an already-stopped connection is a
    /// no-op. Does not await graceful process exit.
    pub async fn stop(&self) {
        let current = self.state();
        if matches!(
            current,
            ConnectionState::Stopping | ConnectionState::Stopped
        ) {
            return;
        }
        self.state.send_replace(ConnectionState::Stopping);
        self.cancel.cancel();
        self.client.abort_pending().await;
        self.transport.shutdown();
        self.state.send_replace(ConnectionState::Stopped);
        tracing::info!(server = %self.name, "connection stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{FakeTransport, FakeTransportHandle};
    use std::time::Duration;
    use tokio::sync::watch as tokio_watch;

    /// What the scripted fake server answers beyond the handshake.
    struct ServerScript {
        answer_tools: bool,
        answer_pings: bool,
    }

    /// Drive a [`FakeTransportHandle`] like a well-behaved server.
    ///
    /// Returns the exit sender so tests can simulate process death.
    fn run_fake_server(
        handle: FakeTransportHandle,
        script: ServerScript,
    ) -> Arc<tokio_watch::Sender<bool>> {
        let FakeTransportHandle {
            mut outbound_rx,
            inbound_tx,
            exit_tx,
        } = handle;

        tokio::spawn(async move {
            while let Some(raw) = outbound_rx.recv().await {
                let req: serde_json::Value = match serde_json::from_str(&raw) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let method = req["method"].as_str().unwrap_or("");
                let id = req["id"].clone();
                let result = match method {
                    "initialize" => serde_json::json!({
                        "protocolVersion": crate::types::LATEST_PROTOCOL_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": "fake", "version": "1.0" }
                    }),
                    "tools/list" if script.answer_tools => serde_json::json!({
                        "tools": [{ "name": "echo", "description": "Echoes input" }]
                    }),
                    "ping" if script.answer_pings => serde_json::json!({}),
                    // Notifications and suppressed methods get no reply.
                    _ => continue,
                };
                let resp = serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result });
                if inbound_tx
                    .send(serde_json::to_string(&resp).unwrap())
                    .is_err()
                {
                    break;
                }
            }
        });

        exit_tx
    }

    fn test_config(name: &str) -> ServerConfig {
        ServerConfig::new(name, "unused").with_request_timeout(Duration::from_millis(500))
    }

    async fn ready_connection(script: ServerScript) -> (Arc<ServerConnection>, Arc<tokio_watch::Sender<bool>>) {
        let (transport, handle) = FakeTransport::new();
        let exit_tx = run_fake_server(handle, script);
        let connection = ServerConnection::establish(&test_config("fake"), Arc::new(transport))
            .await
            .expect("establish failed");
        (connection, exit_tx)
    }

    #[tokio::test]
    async fn test_establish_reaches_ready_and_lists_tools() {
        let (connection, _exit) = ready_connection(ServerScript {
            answer_tools: true,
            answer_pings: true,
        })
        .await;

        assert_eq!(connection.state(), ConnectionState::Ready);
        assert!(connection.is_running());
        assert_eq!(connection.server_info().name, "fake");

        let tools = connection.list_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn test_establish_fails_on_handshake_error_response() {
        let (transport, handle) = FakeTransport::new();
        let FakeTransportHandle {
            mut outbound_rx,
            inbound_tx,
            exit_tx,
        } = handle;

        tokio::spawn(async move {
            let raw = outbound_rx.recv().await.unwrap();
            let req: serde_json::Value = serde_json::from_str(&raw).unwrap();
            let resp = serde_json::json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": { "code": -32600, "message": "unsupported client" }
            });
            inbound_tx
                .send(serde_json::to_string(&resp).unwrap())
                .unwrap();
        });

        let result =
            ServerConnection::establish(&test_config("fake"), Arc::new(transport)).await;
        let err = result.unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<McpherdError>(),
                Some(McpherdError::Handshake { .. })
            ),
            "expected Handshake error, got: {err:#}"
        );
        // The process was signalled to terminate.
        assert!(*exit_tx.borrow());
    }

    #[tokio::test]
    async fn test_establish_fails_on_handshake_timeout() {
        let (transport, handle) = FakeTransport::new();
        // Keep the handle alive but never answer anything.
        let _handle = handle;
        let config = ServerConfig::new("mute", "unused")
            .with_request_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let result = ServerConnection::establish(&config, Arc::new(transport)).await;
        let err = result.unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<McpherdError>(),
                Some(McpherdError::Handshake { .. })
            ),
            "expected Handshake error, got: {err:#}"
        );
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "handshake timeout did not bound establish()"
        );
    }

    #[tokio::test]
    async fn test_stop_rejects_pending_and_is_idempotent() {
        // Handshake completes but pings are never answered.
        let (connection, _exit) = ready_connection(ServerScript {
            answer_tools: true,
            answer_pings: false,
        })
        .await;

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let conn = Arc::clone(&connection);
            waiters.push(tokio::spawn(async move { conn.ping().await }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connection.pending_count().await, 3);

        connection.stop().await;

        for waiter in waiters {
            let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
                .await
                .expect("pending caller did not settle on stop")
                .expect("task panicked");
            let err = outcome.unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<McpherdError>(),
                    Some(McpherdError::ProcessExit(_))
                ),
                "expected ProcessExit, got: {err:#}"
            );
        }
        assert_eq!(connection.pending_count().await, 0);
        assert_eq!(connection.state(), ConnectionState::Stopped);

        // Second stop is a no-op, not an error.
        connection.stop().await;
        assert_eq!(connection.state(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn test_unexpected_exit_moves_ready_to_errored() {
        let (connection, exit_tx) = ready_connection(ServerScript {
            answer_tools: true,
            answer_pings: true,
        })
        .await;
        assert!(connection.is_running());

        exit_tx.send_replace(true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(connection.state(), ConnectionState::Errored);
        assert!(!connection.is_running());

        // Advisory discovery degrades to an empty list; typed calls reject.
        assert!(connection.list_tools().await.is_empty());
        let err = connection.ping().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpherdError>(),
            Some(McpherdError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_wins_over_exit_watcher() {
        let (connection, exit_tx) = ready_connection(ServerScript {
            answer_tools: true,
            answer_pings: true,
        })
        .await;

        connection.stop().await;
        // The fake's shutdown() already flipped the exit flag; flip again to
        // be explicit and give the watcher a chance to run.
        exit_tx.send_replace(true);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // A deliberate stop stays Stopped; the watcher must not relabel it.
        assert_eq!(connection.state(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn test_start_rejects_non_stdio_transport() {
        let mut config = test_config("remote");
        config.transport = TransportKind::Sse;
        let err = ServerConnection::start(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpherdError>(),
            Some(McpherdError::UnsupportedTransport(_))
        ));
    }
}

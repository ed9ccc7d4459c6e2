//! Typed handshake and session wrapper over [`JsonRpcClient`]
//!
//! Two types represent the two phases of a connection:
//!
//! - [`McpHandshake`] -- an unnegotiated session. [`McpHandshake::initialize`]
//!   performs the `initialize` / `notifications/initialized` exchange and
//!   yields an [`McpSession`]. No other method may be sent on the wire until
//!   this completes; the type split enforces that at compile time.
//! - [`McpSession`] -- a negotiated session with typed methods for the
//!   runtime's surface: `tools/list` (with cursor pagination handled
//!   internally) and `ping`.
//!
//! Neither type owns a transport; callers wire up channels externally and
//! pass in a shared [`JsonRpcClient`].

use std::sync::Arc;
use std::time::Duration;

use crate::client::JsonRpcClient;
use crate::error::{McpherdError, Result};
use crate::types::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResponse, ListToolsResponse,
    PaginatedParams, ToolDescriptor, LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_PING, METHOD_TOOLS_LIST, SUPPORTED_PROTOCOL_VERSIONS,
};

/// An unnegotiated session, ready to perform the handshake.
#[derive(Debug)]
pub struct McpHandshake {
    client: Arc<JsonRpcClient>,
    timeout: Duration,
}

impl McpHandshake {
    /// Create a handshake wrapper over a channel-wired client.
    ///
    /// `timeout` bounds the `initialize` request and every later RPC issued
    /// through the resulting session.
    pub fn new(client: Arc<JsonRpcClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Perform the `initialize` / `notifications/initialized` exchange.
    ///
    /// Sends `initialize` carrying the protocol version, the declared client
    /// capabilities, and the client identity; verifies the server-selected
    /// version is one this client accepts; then fires the `initialized`
    /// notification and returns the negotiated [`McpSession`].
    ///
    /// # Errors
    ///
    /// Returns [`McpherdError::ProtocolVersion`] if the server picks a
    /// version outside [`SUPPORTED_PROTOCOL_VERSIONS`], or whatever failure
    /// the underlying request produced (error response, timeout, teardown).
    pub async fn initialize(
        self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
    ) -> Result<McpSession> {
        let response: InitializeResponse = self
            .client
            .request(
                METHOD_INITIALIZE,
                InitializeParams {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities,
                    client_info,
                },
                Some(self.timeout),
            )
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&response.protocol_version.as_str()) {
            return Err(McpherdError::ProtocolVersion {
                expected: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                got: response.protocol_version,
            }
            .into());
        }

        // Fire-and-forget; the server must not reply and a send failure here
        // is not fatal to the session.
        let _ = self.client.notify(METHOD_INITIALIZED, serde_json::json!({}));

        Ok(McpSession {
            client: self.client,
            timeout: self.timeout,
            initialize_response: response,
        })
    }
}

/// A negotiated session over one connection.
#[derive(Debug)]
pub struct McpSession {
    client: Arc<JsonRpcClient>,
    timeout: Duration,
    /// The server's response to the `initialize` request.
    pub initialize_response: InitializeResponse,
}

impl McpSession {
    /// Identity the server reported during the handshake.
    pub fn server_info(&self) -> &Implementation {
        &self.initialize_response.server_info
    }

    /// Whether the server advertised the tools capability.
    pub fn supports_tools(&self) -> bool {
        self.initialize_response.capabilities.tools.is_some()
    }

    /// List every tool the server advertises, following `nextCursor`
    /// pagination until exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if any paged request fails.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let resp: ListToolsResponse = self
                .client
                .request(
                    METHOD_TOOLS_LIST,
                    PaginatedParams { cursor },
                    Some(self.timeout),
                )
                .await?;

            tools.extend(resp.tools);

            match resp.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Send a `ping` and wait for the (empty) acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the request times out or the connection is torn
    /// down first.
    pub async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self
            .client
            .request(METHOD_PING, serde_json::json!({}), Some(self.timeout))
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

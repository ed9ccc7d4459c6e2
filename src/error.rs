//! Error types for mcpherd
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for ergonomic error handling. The variants mirror the failure
//! classes of the connection runtime: spawn failures, handshake failures,
//! per-request timeouts, JSON-RPC error responses, process exits, and
//! registry-level rejections.

use thiserror::Error;

/// Main error type for mcpherd operations
///
/// Failures local to a single request (`Timeout`, `Rpc`) surface only to that
/// call's caller. Failures that invalidate the whole connection
/// (`ProcessExit`, `Spawn`) are broadcast to every pending request on that
/// connection. Malformed inbound frames are never represented here at all;
/// they are logged and discarded by the read loop.
#[derive(Error, Debug)]
pub enum McpherdError {
    /// The server executable could not be spawned; no process exists.
    #[error("failed to spawn `{command}`: {message}")]
    Spawn {
        /// The executable that was asked for
        command: String,
        /// The underlying OS error text
        message: String,
    },

    /// The process started but the initialize exchange failed.
    #[error("handshake with server `{server}` failed: {message}")]
    Handshake {
        /// Name of the configured server
        server: String,
        /// What went wrong (error response, malformed reply, or timeout)
        message: String,
    },

    /// The server negotiated a protocol version this client does not accept.
    #[error("server selected unsupported protocol version `{got}` (supported: {expected:?})")]
    ProtocolVersion {
        /// Versions this client accepts
        expected: Vec<String>,
        /// The version the server selected
        got: String,
    },

    /// No matching response arrived within the request window. The
    /// connection itself stays usable.
    #[error("request timeout: server={server} method={method}")]
    Timeout {
        /// Name of the configured server
        server: String,
        /// The JSON-RPC method that timed out
        method: String,
    },

    /// The server answered with a JSON-RPC error object.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// Numeric error code from the response envelope
        code: i64,
        /// Human-readable error text from the response envelope
        message: String,
    },

    /// The child process went away while requests were outstanding or while
    /// the connection was believed live.
    #[error("server process exited: {0}")]
    ProcessExit(String),

    /// A start was requested for a name that already has a live connection.
    #[error("server `{0}` is already running")]
    DuplicateStart(String),

    /// A call was issued against a connection that is not in the `Ready`
    /// state.
    #[error("connection to `{0}` is not ready")]
    NotReady(String),

    /// Transport-level failure (closed channel, unavailable pipe).
    #[error("transport error: {0}")]
    Transport(String),

    /// The configuration names a transport kind this runtime does not drive.
    #[error("unsupported transport kind: {0}")]
    UnsupportedTransport(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for mcpherd operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

//! Server configuration descriptors
//!
//! This module defines [`ServerConfig`], the immutable record describing one
//! configured server: the executable to spawn, its arguments, the environment
//! overlay, and the transport kind. Records are supplied by an external
//! configuration source (a settings file parser, a UI, a test); this crate
//! only consumes them and never reads or writes configuration files itself.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::DEFAULT_REQUEST_TIMEOUT;

/// The transport a configured server speaks.
///
/// Only [`TransportKind::Stdio`] is driven by this runtime; other kinds are
/// representable so that configuration records round-trip, but starting them
/// is rejected with [`crate::error::McpherdError::UnsupportedTransport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process over stdin/stdout pipes, newline-delimited JSON.
    #[default]
    Stdio,
    /// Server-sent events over HTTP. Out of scope for this runtime.
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

/// Immutable descriptor for one configured server.
///
/// The `name` is the unique registry key. `env` is an overlay: the child
/// inherits the parent process environment with these variables applied on
/// top.
///
/// # Examples
///
/// ```
/// use mcpherd::config::ServerConfig;
///
/// let config = ServerConfig::new("files", "npx")
///     .arg("-y")
///     .arg("@modelcontextprotocol/server-filesystem")
///     .arg("/tmp")
///     .env_var("LOG_LEVEL", "debug");
/// assert_eq!(config.name, "files");
/// assert_eq!(config.args.len(), 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Unique server name; the registry key.
    pub name: String,
    /// Executable to spawn.
    pub command: String,
    /// Command-line arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables overlaid on the parent process environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Transport kind; only `stdio` is in scope for this runtime.
    #[serde(default)]
    pub transport: TransportKind,
    /// When `true`, the orchestrator skips this entry entirely.
    #[serde(default)]
    pub disabled: bool,
    /// Per-request timeout override in milliseconds. Applies to every RPC on
    /// the connection, including the handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl ServerConfig {
    /// Create a new stdio server config with the given name and command.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            transport: TransportKind::Stdio,
            disabled: false,
            request_timeout_ms: None,
        }
    }

    /// Append a command-line argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment overlay variable.
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// The effective per-request timeout for connections built from this
    /// config.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }
}

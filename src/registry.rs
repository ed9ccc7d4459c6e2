//! The authoritative server-name → connection table
//!
//! [`ConnectionRegistry`] owns every live [`ServerConnection`] in the
//! process, keyed by server name. All mutating operations go through one
//! async mutex, so two `start()`s for the same name can never race; raw
//! process handles never leave the registry. Entries are inserted only after
//! a successful start, so a failed start leaves no trace.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::connection::{ConnectionState, ServerConnection};
use crate::error::{McpherdError, Result};
use crate::types::ToolDescriptor;

/// Pause between stop and start during [`ConnectionRegistry::restart`],
/// giving the old process a moment to release whatever it held.
pub const RESTART_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Process-wide table mapping server names to at most one live connection.
///
/// # Examples
///
/// ```no_run
/// use mcpherd::config::ServerConfig;
/// use mcpherd::registry::ConnectionRegistry;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let registry = ConnectionRegistry::new();
/// let config = ServerConfig::new("files", "npx").arg("-y").arg("some-server");
/// registry.start(&config).await?;
/// let tools = registry.list_tools("files").await;
/// registry.stop("files").await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<ServerConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Start a connection for `config.name`.
    ///
    /// If a live connection already exists for that name, the call is
    /// rejected with [`McpherdError::DuplicateStart`] and the existing
    /// process is untouched. A stale entry (stopped or errored) is replaced.
    /// On failure nothing is inserted.
    ///
    /// # Errors
    ///
    /// Returns [`McpherdError::DuplicateStart`] or whatever
    /// [`ServerConnection::start`] produced.
    pub async fn start(&self, config: &ServerConfig) -> Result<()> {
        let mut table = self.connections.lock().await;
        if let Some(existing) = table.get(&config.name) {
            if existing.is_running() {
                return Err(McpherdError::DuplicateStart(config.name.clone()).into());
            }
        }
        let connection = ServerConnection::start(config).await?;
        table.insert(config.name.clone(), connection);
        Ok(())
    }

    /// Stop and remove the named connection.
    ///
    /// The entry is removed regardless of how the stop goes; an absent name
    /// is a no-op.
    pub async fn stop(&self, name: &str) {
        let removed = self.connections.lock().await.remove(name);
        if let Some(connection) = removed {
            connection.stop().await;
        }
    }

    /// Restart the connection for `config.name`.
    ///
    /// Stops the current connection if one is present, waits out
    /// [`RESTART_SETTLE_DELAY`], then starts fresh. When the connection was
    /// not present this degrades to a plain start.
    ///
    /// # Errors
    ///
    /// Returns whatever the subsequent [`start`](ConnectionRegistry::start)
    /// produced.
    pub async fn restart(&self, config: &ServerConfig) -> Result<()> {
        let removed = self.connections.lock().await.remove(&config.name);
        if let Some(connection) = removed {
            connection.stop().await;
            tokio::time::sleep(RESTART_SETTLE_DELAY).await;
        }
        self.start(config).await
    }

    /// Best-effort stop of every live connection, then clear the table.
    ///
    /// Used at shutdown and before a refresh. Does not await graceful child
    /// exit and does not retry.
    pub async fn stop_all(&self) {
        let drained: Vec<(String, Arc<ServerConnection>)> = {
            let mut table = self.connections.lock().await;
            table.drain().collect()
        };
        for (name, connection) in drained {
            tracing::debug!(server = %name, "stopping connection");
            connection.stop().await;
        }
    }

    /// True iff the named connection exists and is `Ready`.
    pub async fn is_running(&self, name: &str) -> bool {
        self.connections
            .lock()
            .await
            .get(name)
            .map(|c| c.is_running())
            .unwrap_or(false)
    }

    /// Lifecycle state of the named connection, if present.
    pub async fn status(&self, name: &str) -> Option<ConnectionState> {
        self.connections.lock().await.get(name).map(|c| c.state())
    }

    /// Enumerate the named server's tools; empty when absent or failing.
    pub async fn list_tools(&self, name: &str) -> Vec<ToolDescriptor> {
        let connection = self.connections.lock().await.get(name).cloned();
        match connection {
            Some(c) => c.list_tools().await,
            None => Vec::new(),
        }
    }

    /// Names currently present in the table, in no particular order.
    pub async fn names(&self) -> Vec<String> {
        self.connections.lock().await.keys().cloned().collect()
    }

    /// Number of entries in the table (live or not).
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Whether the table is empty.
    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

//! Sequential startup and discovery over a configured server list
//!
//! The [`Orchestrator`] walks an ordered list of [`ServerConfig`] records,
//! drives each one through start + tool discovery, and pushes the full
//! updated snapshot to an external [`ProgressListener`] after every entry --
//! the presentation layer sees servers come up one at a time instead of one
//! big-bang update at the end. A failure on one entry records an `Error`
//! status with an empty tool set and never aborts the remaining list.
//!
//! Re-running the orchestration (a refresh) first stops and discards every
//! existing connection, so repeated refreshes never leak processes.

use std::sync::Arc;

use serde::Serialize;

use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;

use crate::types::ToolDescriptor;

/// Presentation-facing status of one configured server.
///
/// Derived from runtime outcomes; a raw protocol error is never surfaced
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Connection is up and the handshake completed.
    Running,
    /// Not connected (disabled, or explicitly stopped).
    Stopped,
    /// Start or discovery failed.
    Error,
    /// Not yet visited by the orchestrator.
    Unknown,
}

/// Snapshot of one server's presentation state.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSnapshot {
    /// Configured server name.
    pub name: String,
    /// Derived status.
    pub status: ServerStatus,
    /// Tools discovered on the most recent successful query.
    pub tools: Vec<ToolDescriptor>,
    /// Failure summary for `Error` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerSnapshot {
    /// Number of discovered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

/// Receives the updated snapshot list after every processed entry.
///
/// Implementations must be cheap and non-blocking; they are called from the
/// orchestration task between servers.
pub trait ProgressListener: Send + Sync {
    /// Called with the snapshots accumulated so far, most recent entry last.
    fn servers_updated(&self, servers: &[ServerSnapshot]);
}

/// A listener that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl ProgressListener for NullListener {
    fn servers_updated(&self, _servers: &[ServerSnapshot]) {}
}

/// Drives a configured server list through start + discovery.
pub struct Orchestrator {
    registry: Arc<ConnectionRegistry>,
    listener: Arc<dyn ProgressListener>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator over the given registry and listener.
    pub fn new(registry: Arc<ConnectionRegistry>, listener: Arc<dyn ProgressListener>) -> Self {
        Self { registry, listener }
    }

    /// The registry this orchestrator drives.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Run one orchestration pass over `configs`, in order.
    ///
    /// Existing connections are stopped and discarded first, then each entry
    /// is started and queried sequentially. Disabled entries are recorded as
    /// `Stopped` without side effects. After every entry the listener
    /// receives the full snapshot list. Returns the final snapshots.
    pub async fn run(&self, configs: &[ServerConfig]) -> Vec<ServerSnapshot> {
        self.registry.stop_all().await;

        let mut snapshots: Vec<ServerSnapshot> = Vec::with_capacity(configs.len());
        for config in configs {
            let snapshot = if config.disabled {
                tracing::debug!(server = %config.name, "skipping disabled server");
                ServerSnapshot {
                    name: config.name.clone(),
                    status: ServerStatus::Stopped,
                    tools: Vec::new(),
                    error: None,
                }
            } else {
                match self.registry.start(config).await {
                    Ok(()) => {
                        let tools = self.registry.list_tools(&config.name).await;
                        tracing::info!(
                            server = %config.name,
                            tool_count = tools.len(),
                            "server started"
                        );
                        ServerSnapshot {
                            name: config.name.clone(),
                            status: ServerStatus::Running,
                            tools,
                            error: None,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(server = %config.name, "server failed to start: {e:#}");
                        ServerSnapshot {
                            name: config.name.clone(),
                            status: ServerStatus::Error,
                            tools: Vec::new(),
                            error: Some(format!("{e:#}")),
                        }
                    }
                }
            };
            snapshots.push(snapshot);
            self.listener.servers_updated(&snapshots);
        }
        snapshots
    }
}

//! mcpherd - connection runtime for stdio MCP servers
//!
//! This library supervises child-process servers that speak newline-delimited
//! JSON-RPC 2.0 over stdin/stdout, and exposes a request/response API to
//! callers that never see the underlying process or stream.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `framing`: reassembles complete messages from arbitrarily chunked bytes
//! - `client`: JSON-RPC request correlation and the per-connection read loop
//! - `protocol`: the initialize/initialized handshake and the typed session
//! - `transport`: the transport seam and the stdio child-process transport
//! - `connection`: the per-server lifecycle state machine
//! - `registry`: the authoritative server-name → connection table
//! - `orchestrator`: sequential startup/discovery with progressive updates
//! - `config`: server configuration descriptors (consumed, never persisted)
//! - `error`: error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcpherd::{ConnectionRegistry, Orchestrator, ServerConfig};
//! use mcpherd::orchestrator::NullListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(ConnectionRegistry::new());
//!     let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(NullListener));
//!
//!     let configs = vec![
//!         ServerConfig::new("files", "npx")
//!             .arg("-y")
//!             .arg("@modelcontextprotocol/server-filesystem")
//!             .arg("/tmp"),
//!     ];
//!     let snapshots = orchestrator.run(&configs).await;
//!     for snapshot in &snapshots {
//!         println!("{}: {:?} ({} tools)", snapshot.name, snapshot.status, snapshot.tool_count());
//!     }
//!
//!     registry.stop_all().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod framing;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::{ServerConfig, TransportKind};
pub use connection::{ConnectionState, ServerConnection};
pub use error::{McpherdError, Result};
pub use orchestrator::{Orchestrator, ProgressListener, ServerSnapshot, ServerStatus};
pub use registry::ConnectionRegistry;
pub use types::ToolDescriptor;

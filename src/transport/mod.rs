//! Transport abstraction and implementations
//!
//! [`Transport`] is the seam between the connection runtime and the medium it
//! talks over. The only production implementation is
//! [`stdio::StdioTransport`], which spawns a child process and communicates
//! over its stdin/stdout pipes using newline-delimited JSON framing. A
//! [`fake::FakeTransport`] (cfg(test) only) replaces real process I/O in
//! tests.
//!
//! The trait is intentionally minimal: callers `send` a serialized JSON-RPC
//! string and `receive` a stream of serialized JSON-RPC strings (one per
//! logical message). Framing is the responsibility of each implementation.
//! Peer lifetime is surfaced on a `watch` channel so the connection's exit
//! watcher never needs re-entrant callbacks.

use std::pin::Pin;

use futures::Stream;
use tokio::sync::watch;

use crate::error::Result;

/// Abstraction over the medium a connection speaks through.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send a complete JSON-RPC message string to the peer.
    ///
    /// The string MUST be a single, complete JSON object. The transport
    /// applies whatever framing the medium requires (a trailing newline for
    /// stdio).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::McpherdError::Transport`] if the underlying
    /// I/O channel has closed.
    async fn send(&self, message: String) -> Result<()>;

    /// Returns the stream of inbound message strings.
    ///
    /// Each item is a single, complete JSON value with the line terminator
    /// stripped. The stream ends when the transport closes or the peer goes
    /// away.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// A watch flag that flips to `true` once the peer is gone for good.
    fn exit_signal(&self) -> watch::Receiver<bool>;

    /// Best-effort termination of the peer. Never blocks; safe to call more
    /// than once.
    fn shutdown(&self);
}

pub mod stdio;

#[cfg(test)]
pub mod fake;

//! In-process fake transport for unit tests
//!
//! [`FakeTransport`] and [`FakeTransportHandle`] replace real process I/O in
//! tests. From the client's perspective, "outbound" is what it sends (the
//! test reads it via `handle.outbound_rx`) and "inbound" is what it receives
//! (the test injects via `handle.inbound_tx`). The handle can also flip the
//! exit flag to simulate the process dying underneath a live connection.
//!
//! ```text
//! client send() ------> outbound_tx ----> outbound_rx (test reads)
//! test inbound_tx ----> inbound_rx  ----> client receive()
//! test exit_tx(true) -> exit_signal()    (process death)
//! ```

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::{McpherdError, Result};
use crate::transport::Transport;

/// In-process fake transport for use in tests.
#[derive(Debug)]
pub struct FakeTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    exit_tx: Arc<watch::Sender<bool>>,
}

/// The test-side handle for a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Receives messages the client sent via [`Transport::send`].
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Sends server frames into the client's [`Transport::receive`] stream.
    pub inbound_tx: mpsc::UnboundedSender<String>,
    /// Flip to `true` to simulate the server process dying.
    pub exit_tx: Arc<watch::Sender<bool>>,
}

impl FakeTransport {
    /// Create a `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let exit_tx = Arc::new(watch::channel(false).0);

        let transport = Self {
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            exit_tx: Arc::clone(&exit_tx),
        };
        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
            exit_tx,
        };
        (transport, handle)
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx.send(message).map_err(|e| {
            anyhow::anyhow!(McpherdError::Transport(format!(
                "fake outbound channel closed: {e}"
            )))
        })
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    fn exit_signal(&self) -> watch::Receiver<bool> {
        self.exit_tx.subscribe()
    }

    fn shutdown(&self) {
        self.exit_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;

    #[tokio::test]
    async fn test_send_is_visible_on_handle() {
        let (transport, mut handle) = FakeTransport::new();
        transport
            .send(r#"{"jsonrpc":"2.0","method":"ping"}"#.to_string())
            .await
            .unwrap();
        let sent = tokio::time::timeout(Duration::from_secs(2), handle.outbound_rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert!(sent.contains("ping"));
    }

    #[tokio::test]
    async fn test_injected_frames_arrive_in_order() {
        let (transport, handle) = FakeTransport::new();
        for i in 0u32..3 {
            handle.inbound_tx.send(format!("frame-{i}")).unwrap();
        }
        let mut stream = transport.receive();
        for i in 0u32..3 {
            let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
                .await
                .expect("timed out")
                .expect("stream ended");
            assert_eq!(frame, format!("frame-{i}"));
        }
    }

    #[tokio::test]
    async fn test_shutdown_flips_exit_flag() {
        let (transport, _handle) = FakeTransport::new();
        let exit = transport.exit_signal();
        assert!(!*exit.borrow());
        transport.shutdown();
        assert!(*exit.borrow());
    }

    #[tokio::test]
    async fn test_handle_can_simulate_process_death() {
        let (transport, handle) = FakeTransport::new();
        let exit = transport.exit_signal();
        handle.exit_tx.send_replace(true);
        assert!(*exit.borrow());
    }

    #[tokio::test]
    async fn test_send_fails_when_handle_dropped() {
        let (transport, handle) = FakeTransport::new();
        drop(handle);
        assert!(transport.send("x".to_string()).await.is_err());
    }

    #[test]
    fn test_fake_transport_is_object_safe() {
        let (transport, _handle) = FakeTransport::new();
        let _boxed: Box<dyn Transport> = Box::new(transport);
    }
}

//! Stdio transport for child-process servers
//!
//! [`StdioTransport`] spawns a child process and communicates with it over
//! its stdin/stdout pipes using newline-delimited JSON framing.
//!
//! # Protocol
//!
//! - Outbound messages are written to the child's stdin as a single JSON
//!   object followed by a newline (`\n`).
//! - Inbound bytes are read from the child's stdout in raw chunks and
//!   reassembled into complete frames by a [`LineFramer`]; chunk boundaries
//!   may fall anywhere, including inside a message body.
//! - The child's stderr is diagnostic only: lines are logged at `DEBUG` and
//!   never treated as an error condition.
//!
//! # Lifecycle
//!
//! Four background Tokio tasks are started by [`StdioTransport::spawn`]: a
//! stdin writer, a stdout reader, a stderr reader, and a supervisor that owns
//! the [`Child`], awaits its exit, publishes the exit flag on a `watch`
//! channel, and performs the kill when [`shutdown`](StdioTransport::shutdown)
//! is requested. Dropping the transport sends a best-effort SIGTERM (Unix) or
//! requests a kill (non-Unix).

use std::collections::HashMap;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::{McpherdError, Result};
use crate::framing::LineFramer;
use crate::transport::Transport;

/// Stdio-based transport that drives one child process.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use mcpherd::transport::stdio::StdioTransport;
///
/// # fn main() -> anyhow::Result<()> {
/// let transport = StdioTransport::spawn(
///     "npx",
///     &["-y".into(), "@modelcontextprotocol/server-filesystem".into(), "/tmp".into()],
///     &HashMap::new(),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StdioTransport {
    /// Sender side of the stdin channel; `send()` writes here.
    stdin_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver for reassembled stdout frames.
    stdout_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Asks the supervisor to kill the child.
    kill_tx: mpsc::Sender<()>,
    /// Flips to `true` once the child has been reaped.
    exited: watch::Receiver<bool>,
    /// OS process id, captured at spawn; used by `Drop`.
    pid: Option<u32>,
}

impl StdioTransport {
    /// Spawn a child process and wire up its stdio pipes.
    ///
    /// The child inherits the parent process environment with `env` overlaid
    /// on top. All three stdio handles are piped.
    ///
    /// # Errors
    ///
    /// Returns [`McpherdError::Spawn`] if the executable cannot be started
    /// (missing, not executable) -- no process exists afterwards -- and
    /// [`McpherdError::Transport`] if a stdio pipe is unavailable.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        cmd.envs(env);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpherdError::Spawn {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        // Each handle is guaranteed present because we piped all three above.
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpherdError::Transport("child stdin unavailable after spawn".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            McpherdError::Transport("child stdout unavailable after spawn".into())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            McpherdError::Transport("child stderr unavailable after spawn".into())
        })?;

        let pid = child.id();

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<String>();
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let (exit_tx, exited) = watch::channel(false);

        // Background task: forward stdin_rx -> child stdin, one line each.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                let line = format!("{}\n", msg);
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Background task: raw stdout chunks -> LineFramer -> stdout_tx.
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut framer = LineFramer::new();
            let mut chunk = [0u8; 8192];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for frame in framer.push(&chunk[..n]) {
                            if stdout_tx.send(frame).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        // Background task: child stderr -> debug log. Diagnostic only.
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(
                    target: "mcpherd::transport::stdio",
                    "server stderr: {}",
                    line
                );
            }
        });

        // Supervisor: owns the child, reaps it, publishes the exit flag.
        tokio::spawn(async move {
            let mut child = child;
            let killed = tokio::select! {
                status = child.wait() => {
                    if let Ok(status) = status {
                        tracing::debug!(
                            target: "mcpherd::transport::stdio",
                            "server process exited: {}",
                            status
                        );
                    }
                    false
                }
                _ = kill_rx.recv() => true,
            };
            if killed {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
            exit_tx.send_replace(true);
        });

        Ok(Self {
            stdin_tx,
            stdout_rx: Arc::new(Mutex::new(stdout_rx)),
            kill_tx,
            exited,
            pid,
        })
    }

    /// Whether the child process has been reaped.
    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// OS process id of the child, if it was still alive at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    /// Enqueue a JSON-RPC message for the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`McpherdError::Transport`] if the writer task has exited.
    async fn send(&self, message: String) -> Result<()> {
        self.stdin_tx.send(message).map_err(|e| {
            anyhow::anyhow!(McpherdError::Transport(format!("stdin channel closed: {e}")))
        })
    }

    /// Returns the stream of reassembled frames from the child's stdout.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.stdout_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    fn exit_signal(&self) -> watch::Receiver<bool> {
        self.exited.clone()
    }

    /// Ask the supervisor to kill the child. Fire-and-forget; a second call
    /// while a kill is already queued is a no-op.
    fn shutdown(&self) {
        let _ = self.kill_tx.try_send(());
    }
}

impl Drop for StdioTransport {
    /// Best-effort termination of the child process on drop.
    ///
    /// On Unix, sends SIGTERM to the child PID directly so the signal goes
    /// out even if the runtime is shutting down and the supervisor never
    /// polls again. Elsewhere, falls back to asking the supervisor. MUST NOT
    /// block.
    fn drop(&mut self) {
        if *self.exited.borrow() {
            return;
        }
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // SAFETY: pid was obtained from a child process we spawned.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            return;
        }
        let _ = self.kill_tx.try_send(());
    }
}

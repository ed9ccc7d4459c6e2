//! Newline-delimited frame reassembly
//!
//! The stdio dialect delivers one complete JSON value per line, but the pipe
//! delivers bytes in arbitrary chunks: a single logical message may arrive in
//! many reads, split anywhere, including inside a string literal or in the
//! middle of a multi-byte UTF-8 sequence. [`LineFramer`] owns the carry-over
//! buffer for one connection and turns that chunk stream back into complete
//! messages, in order.
//!
//! The framer does byte-level reassembly only. JSON parsing and envelope
//! validation happen in the read loop (`crate::client`), where a malformed
//! frame is logged and discarded without touching the connection.

use bytes::BytesMut;

/// Reassembles newline-terminated frames from arbitrarily chunked bytes.
///
/// One framer per connection; the buffer holds at most one incomplete
/// fragment between [`push`](LineFramer::push) calls.
///
/// # Examples
///
/// ```
/// use mcpherd::framing::LineFramer;
///
/// let mut framer = LineFramer::new();
/// assert!(framer.push(b"{\"jsonrpc\":\"2.0\",\"i").is_empty());
/// let frames = framer.push(b"d\":42,\"result\":{}}\n");
/// assert_eq!(frames, vec![r#"{"jsonrpc":"2.0","id":42,"result":{}}"#]);
/// ```
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append a chunk and drain every complete frame it unlocks.
    ///
    /// Frames are returned in arrival order with the terminator removed. A
    /// `\r` preceding the terminator is stripped; blank lines are skipped. A
    /// completed line that is not valid UTF-8 is discarded with a warning
    /// rather than tearing anything down.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line = self.buf.split_to(pos + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if line.is_empty() {
                continue;
            }
            match String::from_utf8(line.to_vec()) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    tracing::warn!("discarding {}-byte non-UTF-8 frame: {e}", line.len());
                }
            }
        }
        frames
    }

    /// Number of buffered bytes belonging to a not-yet-terminated frame.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

//! SSE (Server-Sent Events) line decoding
//!
//! This module turns the arbitrary byte chunks delivered by the transport
//! into well-formed text lines. The network gives no framing guarantee: a
//! chunk boundary can fall inside a line, inside a multi-byte UTF-8
//! character, or in the middle of a JSON token. The decoder carries the
//! undecoded remainder across chunks so none of that is observable to the
//! caller.

use bytes::BytesMut;

/// Upper bound on bytes held across chunk boundaries.
///
/// The re-buffer path ([`LineDecoder::unshift`]) would otherwise grow without
/// bound if the upstream never sends a parseable line again. Once the cap is
/// hit the offending line is dropped instead of re-buffered.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Incremental newline-delimited line decoder with one carry-over buffer.
///
/// Lines are split on `\n` at the byte level and only then decoded to text,
/// so a multi-byte character split across chunks is reassembled before any
/// UTF-8 decoding happens. A trailing `\r` is stripped from each line.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Append a raw transport chunk to the carry-over buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extract the next complete line, if one is buffered.
    ///
    /// Returns `None` when no `\n` remains; the partial tail stays buffered
    /// for the next [`push`](Self::push).
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line = self.buffer.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Re-prepend a line whose payload could not be parsed, so it is retried
    /// once more data arrives.
    ///
    /// Returns `false` if the pending bytes would exceed [`MAX_PENDING_BYTES`],
    /// in which case the line is dropped and the buffer left untouched.
    pub fn unshift(&mut self, line: &str) -> bool {
        if self.buffer.len() + line.len() + 1 > MAX_PENDING_BYTES {
            return false;
        }
        let mut restored = BytesMut::with_capacity(line.len() + 1 + self.buffer.len());
        restored.extend_from_slice(line.as_bytes());
        restored.extend_from_slice(b"\n");
        restored.extend_from_slice(&self.buffer);
        self.buffer = restored;
        true
    }

    /// Flush at end-of-stream: split whatever remains on `\n` one final time.
    ///
    /// A trailing fragment without a newline is emitted as-is; whether it is
    /// usable is for the caller to decide (a truncated JSON payload simply
    /// fails to parse and is dropped there).
    pub fn finish(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line() {
            lines.push(line);
        }
        if !self.buffer.is_empty() {
            let mut tail = std::mem::take(&mut self.buffer);
            if tail.last() == Some(&b'\r') {
                tail.truncate(tail.len() - 1);
            }
            lines.push(String::from_utf8_lossy(&tail).into_owned());
        }
        lines
    }

    /// Bytes currently held across chunk boundaries.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

//! Payload framing and outbound buffering.
//!
//! A payload carries no header of its own: its length and sequence travel in
//! the DATA command that precedes it. Reading a payload therefore means
//! reading exactly the announced number of bytes and not one more.

use fios_transport::{Transport, TransportResult};

use crate::frame::{Command, encode_command};

/// Encode a payload for the wire.
///
/// Payloads go out as raw bytes; this exists so both halves of the framing
/// layer have a named entry point.
#[must_use]
pub fn encode_payload(data: &[u8]) -> &[u8] {
    data
}

/// Collects one payload of a known length across polls
#[derive(Debug, Clone)]
pub struct PayloadReader {
    buf: Vec<u8>,
    expected: usize,
}

impl PayloadReader {
    /// Prepare to read `expected` bytes
    #[must_use]
    pub fn new(expected: usize) -> Self {
        Self {
            buf: Vec::with_capacity(expected),
            expected,
        }
    }

    /// Announced length
    #[must_use]
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Bytes received so far
    #[must_use]
    pub fn received(&self) -> usize {
        self.buf.len()
    }

    /// Whether the whole payload has arrived
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.buf.len() == self.expected
    }

    /// Read more of the payload, consuming at most `budget` bytes.
    ///
    /// Returns `Ok(true)` once the payload is complete. A short read is not
    /// an error; the caller polls again later.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a read fails.
    pub fn poll<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        budget: usize,
    ) -> TransportResult<bool> {
        let mut chunk = [0u8; 1024];
        let mut consumed = 0;

        while !self.is_complete() && consumed < budget {
            let want = (self.expected - self.buf.len())
                .min(budget - consumed)
                .min(chunk.len());
            let n = transport.read(&mut chunk[..want])?;
            if n == 0 {
                break;
            }
            self.buf.extend_from_slice(&chunk[..n]);
            consumed += n;
        }

        if !self.is_complete() {
            tracing::trace!("Payload progress: {}/{} bytes", self.buf.len(), self.expected);
        }
        Ok(self.is_complete())
    }

    /// Bytes received so far
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Take the received bytes
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.buf
    }
}

/// Bytes waiting to be written to the transport.
///
/// Frames are appended whole, and partial writes resume where they stopped
/// on the next flush, so frame boundaries survive any write pattern.
#[derive(Debug, Clone, Default)]
pub struct OutboundBuffer {
    buf: Vec<u8>,
    pos: usize,
}

impl OutboundBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command frame
    pub fn push_command(&mut self, command: &Command) {
        tracing::debug!(
            "Queued {} seq={} value={}",
            command.opcode,
            command.sequence,
            command.value
        );
        self.buf.extend_from_slice(&encode_command(command));
    }

    /// Queue payload bytes
    pub fn push_payload(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(encode_payload(data));
    }

    /// Bytes not yet accepted by the transport
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether everything queued has been written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Write as much as the transport accepts without blocking.
    ///
    /// Stops when the buffer drains or the transport accepts nothing.
    /// Returns the number of bytes written by this call.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a write fails; unwritten bytes stay
    /// queued.
    pub fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T) -> TransportResult<usize> {
        let mut written = 0;

        while self.pos < self.buf.len() {
            let n = transport.write(&self.buf[self.pos..])?;
            if n == 0 {
                break;
            }
            self.pos += n;
            written += n;
        }

        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else {
            tracing::trace!("Outbound backlog: {} bytes", self.pending());
        }

        Ok(written)
    }

    /// Drop everything queued
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }
}

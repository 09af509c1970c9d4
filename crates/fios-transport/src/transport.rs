//! Transport trait abstraction for byte-stream backends.
//!
//! This module defines the `Transport` trait that abstracts over the links a
//! FIOS session can run on (a serial port, an in-memory pipe, ...). The
//! protocol engine polls it and never blocks on it: both directions report
//! "nothing right now" as `Ok(0)` instead of waiting.

use std::io;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying device
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The other end of the stream went away
    #[error("Transport is closed")]
    Closed,

    /// Opening the device failed
    #[error("Failed to open device {path}: {source}")]
    OpenFailed {
        /// Device path that could not be opened
        path: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backend is not available on this platform
    #[error("Unsupported on this platform: {0}")]
    Unsupported(&'static str),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Non-blocking duplex byte stream.
///
/// Implementations must never block for long: a read with nothing buffered
/// returns `Ok(0)`, and a write that cannot make progress returns `Ok(0)`.
/// Short reads and short writes are normal and the caller keeps track of
/// frame boundaries.
///
/// # Examples
///
/// ```
/// use fios_transport::{MemoryPipe, Transport};
///
/// let (mut a, mut b) = MemoryPipe::pair();
/// assert_eq!(a.write(b"ok").unwrap(), 2);
///
/// let mut buf = [0u8; 8];
/// let n = b.read(&mut buf).unwrap();
/// assert_eq!(&buf[..n], b"ok");
///
/// // Nothing else queued: the read does not block.
/// assert_eq!(b.read(&mut buf).unwrap(), 0);
/// ```
pub trait Transport {
    /// Read up to `buf.len()` bytes.
    ///
    /// Returns `Ok(0)` when no data is currently available.
    ///
    /// # Errors
    /// Returns `TransportError::Closed` once the stream has ended, or the
    /// underlying I/O error.
    fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize>;

    /// Write up to `buf.len()` bytes.
    ///
    /// Returns the number of bytes accepted, which may be `0` when the
    /// outbound queue is full.
    ///
    /// # Errors
    /// Returns `TransportError::Closed` once the stream has ended, or the
    /// underlying I/O error.
    fn write(&mut self, buf: &[u8]) -> TransportResult<usize>;

    /// Get transport statistics.
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> TransportResult<usize> {
        (**self).write(buf)
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> TransportResult<usize> {
        (**self).write(buf)
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Total bytes written
    pub bytes_sent: u64,
    /// Total bytes read
    pub bytes_received: u64,
    /// Write calls that accepted at least one byte
    pub writes: u64,
    /// Read calls that returned at least one byte
    pub reads: u64,
    /// Write calls that could not make progress
    pub stalled_writes: u64,
}

impl TransportStats {
    /// Create new empty statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a write call
    pub fn record_write(&mut self, bytes: usize) {
        if bytes == 0 {
            self.stalled_writes += 1;
        } else {
            self.bytes_sent += bytes as u64;
            self.writes += 1;
        }
    }

    /// Record the outcome of a read call
    pub fn record_read(&mut self, bytes: usize) {
        if bytes > 0 {
            self.bytes_received += bytes as u64;
            self.reads += 1;
        }
    }
}

//! In-memory duplex transport.
//!
//! Two connected [`MemoryEnd`]s behave like the two sides of a null-modem
//! cable: bytes written on one end are read, in order, on the other. The
//! pipe can be configured to fragment I/O and to bound its queues, which is
//! how the engine's buffering is exercised without real hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::transport::{Transport, TransportError, TransportResult, TransportStats};

/// Pipe behaviour knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeConfig {
    /// Maximum bytes returned by a single `read` call
    pub max_read: usize,
    /// Maximum bytes accepted by a single `write` call
    pub max_write: usize,
    /// Maximum bytes queued in one direction before writes stall
    pub capacity: usize,
}

impl PipeConfig {
    /// Config that moves at most `n` bytes per call in each direction
    #[must_use]
    pub fn fragmented(n: usize) -> Self {
        Self {
            max_read: n,
            max_write: n,
            ..Self::default()
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            max_read: usize::MAX,
            max_write: usize::MAX,
            capacity: 64 * 1024,
        }
    }
}

/// One direction of the pipe
#[derive(Debug, Default)]
struct Channel {
    queue: VecDeque<u8>,
    closed: bool,
}

type SharedChannel = Arc<Mutex<Channel>>;

fn lock(channel: &SharedChannel) -> MutexGuard<'_, Channel> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory for connected in-memory transports
#[derive(Debug, Clone, Copy)]
pub struct MemoryPipe;

impl MemoryPipe {
    /// Create a lossless pipe with default settings
    #[must_use]
    pub fn pair() -> (MemoryEnd, MemoryEnd) {
        Self::with_config(PipeConfig::default())
    }

    /// Create a pipe where both ends use `config`
    #[must_use]
    pub fn with_config(config: PipeConfig) -> (MemoryEnd, MemoryEnd) {
        let a_to_b: SharedChannel = Arc::default();
        let b_to_a: SharedChannel = Arc::default();

        let a = MemoryEnd {
            rx: Arc::clone(&b_to_a),
            tx: Arc::clone(&a_to_b),
            config,
            stats: TransportStats::new(),
        };
        let b = MemoryEnd {
            rx: a_to_b,
            tx: b_to_a,
            config,
            stats: TransportStats::new(),
        };

        (a, b)
    }
}

/// One end of a [`MemoryPipe`]
#[derive(Debug)]
pub struct MemoryEnd {
    rx: SharedChannel,
    tx: SharedChannel,
    config: PipeConfig,
    stats: TransportStats,
}

impl MemoryEnd {
    /// Bytes written by the peer and not yet read on this end
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.rx).queue.len()
    }

    /// Bytes written on this end and not yet read by the peer
    #[must_use]
    pub fn unread_by_peer(&self) -> usize {
        lock(&self.tx).queue.len()
    }

    /// Hang up both directions
    ///
    /// The peer can still drain bytes already queued towards it; after that
    /// its reads report `Closed`.
    pub fn close(&mut self) {
        lock(&self.tx).closed = true;
        lock(&self.rx).closed = true;
    }
}

impl Transport for MemoryEnd {
    fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        let mut channel = lock(&self.rx);

        if channel.queue.is_empty() {
            return if channel.closed {
                Err(TransportError::Closed)
            } else {
                Ok(0)
            };
        }

        let n = buf.len().min(self.config.max_read).min(channel.queue.len());
        for (slot, byte) in buf.iter_mut().zip(channel.queue.drain(..n)) {
            *slot = byte;
        }
        drop(channel);

        self.stats.record_read(n);
        tracing::trace!("memory pipe read {} bytes", n);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> TransportResult<usize> {
        let mut channel = lock(&self.tx);

        if channel.closed {
            return Err(TransportError::Closed);
        }

        let room = self.config.capacity.saturating_sub(channel.queue.len());
        let n = buf.len().min(self.config.max_write).min(room);
        channel.queue.extend(&buf[..n]);
        drop(channel);

        self.stats.record_write(n);
        tracing::trace!("memory pipe wrote {} bytes", n);
        Ok(n)
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

impl Drop for MemoryEnd {
    fn drop(&mut self) {
        self.close();
    }
}

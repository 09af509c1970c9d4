//! Loopback test fixture for integration testing
//!
//! Provides two things:
//! - [`LoopbackFixture`]: a scratch directory with a source file and a
//!   destination path, plus a sender/receiver session pair joined by a
//!   [`MemoryPipe`]
//! - [`ScriptedPeer`]: one raw end of a pipe for tests that play the other
//!   side of the protocol by hand
//!
//! # Example
//!
//! ```no_run
//! use fios_integration_tests::fixtures::{LoopbackFixture, drive};
//! use fios_transport::PipeConfig;
//!
//! let fixture = LoopbackFixture::with_size(20_000).unwrap();
//! let (mut sender, mut receiver) = fixture.sessions(PipeConfig::default()).unwrap();
//! drive(&mut sender, &mut receiver, 10_000).unwrap();
//! assert_eq!(fixture.received().unwrap(), fixture.data());
//! ```

use std::io;
use std::path::{Path, PathBuf};

use fios_core::{Command, CommandReader, Session, SessionBuilder, encode_command};
use fios_transport::{MemoryEnd, MemoryPipe, PipeConfig, Transport};
use rand::RngCore;
use tempfile::TempDir;

/// Deterministic, non-repeating-per-chunk file contents
#[must_use]
pub fn pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Random file contents
#[must_use]
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Poll both sessions until neither has work left.
///
/// Returns the number of rounds, or `None` if `max_rounds` was reached first.
pub fn drive<A: Transport, B: Transport>(
    sender: &mut Session<A>,
    receiver: &mut Session<B>,
    max_rounds: usize,
) -> Option<usize> {
    for round in 1..=max_rounds {
        let sending = sender.idle();
        let receiving = receiver.idle();
        if !sending && !receiving {
            return Some(round);
        }
    }

    tracing::warn!(
        "Sessions still active after {} rounds: sender {:?}, receiver {:?}",
        max_rounds,
        sender.state(),
        receiver.state()
    );
    None
}

/// Scratch directory with one source file and one destination path
pub struct LoopbackFixture {
    dir: TempDir,
    source: PathBuf,
    destination: PathBuf,
    data: Vec<u8>,
}

impl LoopbackFixture {
    /// Create a fixture whose source file holds `data`
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory or file cannot be created.
    pub fn new(data: Vec<u8>) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("source.bin");
        let destination = dir.path().join("received.bin");
        std::fs::write(&source, &data)?;

        Ok(Self {
            dir,
            source,
            destination,
            data,
        })
    }

    /// Create a fixture with `size` bytes of patterned data
    ///
    /// # Errors
    ///
    /// See [`LoopbackFixture::new`].
    pub fn with_size(size: usize) -> io::Result<Self> {
        Self::new(pattern(size))
    }

    /// Scratch directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the file being sent
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Path the receiver writes to
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Contents of the source file
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Contents of the destination file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn received(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.destination)
    }

    /// Sender and receiver with default settings over a pipe using `pipe`
    ///
    /// # Errors
    ///
    /// Returns the session error if either side fails to open.
    pub fn sessions(
        &self,
        pipe: PipeConfig,
    ) -> fios_core::Result<(Session<MemoryEnd>, Session<MemoryEnd>)> {
        self.sessions_with(SessionBuilder::new(), SessionBuilder::new(), pipe)
    }

    /// Sender and receiver built from the given builders
    ///
    /// # Errors
    ///
    /// Returns the session error if either side fails to open.
    pub fn sessions_with(
        &self,
        sender: SessionBuilder,
        receiver: SessionBuilder,
        pipe: PipeConfig,
    ) -> fios_core::Result<(Session<MemoryEnd>, Session<MemoryEnd>)> {
        let (a, b) = MemoryPipe::with_config(pipe);
        let sender = sender.send(a, &self.source)?;
        let receiver = receiver.receive(b, &self.destination)?;
        Ok((sender, receiver))
    }

    /// Receiver session facing a [`ScriptedPeer`] that plays the sender
    ///
    /// # Errors
    ///
    /// Returns the session error if the destination cannot be created.
    pub fn receiver_with_peer(&self) -> fios_core::Result<(Session<MemoryEnd>, ScriptedPeer)> {
        let (a, b) = MemoryPipe::pair();
        let receiver = Session::receive(b, &self.destination)?;
        Ok((receiver, ScriptedPeer::new(a)))
    }

    /// Sender session facing a [`ScriptedPeer`] that plays the receiver
    ///
    /// # Errors
    ///
    /// Returns the session error if the source cannot be opened.
    pub fn sender_with_peer(&self) -> fios_core::Result<(Session<MemoryEnd>, ScriptedPeer)> {
        let (a, b) = MemoryPipe::pair();
        let sender = Session::send(a, &self.source)?;
        Ok((sender, ScriptedPeer::new(b)))
    }
}

/// Hand-driven protocol peer on a raw pipe end
pub struct ScriptedPeer {
    end: MemoryEnd,
    reader: CommandReader,
}

impl ScriptedPeer {
    /// Wrap a pipe end
    #[must_use]
    pub fn new(end: MemoryEnd) -> Self {
        Self {
            end,
            reader: CommandReader::new(),
        }
    }

    /// Write one encoded command
    pub fn send(&mut self, command: Command) {
        self.send_raw(&encode_command(&command));
    }

    /// Write raw bytes, panicking if the pipe does not take them all
    pub fn send_raw(&mut self, bytes: &[u8]) {
        let mut written = 0;
        while written < bytes.len() {
            let n = self.end.write(&bytes[written..]).expect("pipe write");
            assert!(n > 0, "pipe is full");
            written += n;
        }
    }

    /// Read the next complete command, if one has arrived
    pub fn recv(&mut self) -> Option<Command> {
        self.reader.poll(&mut self.end).expect("valid command from session")
    }

    /// Read exactly `len` payload bytes that are already queued
    pub fn recv_payload(&mut self, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.end.read(&mut data[filled..]).expect("pipe read");
            assert!(n > 0, "payload not queued");
            filled += n;
        }
        data
    }

    /// Bytes the session has written that this peer has not read
    #[must_use]
    pub fn pending(&self) -> usize {
        self.end.pending()
    }

    /// Hang up the pipe
    pub fn hang_up(&mut self) {
        self.end.close();
    }
}

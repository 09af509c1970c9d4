//! Session handle and polling façade.
//!
//! A [`Session`] owns one transport, one local file and one
//! [`TransferSession`]. The caller drives it by calling [`Session::idle`]
//! until that returns `false`:
//!
//! ```no_run
//! use fios_core::Session;
//! use fios_transport::{SerialConfig, SerialPort};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let port = SerialPort::open("/dev/ttyACM0", &SerialConfig::default())?;
//! let mut session = Session::send(port, "firmware.bin")?;
//!
//! while session.idle() {
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! session.close();
//!
//! if let Some(err) = session.last_error() {
//!     eprintln!("transfer failed: {err}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Each call to `idle` does a bounded amount of work: it handles at most one
//! inbound frame, queues at most one outbound frame and makes one flush pass.
//! Nothing blocks and nothing is retried; the first real error ends the
//! session.

use std::path::Path;

use fios_files::{FileChunker, FileError, FileSink};
use fios_transport::Transport;

use crate::error::{Error, ProtocolError, Result};
use crate::frame::{Command, CommandReader, Opcode};
use crate::payload::{OutboundBuffer, PayloadReader};
use crate::transfer::{Direction, TransferSession, TransferState};
use crate::{MAX_FILE_SIZE, MAX_PAYLOAD_SIZE};

/// Session tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Largest payload the sender puts in one DATA frame
    pub chunk_size: usize,
    /// Most payload bytes the receiver reads in one poll
    pub read_budget: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_PAYLOAD_SIZE,
            read_budget: MAX_PAYLOAD_SIZE,
        }
    }
}

impl SessionConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the chunk size is zero or above
    /// `MAX_PAYLOAD_SIZE`, or if the read budget is zero.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(Error::Config(format!(
                "chunk_size must be between 1 and {MAX_PAYLOAD_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.read_budget == 0 {
            return Err(Error::Config("read_budget must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Caller-visible classification of a session
#[derive(Debug, Clone, Copy)]
pub enum Status<'a> {
    /// The session failed; carries the recorded error
    Error(&'a Error),
    /// Work remains
    InProgress,
    /// The file was transferred
    Completed,
}

impl Status<'_> {
    /// Numeric status for hosts: Error = 0, InProgress = 1, Completed = 2
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Error(_) => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }

    /// Whether the session has finished, successfully or not
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Builder for sessions with a non-default [`SessionConfig`]
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Start from the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the sender's chunk size
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// Set the receiver's per-poll read budget
    #[must_use]
    pub fn read_budget(mut self, read_budget: usize) -> Self {
        self.config.read_budget = read_budget;
        self
    }

    /// Open a send session for the file at `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration and
    /// `Error::Filesystem` if the file cannot be opened or is larger than
    /// `MAX_FILE_SIZE`.
    pub fn send<T: Transport>(self, transport: T, path: impl AsRef<Path>) -> Result<Session<T>> {
        self.config.validate()?;
        let path = path.as_ref();

        let chunker = FileChunker::open(path, self.config.chunk_size, MAX_FILE_SIZE)?;
        let size = chunker.size();
        tracing::info!("Sending {} ({} bytes)", path.display(), size);

        Ok(Session::new(
            transport,
            LocalFile::Source(chunker),
            TransferSession::new_send(size),
            self.config,
        ))
    }

    /// Open a receive session writing to `path`, truncating any existing file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration and
    /// `Error::Filesystem` if the file cannot be created.
    pub fn receive<T: Transport>(
        self,
        transport: T,
        path: impl AsRef<Path>,
    ) -> Result<Session<T>> {
        self.config.validate()?;
        let path = path.as_ref();

        let sink = FileSink::create(path)?;
        tracing::info!("Receiving into {}", path.display());

        Ok(Session::new(
            transport,
            LocalFile::Sink(sink),
            TransferSession::new_receive(),
            self.config,
        ))
    }
}

#[derive(Debug)]
enum LocalFile {
    Source(FileChunker),
    Sink(FileSink),
}

impl LocalFile {
    fn close(&mut self) -> bool {
        match self {
            Self::Source(chunker) => chunker.close(),
            Self::Sink(sink) => sink.close(),
        }
    }
}

/// Frame written to the transport whose completion changes session state
#[derive(Debug, Clone, Copy)]
enum Pending {
    Start,
    Data { sequence: u32, len: u64 },
    End { sequence: u32 },
    FinalAck,
}

/// Payload announced by a DATA command and not yet fully read
#[derive(Debug)]
struct Incoming {
    sequence: u32,
    reader: PayloadReader,
}

/// One file transfer over one transport
#[derive(Debug)]
pub struct Session<T> {
    transport: T,
    file: LocalFile,
    transfer: TransferSession,
    config: SessionConfig,
    commands: CommandReader,
    incoming: Option<Incoming>,
    outbound: OutboundBuffer,
    pending: Option<Pending>,
    awaiting_ack: Option<u32>,
    chunk: Vec<u8>,
    error: Option<Error>,
    closed: bool,
}

impl<T: Transport> Session<T> {
    /// Open a send session with the default configuration
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::send`].
    pub fn send(transport: T, path: impl AsRef<Path>) -> Result<Self> {
        SessionBuilder::new().send(transport, path)
    }

    /// Open a receive session with the default configuration
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::receive`].
    pub fn receive(transport: T, path: impl AsRef<Path>) -> Result<Self> {
        SessionBuilder::new().receive(transport, path)
    }

    fn new(transport: T, file: LocalFile, transfer: TransferSession, config: SessionConfig) -> Self {
        Self {
            transport,
            file,
            transfer,
            config,
            commands: CommandReader::new(),
            incoming: None,
            outbound: OutboundBuffer::new(),
            pending: None,
            awaiting_ack: None,
            chunk: Vec::with_capacity(config.chunk_size),
            error: None,
            closed: false,
        }
    }

    /// Advance the transfer by one bounded step.
    ///
    /// Returns `true` while work remains and `false` once the session has
    /// completed, failed or been closed. Calling it again after that is a
    /// no-op.
    pub fn idle(&mut self) -> bool {
        if self.closed || !self.transfer.is_active() {
            return false;
        }

        let result = match self.transfer.direction() {
            Direction::Send => self.poll_send(),
            Direction::Receive => self.poll_receive(),
        };
        if let Err(err) = result {
            self.fail(err);
        }

        self.transfer.is_active()
    }

    /// [`idle`](Self::idle), then write the current progress to `progress`
    pub fn idle_with_progress(&mut self, progress: &mut f32) -> bool {
        let more = self.idle();
        *progress = self.progress();
        more
    }

    /// Get transfer progress (0.0 to 1.0)
    #[must_use]
    pub fn progress(&self) -> f32 {
        self.transfer.progress()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> Status<'_> {
        if let Some(err) = &self.error {
            Status::Error(err)
        } else if self.transfer.state() == TransferState::Completed {
            Status::Completed
        } else {
            Status::InProgress
        }
    }

    /// Error that ended the session, if it failed
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Bytes transferred so far
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.transfer.bytes_transferred()
    }

    /// Declared file size; unknown to a receiver until START arrives
    #[must_use]
    pub fn total_size(&self) -> Option<u64> {
        self.transfer.declared_size()
    }

    /// Transfer direction
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.transfer.direction()
    }

    /// Protocol state
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.transfer.state()
    }

    /// Transfer counters and timing
    #[must_use]
    pub fn transfer(&self) -> &TransferSession {
        &self.transfer
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Underlying transport
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the local file.
    ///
    /// Idempotent. A session still in progress becomes failed with
    /// [`Error::Cancelled`]; the peer is not notified and the transport is
    /// left untouched.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.transfer.is_active() {
            tracing::warn!(
                "{:?} session closed in state {:?} after {} bytes",
                self.transfer.direction(),
                self.transfer.state(),
                self.transfer.bytes_transferred()
            );
            self.transfer.fail();
            self.error = Some(Error::Cancelled);
        }

        self.file.close();
        self.incoming = None;
        self.pending = None;
        self.outbound.clear();
    }

    /// Give back the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn poll_send(&mut self) -> Result<()> {
        if self.transfer.state() == TransferState::Idle {
            let size = self.transfer.declared_size().unwrap_or(0);
            self.outbound.push_command(&Command::start(size));
            self.pending = Some(Pending::Start);
            self.transfer.transition_to(TransferState::AwaitingPeerReady)?;
        } else {
            if let Some(command) = self.commands.poll(&mut self.transport)? {
                self.on_sender_command(command)?;
            }
            if self.ready_for_next_frame() {
                self.queue_next_frame()?;
            }
        }

        self.flush()
    }

    fn ready_for_next_frame(&self) -> bool {
        self.transfer.state() == TransferState::Transferring
            && self.pending.is_none()
            && self.awaiting_ack.is_none()
            && self.outbound.is_empty()
    }

    fn on_sender_command(&mut self, command: Command) -> Result<()> {
        let state = self.transfer.state();

        if command.opcode.is_failure() {
            return Err(peer_error(command));
        }
        let expected = match (command.opcode, self.awaiting_ack) {
            (Opcode::Ack, Some(expected)) => expected,
            (opcode, _) => return Err(ProtocolError::UnexpectedCommand { opcode, state }.into()),
        };
        if command.sequence != expected {
            return Err(ProtocolError::SequenceMismatch {
                expected,
                actual: command.sequence,
            }
            .into());
        }
        self.awaiting_ack = None;

        match state {
            TransferState::AwaitingPeerReady => {
                self.transfer.transition_to(TransferState::Transferring)?;
            }
            TransferState::Finalizing => self.complete()?,
            _ => {}
        }
        Ok(())
    }

    fn queue_next_frame(&mut self) -> Result<()> {
        let sequence = self.transfer.next_sequence()?;

        if self.transfer.remaining() == 0 {
            let total = self.transfer.bytes_transferred();
            self.outbound.push_command(&Command::end(sequence, total));
            self.pending = Some(Pending::End { sequence });
            return Ok(self.transfer.transition_to(TransferState::Finalizing)?);
        }

        let LocalFile::Source(chunker) = &mut self.file else {
            return Err(FileError::Closed.into());
        };
        // A file that shrank surfaces as `Truncated` from the chunker.
        let len = chunker.read_chunk(&mut self.chunk)?;
        debug_assert!(len > 0, "chunker drained before the declared size");

        self.outbound.push_command(&Command::data(sequence, len));
        self.outbound.push_payload(&self.chunk);
        self.pending = Some(Pending::Data {
            sequence,
            len: len as u64,
        });
        Ok(())
    }

    fn poll_receive(&mut self) -> Result<()> {
        if matches!(
            self.transfer.state(),
            TransferState::Idle | TransferState::Transferring
        ) {
            self.receive_inbound()?;
        }

        self.flush()
    }

    fn receive_inbound(&mut self) -> Result<()> {
        if self.incoming.is_none() {
            let Some(command) = self.commands.poll(&mut self.transport)? else {
                return Ok(());
            };
            self.on_receiver_command(command)?;
        }

        let complete = match self.incoming.as_mut() {
            Some(incoming) => incoming
                .reader
                .poll(&mut self.transport, self.config.read_budget)?,
            None => false,
        };
        if complete {
            if let Some(incoming) = self.incoming.take() {
                self.accept_payload(incoming)?;
            }
        }
        Ok(())
    }

    fn on_receiver_command(&mut self, command: Command) -> Result<()> {
        let state = self.transfer.state();

        match (state, command.opcode) {
            (_, Opcode::Nack | Opcode::Error) => Err(peer_error(command)),

            (TransferState::Idle, Opcode::Start) => {
                if command.sequence != 0 {
                    return Err(ProtocolError::SequenceMismatch {
                        expected: 0,
                        actual: command.sequence,
                    }
                    .into());
                }
                self.transfer.accept_declared_size(command.value)?;
                tracing::info!("Peer announced {} bytes", command.value);

                self.outbound.push_command(&Command::ack(0));
                Ok(self.transfer.transition_to(TransferState::Transferring)?)
            }

            (TransferState::Transferring, Opcode::Data) => {
                self.transfer.check_chunk(command.sequence, command.value)?;
                // The decoder caps DATA lengths at MAX_PAYLOAD_SIZE.
                let len = command.value as usize;
                self.incoming = Some(Incoming {
                    sequence: command.sequence,
                    reader: PayloadReader::new(len),
                });
                Ok(())
            }

            (TransferState::Transferring, Opcode::End) => {
                self.transfer.check_end(command.sequence, command.value)?;
                self.sink()?.sync()?;

                self.outbound.push_command(&Command::ack(command.sequence));
                self.pending = Some(Pending::FinalAck);
                Ok(self.transfer.transition_to(TransferState::Finalizing)?)
            }

            (state, opcode) => Err(ProtocolError::UnexpectedCommand { opcode, state }.into()),
        }
    }

    fn accept_payload(&mut self, incoming: Incoming) -> Result<()> {
        let data = incoming.reader.into_data();
        self.sink()?.write_chunk(&data)?;
        self.transfer
            .record_chunk(incoming.sequence, data.len() as u64)?;

        self.outbound.push_command(&Command::ack(incoming.sequence));
        Ok(())
    }

    fn sink(&mut self) -> Result<&mut FileSink> {
        match &mut self.file {
            LocalFile::Sink(sink) => Ok(sink),
            LocalFile::Source(_) => Err(FileError::Closed.into()),
        }
    }

    /// Write queued bytes and apply whatever the finished write unlocks.
    fn flush(&mut self) -> Result<()> {
        self.outbound.flush(&mut self.transport)?;
        if !self.outbound.is_empty() {
            return Ok(());
        }

        match self.pending.take() {
            Some(Pending::Start) => self.awaiting_ack = Some(0),
            Some(Pending::Data { sequence, len }) => {
                self.transfer.record_chunk(sequence, len)?;
                self.awaiting_ack = Some(sequence);
            }
            Some(Pending::End { sequence }) => self.awaiting_ack = Some(sequence),
            Some(Pending::FinalAck) => self.complete()?,
            None => {}
        }
        Ok(())
    }

    fn complete(&mut self) -> Result<()> {
        self.transfer.transition_to(TransferState::Completed)?;
        tracing::info!(
            "{:?} complete: {} bytes in {:.2?}",
            self.transfer.direction(),
            self.transfer.bytes_transferred(),
            self.transfer.elapsed().unwrap_or_default()
        );
        Ok(())
    }

    fn fail(&mut self, err: Error) {
        let state = self.transfer.state();
        tracing::error!(
            "{:?} session failed in state {:?}: {}",
            self.transfer.direction(),
            state,
            err
        );

        if let Some(reply) = self.failure_reply(&err, state) {
            self.outbound.push_command(&reply);
            if let Err(e) = self.outbound.flush(&mut self.transport) {
                tracing::warn!("Could not send {} to peer: {}", reply.opcode, e);
            }
        }

        self.incoming = None;
        self.pending = None;
        self.awaiting_ack = None;
        self.transfer.fail();
        self.error = Some(err);
    }

    /// Frame that tells the peer why this side gave up.
    ///
    /// A receiver rejecting an inbound frame answers NACK; every other local
    /// failure is reported with ERROR. Transport failures and peer-reported
    /// errors get no reply.
    fn failure_reply(&self, err: &Error, state: TransferState) -> Option<Command> {
        match err {
            Error::Transport(_) | Error::Peer { .. } | Error::Cancelled => None,
            Error::Frame(_) | Error::Protocol(_)
                if self.transfer.direction() == Direction::Receive =>
            {
                let sequence = if state == TransferState::Idle {
                    0
                } else {
                    self.transfer.sequence().saturating_add(1)
                };
                Some(Command::nack(sequence, err.code()))
            }
            _ => Some(Command::error(self.transfer.sequence(), err.code())),
        }
    }
}

fn peer_error(command: Command) -> Error {
    Error::Peer {
        opcode: command.opcode,
        code: command.value,
    }
}

//! Transfer session state machine.

use std::time::{Duration, Instant};

use crate::error::ProtocolError;

/// Transfer session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Nothing exchanged yet
    Idle,
    /// START sent, waiting for the peer to accept it (send side only)
    AwaitingPeerReady,
    /// Exchanging DATA frames
    Transferring,
    /// END exchanged, waiting for its acknowledgment to settle
    Finalizing,
    /// Transfer complete
    Completed,
    /// Transfer failed
    Failed,
}

impl TransferState {
    /// Whether no further transitions are possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sending file
    Send,
    /// Receiving file
    Receive,
}

/// Counters and state of one transfer.
///
/// The declared size is known up front when sending and learned from START
/// when receiving. `bytes_transferred` never exceeds it, and the sequence
/// counter moves by exactly one per DATA frame.
#[derive(Debug, Clone)]
pub struct TransferSession {
    direction: Direction,
    state: TransferState,
    declared_size: Option<u64>,
    bytes_transferred: u64,
    sequence: u32,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
}

impl TransferSession {
    /// Create a send session for a file of `file_size` bytes
    #[must_use]
    pub fn new_send(file_size: u64) -> Self {
        Self {
            declared_size: Some(file_size),
            ..Self::new(Direction::Send)
        }
    }

    /// Create a receive session; the size arrives with START
    #[must_use]
    pub fn new_receive() -> Self {
        Self::new(Direction::Receive)
    }

    fn new(direction: Direction) -> Self {
        Self {
            direction,
            state: TransferState::Idle,
            declared_size: None,
            bytes_transferred: 0,
            sequence: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Transfer direction
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Declared total size, once known
    #[must_use]
    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    /// Bytes transferred so far
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Bytes left before the declared size is reached
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.declared_size.unwrap_or(0) - self.bytes_transferred
    }

    /// Sequence of the last DATA frame exchanged (0 before the first)
    #[must_use]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Sequence the next DATA or END frame must carry
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::SequenceExhausted` if the counter would wrap.
    pub fn next_sequence(&self) -> Result<u32, ProtocolError> {
        self.sequence
            .checked_add(1)
            .ok_or(ProtocolError::SequenceExhausted)
    }

    /// Whether the session still has work to do
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Get transfer progress (0.0 to 1.0)
    ///
    /// Zero until the size is known, exactly one once completed.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.state == TransferState::Completed {
            return 1.0;
        }
        match self.declared_size {
            Some(size) if size > 0 => {
                let fraction = self.bytes_transferred as f64 / size as f64;
                fraction.min(1.0) as f32
            }
            _ => 0.0,
        }
    }

    /// Time since the first frame was exchanged
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.started_at?;
        Some(self.completed_at.map_or_else(|| start.elapsed(), |end| end - start))
    }

    /// Average throughput in bytes/sec
    #[must_use]
    pub fn speed(&self) -> Option<f64> {
        self.elapsed().map(|elapsed| {
            let secs = elapsed.as_secs_f64();
            if secs > 0.0 {
                self.bytes_transferred as f64 / secs
            } else {
                0.0
            }
        })
    }

    /// Check if a state transition is valid
    #[must_use]
    pub fn can_transition(&self, to: TransferState) -> bool {
        use TransferState::{AwaitingPeerReady, Completed, Failed, Finalizing, Idle, Transferring};

        match (self.direction, self.state, to) {
            // Any live state may fail
            (_, from, Failed) => !from.is_terminal(),

            (Direction::Send, Idle, AwaitingPeerReady) => true,
            (Direction::Send, AwaitingPeerReady, Transferring) => true,

            // The receiver answers START directly
            (Direction::Receive, Idle, Transferring) => true,

            (_, Transferring, Finalizing) => true,
            (_, Finalizing, Completed) => true,

            _ => false,
        }
    }

    /// Transition to a new state
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidTransition` if the transition is not
    /// allowed from the current state.
    pub fn transition_to(&mut self, new_state: TransferState) -> Result<(), ProtocolError> {
        if !self.can_transition(new_state) {
            return Err(ProtocolError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let old_state = self.state;
        self.state = new_state;

        match new_state {
            TransferState::AwaitingPeerReady | TransferState::Transferring => {
                if self.started_at.is_none() {
                    self.started_at = Some(Instant::now());
                }
            }
            TransferState::Completed | TransferState::Failed => {
                self.completed_at = Some(Instant::now());
            }
            _ => {}
        }

        tracing::debug!(
            "Transfer state transition ({:?}): {:?} -> {:?}",
            self.direction,
            old_state,
            new_state
        );

        Ok(())
    }

    /// Move to `Failed` unless already terminal
    pub fn fail(&mut self) {
        if self.is_active() {
            let _ = self.transition_to(TransferState::Failed);
        }
    }

    /// Record the size announced by the peer's START
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidTransition` if called outside `Idle`
    /// on a receive session.
    pub fn accept_declared_size(&mut self, size: u64) -> Result<(), ProtocolError> {
        if self.direction != Direction::Receive || self.state != TransferState::Idle {
            return Err(ProtocolError::InvalidTransition {
                from: self.state,
                to: TransferState::Transferring,
            });
        }
        self.declared_size = Some(size);
        Ok(())
    }

    /// Check that a DATA frame with `sequence` and `len` would be accepted
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::SequenceMismatch` if `sequence` is not the
    /// next one, or `ProtocolError::SizeOverflow` if `len` more bytes would
    /// exceed the declared size.
    pub fn check_chunk(&self, sequence: u32, len: u64) -> Result<(), ProtocolError> {
        let expected = self.next_sequence()?;
        if sequence != expected {
            return Err(ProtocolError::SequenceMismatch {
                expected,
                actual: sequence,
            });
        }

        let declared = self.declared_size.unwrap_or(0);
        let attempted = self.bytes_transferred.saturating_add(len);
        if attempted > declared {
            return Err(ProtocolError::SizeOverflow {
                declared,
                attempted,
            });
        }

        Ok(())
    }

    /// Account for one DATA frame that has been fully exchanged
    ///
    /// # Errors
    ///
    /// Same conditions as [`check_chunk`](Self::check_chunk).
    pub fn record_chunk(&mut self, sequence: u32, len: u64) -> Result<(), ProtocolError> {
        self.check_chunk(sequence, len)?;
        self.sequence = sequence;
        self.bytes_transferred += len;

        tracing::trace!(
            "Chunk {} recorded: {}/{} bytes",
            sequence,
            self.bytes_transferred,
            self.declared_size.unwrap_or(0)
        );
        Ok(())
    }

    /// Check the sequence and total carried by END
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::SequenceMismatch` for a wrong sequence and
    /// `ProtocolError::SizeMismatch` if `total` disagrees with what was
    /// received or declared.
    pub fn check_end(&self, sequence: u32, total: u64) -> Result<(), ProtocolError> {
        let expected = self.next_sequence()?;
        if sequence != expected {
            return Err(ProtocolError::SequenceMismatch {
                expected,
                actual: sequence,
            });
        }

        let declared = self.declared_size.unwrap_or(0);
        if total != self.bytes_transferred || total != declared {
            return Err(ProtocolError::SizeMismatch {
                declared,
                received: self.bytes_transferred,
                reported: total,
            });
        }

        Ok(())
    }
}

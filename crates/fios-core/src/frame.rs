//! Command frame encoding and decoding.
//!
//! Every control message is exactly [`CMD_SIZE`] bytes, so a receiver always
//! knows how much to read next. All multi-byte fields are big-endian.
//!
//! ```text
//!  0        1               4               8                              16
//! +--------+---------------+---------------+-------------------------------+
//! | opcode |   reserved    |   sequence    |             value             |
//! +--------+---------------+---------------+-------------------------------+
//! ```

use std::fmt;

use fios_transport::Transport;

use crate::error::{Error, FrameError, LimitField};
use crate::{CMD_SIZE, MAX_FILE_SIZE, MAX_PAYLOAD_SIZE};

/// Command opcodes.
///
/// Values are printable ASCII so a line sniffer shows readable traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Announce a transfer; value is the file size
    Start = b's',
    /// Announce a payload; value is its length
    Data = b'w',
    /// Acknowledge the frame with the given sequence
    Ack = b'k',
    /// Reject the frame with the given sequence; value is an error code
    Nack = b'n',
    /// Finish the transfer; value is the total byte count
    End = b'q',
    /// Abort the transfer; value is an error code
    Error = b'e',
}

impl Opcode {
    /// Whether this opcode reports a failure
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Nack | Self::Error)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::End => "END",
            Self::Error => "ERROR",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            b's' => Ok(Self::Start),
            b'w' => Ok(Self::Data),
            b'k' => Ok(Self::Ack),
            b'n' => Ok(Self::Nack),
            b'q' => Ok(Self::End),
            b'e' => Ok(Self::Error),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Command opcode
    pub opcode: Opcode,
    /// Frame sequence number
    pub sequence: u32,
    /// Opcode-specific value (size, length or error code)
    pub value: u64,
}

impl Command {
    /// Create a command from its parts
    #[must_use]
    pub const fn new(opcode: Opcode, sequence: u32, value: u64) -> Self {
        Self {
            opcode,
            sequence,
            value,
        }
    }

    /// START announcing a file of `size` bytes
    #[must_use]
    pub const fn start(size: u64) -> Self {
        Self::new(Opcode::Start, 0, size)
    }

    /// DATA announcing `len` payload bytes
    #[must_use]
    pub const fn data(sequence: u32, len: usize) -> Self {
        Self::new(Opcode::Data, sequence, len as u64)
    }

    /// ACK for `sequence`
    #[must_use]
    pub const fn ack(sequence: u32) -> Self {
        Self::new(Opcode::Ack, sequence, 0)
    }

    /// NACK for `sequence` with an error code
    #[must_use]
    pub const fn nack(sequence: u32, code: u64) -> Self {
        Self::new(Opcode::Nack, sequence, code)
    }

    /// END after `total` bytes
    #[must_use]
    pub const fn end(sequence: u32, total: u64) -> Self {
        Self::new(Opcode::End, sequence, total)
    }

    /// ERROR with an error code
    #[must_use]
    pub const fn error(sequence: u32, code: u64) -> Self {
        Self::new(Opcode::Error, sequence, code)
    }

    /// Encode to wire format
    #[must_use]
    pub fn encode(&self) -> [u8; CMD_SIZE] {
        encode_command(self)
    }

    /// Decode from wire format
    ///
    /// # Errors
    ///
    /// See [`decode_command`].
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        decode_command(data)
    }
}

/// Encode a command into its fixed-size wire form.
///
/// Reserved bytes are always zero.
#[must_use]
pub fn encode_command(command: &Command) -> [u8; CMD_SIZE] {
    let mut buf = [0u8; CMD_SIZE];
    buf[0] = command.opcode as u8;
    buf[4..8].copy_from_slice(&command.sequence.to_be_bytes());
    buf[8..16].copy_from_slice(&command.value.to_be_bytes());
    buf
}

/// Decode a command from the first [`CMD_SIZE`] bytes of `data`.
///
/// Reserved bytes are ignored. Bytes past `CMD_SIZE` are ignored.
///
/// # Errors
///
/// - `FrameError::Truncated` if `data` is shorter than `CMD_SIZE`
/// - `FrameError::UnknownOpcode` for an unrecognised opcode byte
/// - `FrameError::LimitExceeded` if START declares more than
///   `MAX_FILE_SIZE` bytes or DATA announces more than `MAX_PAYLOAD_SIZE`
pub fn decode_command(data: &[u8]) -> Result<Command, FrameError> {
    if data.len() < CMD_SIZE {
        return Err(FrameError::Truncated {
            expected: CMD_SIZE,
            actual: data.len(),
        });
    }

    let opcode = Opcode::try_from(data[0])?;
    let sequence = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let value = u64::from_be_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    let limit = match opcode {
        Opcode::Start => Some((LimitField::FileSize, MAX_FILE_SIZE)),
        Opcode::Data => Some((LimitField::PayloadLength, MAX_PAYLOAD_SIZE as u64)),
        _ => None,
    };
    if let Some((field, limit)) = limit {
        if value > limit {
            return Err(FrameError::LimitExceeded {
                field,
                value,
                limit,
            });
        }
    }

    Ok(Command {
        opcode,
        sequence,
        value,
    })
}

/// Accumulates one command across polls.
///
/// Reads never go past the end of the current frame, so whatever follows
/// (a payload, the next command) stays in the transport for its own reader.
#[derive(Debug, Clone)]
pub struct CommandReader {
    buf: [u8; CMD_SIZE],
    filled: usize,
}

impl CommandReader {
    /// Create an empty reader
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: [0u8; CMD_SIZE],
            filled: 0,
        }
    }

    /// Bytes of the current frame received so far
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.filled
    }

    /// Try to complete a command.
    ///
    /// Returns `Ok(None)` when the transport has no more bytes right now; the
    /// partial frame is kept for the next call.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the transport fails and `Error::Frame`
    /// if the completed frame does not decode. Either way the reader is
    /// reset.
    pub fn poll<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<Option<Command>, Error> {
        while self.filled < CMD_SIZE {
            let n = match transport.read(&mut self.buf[self.filled..]) {
                Ok(n) => n,
                Err(e) => {
                    self.filled = 0;
                    return Err(e.into());
                }
            };
            if n == 0 {
                if self.filled > 0 {
                    tracing::trace!("Partial command: {}/{} bytes", self.filled, CMD_SIZE);
                }
                return Ok(None);
            }
            self.filled += n;
        }

        self.filled = 0;
        let command = decode_command(&self.buf).inspect_err(|e| {
            tracing::warn!("Rejected command frame {:02x?}: {}", self.buf, e);
        })?;

        tracing::debug!(
            "Received {} seq={} value={}",
            command.opcode,
            command.sequence,
            command.value
        );
        Ok(Some(command))
    }
}

impl Default for CommandReader {
    fn default() -> Self {
        Self::new()
    }
}

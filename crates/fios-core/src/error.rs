//! Error types for the FIOS protocol engine.
//!
//! Every error is terminal for the session that produced it. Conditions
//! that only mean "not yet" (a half-received command, a transport with no
//! room) never become errors; the session simply yields until the next poll.

use std::fmt;

use fios_files::FileError;
use fios_transport::TransportError;
use thiserror::Error;

use crate::frame::Opcode;
use crate::transfer::TransferState;

/// Result type for the protocol engine
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// The byte stream failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A malformed or oversized frame was received
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Local file I/O failed
    #[error("filesystem error: {0}")]
    Filesystem(#[from] FileError),

    /// The peer violated the transfer protocol
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer sent NACK or ERROR
    #[error("peer sent {opcode} with code {code} ({})", describe_code(.code))]
    Peer {
        /// `Nack` or `Error`
        opcode: Opcode,
        /// Error code supplied by the peer
        code: u64,
    },

    /// The session was closed before it finished
    #[error("transfer cancelled")]
    Cancelled,

    /// Invalid session configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Numeric code carried in outgoing ERROR and NACK frames.
    ///
    /// Peer errors pass the peer's own code through unchanged.
    #[must_use]
    pub fn code(&self) -> u64 {
        let code = match self {
            Self::Transport(_) => ErrorCode::Transport,
            Self::Frame(FrameError::UnknownOpcode(_)) => ErrorCode::UnknownOpcode,
            Self::Frame(FrameError::LimitExceeded {
                field: LimitField::FileSize,
                ..
            }) => ErrorCode::FileTooLarge,
            Self::Frame(FrameError::LimitExceeded {
                field: LimitField::PayloadLength,
                ..
            }) => ErrorCode::PayloadTooLarge,
            Self::Frame(_) => ErrorCode::Frame,
            Self::Filesystem(FileError::TooLarge { .. }) => ErrorCode::FileTooLarge,
            Self::Filesystem(_) => ErrorCode::Filesystem,
            Self::Protocol(ProtocolError::SequenceMismatch { .. }) => ErrorCode::SequenceMismatch,
            Self::Protocol(ProtocolError::SizeMismatch { .. }) => ErrorCode::SizeMismatch,
            Self::Protocol(ProtocolError::SizeOverflow { .. }) => ErrorCode::SizeOverflow,
            Self::Protocol(ProtocolError::UnexpectedCommand { .. }) => {
                ErrorCode::UnexpectedCommand
            }
            Self::Protocol(_) | Self::Config(_) => ErrorCode::Protocol,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Peer { code, .. } => return *code,
        };
        code.as_u64()
    }

    /// Whether this error was reported by the peer rather than detected locally
    #[must_use]
    pub fn is_peer(&self) -> bool {
        matches!(self, Self::Peer { .. })
    }
}

/// Frame-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer than `CMD_SIZE` bytes were supplied
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Required size
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Opcode byte is not a known command
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// A numeric field is above its protocol maximum
    #[error("{field} {value} exceeds limit {limit}")]
    LimitExceeded {
        /// Which field was out of range
        field: LimitField,
        /// Value received
        value: u64,
        /// Protocol maximum
        limit: u64,
    },
}

/// Fields with a protocol-defined upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitField {
    /// Declared file size in START
    FileSize,
    /// Announced payload length in DATA
    PayloadLength,
}

impl fmt::Display for LimitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileSize => write!(f, "file size"),
            Self::PayloadLength => write!(f, "payload length"),
        }
    }
}

/// Transfer protocol violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A frame carried the wrong sequence number
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Next sequence the session would accept
        expected: u32,
        /// Sequence on the wire
        actual: u32,
    },

    /// A payload would push the transfer past its declared size
    #[error("payload overflows declared size: {attempted} > {declared}")]
    SizeOverflow {
        /// Declared total size
        declared: u64,
        /// Bytes the transfer would reach
        attempted: u64,
    },

    /// END reported a total that does not match what was received
    #[error("size mismatch: declared {declared}, received {received}, peer reported {reported}")]
    SizeMismatch {
        /// Declared total size from START
        declared: u64,
        /// Bytes actually received
        received: u64,
        /// Total carried by END
        reported: u64,
    },

    /// A valid command arrived in a state that does not expect it
    #[error("unexpected {opcode} in state {state:?}")]
    UnexpectedCommand {
        /// Command received
        opcode: Opcode,
        /// State at the time
        state: TransferState,
    },

    /// Internal state transition not allowed
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state
        from: TransferState,
        /// Requested state
        to: TransferState,
    },

    /// The 32-bit sequence space ran out
    #[error("sequence numbers exhausted")]
    SequenceExhausted,
}

/// Error codes carried in ERROR and NACK frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum ErrorCode {
    /// Transport failure
    Transport = 1,
    /// Malformed frame
    Frame = 2,
    /// Local file I/O failure
    Filesystem = 3,
    /// Generic protocol violation
    Protocol = 4,
    /// File larger than `MAX_FILE_SIZE`
    FileTooLarge = 5,
    /// Payload larger than `MAX_PAYLOAD_SIZE`
    PayloadTooLarge = 6,
    /// Out-of-order or duplicate sequence
    SequenceMismatch = 7,
    /// END total does not match
    SizeMismatch = 8,
    /// Unrecognised opcode
    UnknownOpcode = 9,
    /// Local cancellation
    Cancelled = 10,
    /// Command not valid in the current state
    UnexpectedCommand = 11,
    /// Payload beyond the declared size
    SizeOverflow = 12,
}

impl ErrorCode {
    /// Wire value
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }

    /// Look up a known code
    #[must_use]
    pub fn from_u64(code: u64) -> Option<Self> {
        let code = match code {
            1 => Self::Transport,
            2 => Self::Frame,
            3 => Self::Filesystem,
            4 => Self::Protocol,
            5 => Self::FileTooLarge,
            6 => Self::PayloadTooLarge,
            7 => Self::SequenceMismatch,
            8 => Self::SizeMismatch,
            9 => Self::UnknownOpcode,
            10 => Self::Cancelled,
            11 => Self::UnexpectedCommand,
            12 => Self::SizeOverflow,
            _ => return None,
        };
        Some(code)
    }

    /// Short description of a raw code, `"unknown"` for codes outside the table
    #[must_use]
    pub fn describe(code: u64) -> &'static str {
        Self::from_u64(code).map_or("unknown", Self::as_str)
    }

    /// Short description
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport failure",
            Self::Frame => "malformed frame",
            Self::Filesystem => "filesystem failure",
            Self::Protocol => "protocol violation",
            Self::FileTooLarge => "file too large",
            Self::PayloadTooLarge => "payload too large",
            Self::SequenceMismatch => "sequence mismatch",
            Self::SizeMismatch => "size mismatch",
            Self::UnknownOpcode => "unknown opcode",
            Self::Cancelled => "cancelled",
            Self::UnexpectedCommand => "unexpected command",
            Self::SizeOverflow => "size overflow",
        }
    }
}

fn describe_code(code: &u64) -> &'static str {
    ErrorCode::describe(*code)
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Transport(TransportError::Closed).code(), 1);
        assert_eq!(
            Error::Frame(FrameError::Truncated {
                expected: 16,
                actual: 3
            })
            .code(),
            2
        );
        assert_eq!(Error::Frame(FrameError::UnknownOpcode(b'z')).code(), 9);
        assert_eq!(
            Error::Frame(FrameError::LimitExceeded {
                field: LimitField::FileSize,
                value: 1 << 40,
                limit: 0x7fff_ffff,
            })
            .code(),
            5
        );
        assert_eq!(
            Error::Frame(FrameError::LimitExceeded {
                field: LimitField::PayloadLength,
                value: 0x2001,
                limit: 0x2000,
            })
            .code(),
            6
        );
        assert_eq!(Error::Filesystem(FileError::Closed).code(), 3);
        assert_eq!(
            Error::Filesystem(FileError::TooLarge {
                path: PathBuf::from("big"),
                size: 2,
                limit: 1,
            })
            .code(),
            5
        );
        assert_eq!(
            Error::Protocol(ProtocolError::SequenceMismatch {
                expected: 2,
                actual: 1
            })
            .code(),
            7
        );
        assert_eq!(
            Error::Protocol(ProtocolError::SizeMismatch {
                declared: 1,
                received: 1,
                reported: 2,
            })
            .code(),
            8
        );
        assert_eq!(
            Error::Protocol(ProtocolError::SizeOverflow {
                declared: 1,
                attempted: 2,
            })
            .code(),
            12
        );
        assert_eq!(
            Error::Protocol(ProtocolError::UnexpectedCommand {
                opcode: Opcode::Data,
                state: TransferState::Idle,
            })
            .code(),
            11
        );
        assert_eq!(Error::Protocol(ProtocolError::SequenceExhausted).code(), 4);
        assert_eq!(Error::Cancelled.code(), 10);
    }

    #[test]
    fn test_peer_code_passthrough() {
        let err = Error::Peer {
            opcode: Opcode::Nack,
            code: 4242,
        };
        assert_eq!(err.code(), 4242);
        assert!(err.is_peer());
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn test_error_code_table_roundtrip() {
        for raw in 1..=12 {
            let code = ErrorCode::from_u64(raw).unwrap();
            assert_eq!(code.as_u64(), raw);
        }
        assert_eq!(ErrorCode::from_u64(0), None);
        assert_eq!(ErrorCode::from_u64(13), None);
    }

    #[test]
    fn test_error_display() {
        let err = Error::Peer {
            opcode: Opcode::Error,
            code: 7,
        };
        assert_eq!(
            err.to_string(),
            "peer sent ERROR with code 7 (sequence mismatch)"
        );

        let err = Error::Frame(FrameError::LimitExceeded {
            field: LimitField::PayloadLength,
            value: 9000,
            limit: 8192,
        });
        assert_eq!(
            err.to_string(),
            "frame error: payload length 9000 exceeds limit 8192"
        );
    }
}

//! # FIOS Core
//!
//! Protocol engine for FIOS (File Input/Output over Serial): a reliable,
//! single-file, single-direction transfer over a raw byte stream with no
//! framing or flow control of its own.
//!
//! This crate provides:
//! - Fixed-size command frames ([`frame`])
//! - Length-announced payload frames and outbound buffering ([`payload`])
//! - The transfer state machine ([`transfer`])
//! - The polling session handle ([`Session`])
//! - Error types and wire error codes ([`error`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Session                                  │
//! │   (owns transport + local file, driven by idle())               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     TransferSession                              │
//! │   (state graph, sequence counter, byte accounting)              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │              Command frames  /  Payload frames                   │
//! │   (16-byte control messages, raw data announced by DATA)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exchange
//!
//! ```text
//! sender                         receiver
//!   START(size)        ─────▶
//!                      ◀─────    ACK(0)
//!   DATA(1, n) + n bytes ───▶
//!                      ◀─────    ACK(1)
//!   ...
//!   END(last+1, total) ─────▶
//!                      ◀─────    ACK(last+1)
//! ```
//!
//! Stop-and-wait: the sender never has more than one unacknowledged frame
//! in flight.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod payload;
pub mod session;
pub mod transfer;

pub use error::{Error, ErrorCode, FrameError, LimitField, ProtocolError, Result};
pub use frame::{Command, CommandReader, Opcode, decode_command, encode_command};
pub use payload::{OutboundBuffer, PayloadReader, encode_payload};
pub use session::{Session, SessionBuilder, SessionConfig, Status};
pub use transfer::{Direction, TransferSession, TransferState};

/// Command frame size in bytes
pub const CMD_SIZE: usize = 16;

/// Largest payload carried by one DATA frame (8 KiB)
pub const MAX_PAYLOAD_SIZE: usize = 0x2000;

/// Largest file a session will transfer
pub const MAX_FILE_SIZE: u64 = 0x7fff_ffff;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

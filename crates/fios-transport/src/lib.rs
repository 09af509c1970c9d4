//! # FIOS Transport
//!
//! Byte-stream transports for the FIOS (File Input/Output over Serial)
//! protocol.
//!
//! This crate provides:
//! - The non-blocking [`Transport`] trait consumed by the protocol engine
//! - A raw-mode POSIX serial port ([`SerialPort`])
//! - An in-memory duplex pipe for tests and benchmarks ([`MemoryPipe`])
//!
//! Transports carry raw bytes only. Framing, sequencing and acknowledgment
//! live in `fios-core`; a transport is free to accept or return fewer bytes
//! than requested on any call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod serial;
pub mod transport;

pub use memory::{MemoryEnd, MemoryPipe, PipeConfig};
pub use serial::{SerialConfig, SerialPort, resolve_device};
pub use transport::{Transport, TransportError, TransportResult, TransportStats};

/// Device name that selects the platform default serial device
pub const AUTO_DEVICE: &str = "auto";

/// Default line speed in bits per second
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

//! Transfer state tracking.
//!
//! Holds the per-transfer counters and the state graph shared by both
//! directions. The I/O that drives it lives in [`crate::session`].

pub mod session;

pub use session::{Direction, TransferSession, TransferState};

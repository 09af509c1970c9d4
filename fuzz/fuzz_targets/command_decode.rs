//! Fuzz target for command frame decoding
//!
//! The decoder must never panic, only return Ok or Err.

#![no_main]

use fios_core::{decode_command, encode_command};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(command) = decode_command(data) {
        // Accepted frames re-encode without touching seq or value.
        let encoded = encode_command(&command);
        assert_eq!(encoded[0], data[0]);
        assert_eq!(&encoded[4..], &data[4..16]);
    }
});

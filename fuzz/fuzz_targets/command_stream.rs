//! Fuzz target for the incremental command reader
//!
//! Arbitrary bytes are delivered in arbitrary fragments; the reader must
//! either produce commands or reject frames, and never panic or stall.

#![no_main]

use arbitrary::Arbitrary;
use fios_core::CommandReader;
use fios_transport::{MemoryPipe, PipeConfig, Transport};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    fragment: u8,
    bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let fragment = usize::from(input.fragment).max(1);
    let (mut tx, mut rx) = MemoryPipe::with_config(PipeConfig::fragmented(fragment));

    let mut written = 0;
    while written < input.bytes.len() {
        match tx.write(&input.bytes[written..]) {
            Ok(0) | Err(_) => break,
            Ok(n) => written += n,
        }
    }

    let mut reader = CommandReader::new();
    let mut consumed = 0;
    loop {
        match reader.poll(&mut rx) {
            Ok(Some(_)) | Err(_) => consumed += 16,
            Ok(None) => break,
        }
        assert!(consumed <= written);
    }
    assert!(reader.buffered() < 16);
});

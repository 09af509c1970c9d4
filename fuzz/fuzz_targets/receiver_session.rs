//! Fuzz target for a receive session fed by an arbitrary peer
//!
//! Whatever the peer sends, the session must end up in a consistent state:
//! still in progress, completed, or failed with a recorded error.

#![no_main]

use fios_core::{Session, Status};
use fios_transport::{MemoryPipe, Transport};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let (mut peer, end) = MemoryPipe::pair();
    let Ok(mut receiver) = Session::receive(end, dir.path().join("fuzz.bin")) else {
        return;
    };

    let _ = peer.write(data);
    for _ in 0..64 {
        if !receiver.idle() {
            break;
        }
    }

    let progress = receiver.progress();
    assert!((0.0..=1.0).contains(&progress));
    match receiver.status() {
        Status::Error(_) => assert!(!receiver.idle()),
        Status::Completed => assert_eq!(progress, 1.0),
        Status::InProgress => {}
    }

    receiver.close();
    assert!(!receiver.idle());
});

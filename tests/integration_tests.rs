//! Integration tests for complete transfers.
//!
//! Runs a sender and a receiver session against each other over in-memory
//! pipes with different fragmentation and buffering, and checks the
//! destination file, the reported progress and the bytes on the wire.

use fios_core::{
    CMD_SIZE, Direction, MAX_PAYLOAD_SIZE, SessionBuilder, Status, TransferState,
};
use fios_integration_tests::fixtures::{LoopbackFixture, drive, random_bytes};
use fios_transport::{PipeConfig, Transport};

const MAX_ROUNDS: usize = 100_000;

fn assert_transfer(fixture: &LoopbackFixture, pipe: PipeConfig) {
    let (mut sender, mut receiver) = fixture.sessions(pipe).unwrap();

    drive(&mut sender, &mut receiver, MAX_ROUNDS).expect("transfer finished");

    assert!(matches!(sender.status(), Status::Completed), "{:?}", sender.last_error());
    assert!(matches!(receiver.status(), Status::Completed), "{:?}", receiver.last_error());
    assert_eq!(sender.progress(), 1.0);
    assert_eq!(receiver.progress(), 1.0);
    assert_eq!(receiver.bytes_transferred(), fixture.data().len() as u64);

    receiver.close();
    assert_eq!(fixture.received().unwrap(), fixture.data());
}

// ============================================================================
// Round Trips
// ============================================================================

#[test]
fn test_roundtrip_chunk_boundaries() {
    for size in [
        0,
        1,
        MAX_PAYLOAD_SIZE - 1,
        MAX_PAYLOAD_SIZE,
        MAX_PAYLOAD_SIZE + 1,
        3 * MAX_PAYLOAD_SIZE + 17,
    ] {
        let fixture = LoopbackFixture::with_size(size).unwrap();
        assert_transfer(&fixture, PipeConfig::default());
    }
}

#[test]
fn test_roundtrip_random_contents() {
    let fixture = LoopbackFixture::new(random_bytes(100_000)).unwrap();
    assert_transfer(&fixture, PipeConfig::default());
}

#[test]
fn test_roundtrip_one_byte_at_a_time() {
    let fixture = LoopbackFixture::with_size(2 * MAX_PAYLOAD_SIZE + 300).unwrap();
    assert_transfer(&fixture, PipeConfig::fragmented(1));
}

#[test]
fn test_roundtrip_odd_fragmentation() {
    let fixture = LoopbackFixture::with_size(30_000).unwrap();
    assert_transfer(&fixture, PipeConfig::fragmented(13));
}

#[test]
fn test_roundtrip_small_pipe_capacity() {
    // Writes stall whenever 100 bytes are queued, so every frame is flushed
    // across many polls.
    let fixture = LoopbackFixture::with_size(20_000).unwrap();
    let pipe = PipeConfig {
        capacity: 100,
        ..PipeConfig::default()
    };
    assert_transfer(&fixture, pipe);
}

#[test]
fn test_roundtrip_custom_chunk_size() {
    let fixture = LoopbackFixture::with_size(10_000).unwrap();
    let (mut sender, mut receiver) = fixture
        .sessions_with(
            SessionBuilder::new().chunk_size(1000),
            SessionBuilder::new().read_budget(64),
            PipeConfig::default(),
        )
        .unwrap();

    drive(&mut sender, &mut receiver, MAX_ROUNDS).expect("transfer finished");

    assert!(matches!(receiver.status(), Status::Completed));
    assert_eq!(sender.transfer().sequence(), 10);
    assert_eq!(receiver.transfer().sequence(), 10);
    receiver.close();
    assert_eq!(fixture.received().unwrap(), fixture.data());
}

#[test]
fn test_destination_is_truncated() {
    let fixture = LoopbackFixture::with_size(100).unwrap();
    std::fs::write(fixture.destination(), vec![0xFFu8; 5000]).unwrap();

    assert_transfer(&fixture, PipeConfig::default());
}

// ============================================================================
// Session Observation
// ============================================================================

#[test]
fn test_progress_is_monotonic() {
    let fixture = LoopbackFixture::with_size(5 * MAX_PAYLOAD_SIZE).unwrap();
    let (mut sender, mut receiver) = fixture.sessions(PipeConfig::fragmented(512)).unwrap();

    let mut last = (0.0f32, 0.0f32);
    let mut tx_progress = 0.0f32;
    let mut rx_progress = 0.0f32;

    for _ in 0..MAX_ROUNDS {
        let sending = sender.idle_with_progress(&mut tx_progress);
        let receiving = receiver.idle_with_progress(&mut rx_progress);

        assert!(tx_progress >= last.0 && tx_progress <= 1.0);
        assert!(rx_progress >= last.1 && rx_progress <= 1.0);
        last = (tx_progress, rx_progress);

        if !sending && !receiving {
            break;
        }
    }

    assert_eq!(last, (1.0, 1.0));
}

#[test]
fn test_receiver_learns_size_from_start() {
    let fixture = LoopbackFixture::with_size(12_345).unwrap();
    let (mut sender, mut receiver) = fixture.sessions(PipeConfig::default()).unwrap();

    assert_eq!(sender.direction(), Direction::Send);
    assert_eq!(receiver.direction(), Direction::Receive);
    assert_eq!(sender.total_size(), Some(12_345));
    assert_eq!(receiver.total_size(), None);
    assert_eq!(receiver.progress(), 0.0);

    // START goes out on the first poll, the receiver answers on its first.
    assert!(sender.idle());
    assert_eq!(sender.state(), TransferState::AwaitingPeerReady);
    assert!(receiver.idle());
    assert_eq!(receiver.state(), TransferState::Transferring);
    assert_eq!(receiver.total_size(), Some(12_345));

    assert!(sender.idle());
    assert_eq!(sender.state(), TransferState::Transferring);
}

#[test]
fn test_wire_overhead() {
    // START + one DATA per chunk + END from the sender, one ACK for each
    // from the receiver.
    let size = 3 * MAX_PAYLOAD_SIZE + 1;
    let chunks = 4;
    let fixture = LoopbackFixture::with_size(size).unwrap();
    let (mut sender, mut receiver) = fixture.sessions(PipeConfig::default()).unwrap();

    drive(&mut sender, &mut receiver, MAX_ROUNDS).expect("transfer finished");

    let frames = (chunks + 2) * CMD_SIZE as u64;
    let tx = sender.into_transport().stats();
    let rx = receiver.into_transport().stats();

    assert_eq!(tx.bytes_sent, frames + size as u64);
    assert_eq!(rx.bytes_sent, frames);
    assert_eq!(rx.bytes_received, tx.bytes_sent);
    assert_eq!(tx.bytes_received, rx.bytes_sent);
}

#[test]
fn test_sessions_are_independent() {
    let first = LoopbackFixture::with_size(9_000).unwrap();
    let second = LoopbackFixture::new(random_bytes(4_000)).unwrap();

    let (mut s1, mut r1) = first.sessions(PipeConfig::default()).unwrap();
    let (mut s2, mut r2) = second.sessions(PipeConfig::fragmented(7)).unwrap();

    for _ in 0..MAX_ROUNDS {
        let active = [s1.idle(), r1.idle(), s2.idle(), r2.idle()];
        if active.iter().all(|a| !a) {
            break;
        }
    }

    r1.close();
    r2.close();
    assert_eq!(first.received().unwrap(), first.data());
    assert_eq!(second.received().unwrap(), second.data());
}

#[test]
fn test_elapsed_and_speed_after_completion() {
    let fixture = LoopbackFixture::with_size(50_000).unwrap();
    let (mut sender, mut receiver) = fixture.sessions(PipeConfig::default()).unwrap();

    drive(&mut sender, &mut receiver, MAX_ROUNDS).expect("transfer finished");

    let transfer = receiver.transfer();
    assert!(transfer.elapsed().is_some());
    assert_eq!(transfer.declared_size(), Some(50_000));
    assert_eq!(transfer.remaining(), 0);
    assert!(!transfer.is_active());
}

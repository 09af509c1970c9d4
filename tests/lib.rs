//! Shared fixtures for the FIOS integration tests and benchmarks.

pub mod fixtures {
    //! Reusable test infrastructure.

    pub mod loopback;

    pub use loopback::{LoopbackFixture, ScriptedPeer, drive, pattern, random_bytes};
}

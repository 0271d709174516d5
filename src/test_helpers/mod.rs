//! # Test Helpers
//!
//! Fakes and fixtures shared by unit tests and the integration tests under
//! `tests/`: a scripted terminal stream, in-memory process control and signal
//! channel, a seeded election and the PostgreSQL test migrator.

pub mod fakes;
pub mod fixture;
pub mod scripted_stream;
pub mod test_utils;

pub use fakes::{FakeProcessControl, MemorySignalChannel};
pub use fixture::ElectionFixture;
pub use scripted_stream::{ScriptedStream, Transcript};
pub use test_utils::{get_test_database_url, MIGRATOR};

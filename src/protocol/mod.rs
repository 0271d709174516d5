//! # Ballot Box Protocol
//!
//! The line protocol spoken with a ballot box terminal over its remote shell.
//! Every request line gets exactly one response line:
//!
//! ```text
//! > login B1
//! < OK logged in as Main hall
//! > lookup 1001
//! < OK Alice Example may vote in: 1=Senate
//! > queue al
//! < OK queued 1 votes
//! > commit
//! < OK committed 1 votes
//! > lookup 1001
//! < OK Alice Example may vote in: none
//! > queue al 1
//! < ERR 8 vote already cast in voting 1
//! ```
//!
//! [`ProtocolEngine`] drives the conversation through a [`StreamHandler`].
//! Voter-facing rule violations are [`ProtocolError`]s, answered with their
//! numeric code while the session continues; preemption by a newer session
//! ends the loop.

pub mod command;
pub mod engine;
pub mod response;
pub mod stream;

pub use command::Command;
pub use engine::{EngineContext, EngineError, EngineOutcome, EngineResult, ProtocolEngine, GREETING};
pub use response::{ProtocolError, ProtocolErrorCode, Response};
pub use stream::{LineStream, StreamHandler};

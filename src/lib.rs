#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Ballot Box Core
//!
//! Session protocol engine and session-exclusivity coordinator for electronic
//! ballot boxes attached over a remote shell.
//!
//! ## Overview
//!
//! Every ballot box of a polling station is a terminal. When it connects, the
//! remote shell runs `ballot-box session --ballot-box <identifier>`, which
//! makes sure no older session of that box keeps running and then drives the
//! terminal through login, voter lookup, eligibility checks, queuing and
//! commit or cancel of votes.
//!
//! ## Module Organization
//!
//! - [`models`] - Elections, ballot boxes, voters, votings, votes and sessions
//! - [`repository`] - Async persistence traits with in-memory and PostgreSQL backends
//! - [`access`] - Voting access coordinator composing eligibility rules
//! - [`services`] - Vote lifecycle: queue, commit, cancel
//! - [`session`] - Session variants, preemption signalling and the session registry
//! - [`protocol`] - Line protocol: stream handling, commands, responses, engine
//! - [`runner`] - Service wiring and the per-connection session lifecycle
//! - [`reporting`] - Per-box status listing
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Invariants
//!
//! - At most one session per ballot box is running. Starting a session
//!   preempts older ones and waits until none is left.
//! - At most one queued or committed vote exists per (voter, voting), and a
//!   multi-voting ballot is queued all or nothing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ballotbox_core::clock::SystemClock;
//! use ballotbox_core::config::BallotBoxConfig;
//! use ballotbox_core::protocol::LineStream;
//! use ballotbox_core::repository::MemoryStore;
//! use ballotbox_core::runner::{run_session, BallotBoxServices};
//! use ballotbox_core::session::{FileSignalChannel, OsProcessControl, SessionRuntime};
//!
//! # async fn example() -> ballotbox_core::Result<()> {
//! let config = BallotBoxConfig::default();
//! let runtime = SessionRuntime::new(
//!     Arc::new(OsProcessControl),
//!     Arc::new(FileSignalChannel::new(config.session.signal_directory.clone())),
//!     Arc::new(SystemClock),
//! );
//! let line_ending = config.protocol.line_ending;
//! let services = BallotBoxServices::new(Arc::new(MemoryStore::new()), runtime, config);
//!
//! let outcome = run_session(
//!     &services,
//!     "B1",
//!     LineStream::stdio(line_ending),
//!     std::future::pending(),
//! )
//! .await?;
//! println!("session finished: {outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Unit tests live beside the code; integration tests under `tests/` use the
//! in-memory backend and the fakes in `test_helpers` (feature `test-helpers`).
//! PostgreSQL tests are ignored unless a database is available:
//!
//! ```bash
//! cargo test                              # Unit and in-memory integration tests
//! cargo test -- --ignored                 # PostgreSQL backend tests
//! ```

pub mod access;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod reporting;
pub mod repository;
pub mod runner;
pub mod services;
pub mod session;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use access::{VotingAccessManager, VotingAccessRule};
pub use config::{BallotBoxConfig, ConfigManager};
pub use error::{BallotError, Result};
pub use protocol::{EngineOutcome, ProtocolEngine, ProtocolError, ProtocolErrorCode};
pub use repository::{BallotStore, MemoryStore, PgStore};
pub use runner::{run_session, BallotBoxServices};
pub use services::VoteService;
pub use session::{Session, SessionRegistry};

//! # Session Runner
//!
//! Wires the services of one process together and runs a ballot box session
//! from connection to teardown: look up the box, preempt older sessions,
//! serve the protocol until the terminal leaves, a shutdown signal arrives or
//! a newer session takes over, then mark the session ended.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::access::VotingAccessManager;
use crate::clock::Clock;
use crate::config::BallotBoxConfig;
use crate::error::{BallotError, Result};
use crate::protocol::{
    EngineContext, EngineError, EngineOutcome, EngineResult, ProtocolEngine, ProtocolError,
    ProtocolErrorCode, Response, StreamHandler,
};
use crate::repository::BallotStore;
use crate::services::VoteService;
use crate::session::{Session, SessionError, SessionRegistry, SessionRuntime};

/// Explicitly constructed services shared by the sessions of one process
pub struct BallotBoxServices {
    pub store: Arc<dyn BallotStore>,
    pub registry: SessionRegistry,
    pub votes: VoteService,
    pub access: VotingAccessManager,
    pub config: BallotBoxConfig,
    pub clock: Arc<dyn Clock>,
}

impl BallotBoxServices {
    /// Services with the built-in access rules
    pub fn new(store: Arc<dyn BallotStore>, runtime: SessionRuntime, config: BallotBoxConfig) -> Self {
        let clock = runtime.clock.clone();
        let registry = SessionRegistry::new(store.clone(), runtime, config.session.grace_period());
        let votes = VoteService::new(store.clone(), clock.clone());

        Self {
            store,
            registry,
            votes,
            access: VotingAccessManager::with_default_rules(),
            config,
            clock,
        }
    }

    /// Replace the access rules
    pub fn with_access(mut self, access: VotingAccessManager) -> Self {
        self.access = access;
        self
    }

    /// Borrowed view handed to one protocol engine
    pub fn context(&self) -> EngineContext<'_> {
        EngineContext {
            store: self.store.as_ref(),
            registry: &self.registry,
            votes: &self.votes,
            access: &self.access,
            protocol: &self.config.protocol,
            clock: self.clock.as_ref(),
        }
    }
}

impl std::fmt::Debug for BallotBoxServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BallotBoxServices")
            .field("registry", &self.registry)
            .field("access", &self.access)
            .field("environment", &self.config.environment)
            .finish_non_exhaustive()
    }
}

/// Run one session for the ballot box `identifier` over `stream`
///
/// `shutdown` resolving stops the command loop with
/// [`EngineOutcome::Interrupted`], unless a newer session has taken over the
/// box, in which case the terminal gets `ERR 10` and the outcome is
/// [`EngineOutcome::Preempted`]. The session is marked ended on every exit
/// path that reaches the engine.
pub async fn run_session<S, F>(
    services: &BallotBoxServices,
    identifier: &str,
    stream: S,
    shutdown: F,
) -> Result<EngineOutcome>
where
    S: StreamHandler,
    F: Future<Output = ()>,
{
    let ballot_box = services
        .store
        .find_ballot_box_by_identifier(identifier)
        .await?
        .ok_or_else(|| BallotError::UnknownBallotBox(identifier.to_string()))?;

    let mut session = services.registry.start_session(&ballot_box).await?;
    let session_id = session.session_id();

    let result = {
        let mut engine = ProtocolEngine::new(services.context(), ballot_box, &mut session, stream);
        let result = tokio::select! {
            result = engine.run() => result,
            () = shutdown => {
                info!(ballot_box = identifier, session_id, "Shutdown requested");
                Ok(EngineOutcome::Interrupted)
            }
        };

        let mut stream = engine.into_stream();
        let result = match result {
            Ok(EngineOutcome::Interrupted) => {
                classify_shutdown(services, &mut session, &mut stream).await
            }
            other => other,
        };

        if let Err(e) = stream.close().await {
            debug!(error = %e, "Closing the session stream failed");
        }
        result
    };

    let ended = services.registry.end_session(&mut session).await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(EngineError::SessionTerminated { .. }) => EngineOutcome::Preempted,
        Err(e) => {
            if let Err(end_error) = ended {
                warn!(session_id, error = %end_error, "Ending the session failed");
            }
            return Err(e.into());
        }
    };
    ended?;

    info!(ballot_box = identifier, session_id, ?outcome, "Session finished");
    Ok(outcome)
}

/// A preempting session sends its notice and SIGINT back to back, so an
/// interrupt may be the first sign of preemption.
async fn classify_shutdown<S: StreamHandler>(
    services: &BallotBoxServices,
    session: &mut Session,
    stream: &mut S,
) -> EngineResult<EngineOutcome> {
    match services.registry.ensure_current(session).await {
        Ok(()) => Ok(EngineOutcome::Interrupted),
        Err(SessionError::Terminated { session_id }) => {
            warn!(session_id, "Session preempted, stopping on interrupt");
            let response = Response::from(ProtocolError::new(ProtocolErrorCode::SessionTerminated));
            if let Err(e) = stream.write_line(&response.to_line()).await {
                debug!(error = %e, "Could not report preemption to the terminal");
            }
            Err(EngineError::SessionTerminated { session_id })
        }
        Err(e) => {
            warn!(session_id = session.session_id(), error = %e, "Could not check session after interrupt");
            Ok(EngineOutcome::Interrupted)
        }
    }
}

//! # Structured Logging Module
//!
//! Environment-aware structured logging. Standard output carries the ballot
//! box protocol, so every log line goes to standard error.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{BallotBoxConfig, LogFormat};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging for the given configuration
///
/// `RUST_LOG` takes precedence over the configured level. Safe to call more
/// than once; only the first call installs a subscriber.
pub fn init_structured_logging(config: &BallotBoxConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_ansi(false);

        // Try to initialize the subscriber, but don't panic if one already exists
        let result = match config.logging.format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(base.json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(base)
                .try_init(),
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %config.environment,
            "Structured logging initialized"
        );
    });
}

/// Log one protocol exchange of a ballot box session
pub fn log_protocol_exchange(ballot_box: &str, command: &str, response_code: u8) {
    tracing::debug!(
        ballot_box = %ballot_box,
        command = %command,
        response_code = response_code,
        "PROTOCOL_EXCHANGE"
    );
}

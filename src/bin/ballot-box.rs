//! # Ballot Box
//!
//! Entry point bound in the remote shell's authorized-connection mapping of
//! every ballot box, plus the administrative status listing and migrations.
//! Standard output belongs to the line protocol; logs go to standard error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

use ballotbox_core::clock::SystemClock;
use ballotbox_core::config::ConfigManager;
use ballotbox_core::logging::init_structured_logging;
use ballotbox_core::protocol::{EngineOutcome, LineStream};
use ballotbox_core::reporting::{render_status_table, status_rows};
use ballotbox_core::repository::PgStore;
use ballotbox_core::runner::{run_session, BallotBoxServices};
use ballotbox_core::session::{FileSignalChannel, OsProcessControl, SessionRuntime};

#[derive(Parser)]
#[command(name = "ballot-box")]
#[command(about = "Ballot box session server and administration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: config/ballot-box.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the line protocol for one ballot box over stdin/stdout
    Session {
        /// Identifier of the connecting ballot box
        #[arg(short, long, env = "BALLOT_BOX_IDENTIFIER")]
        ballot_box: String,
    },

    /// Show session and vote counts of every ballot box
    Status,

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "ballot-box failed");
            eprintln!("ballot-box: {e:#}");
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let manager = ConfigManager::load_from(cli.config.as_deref())
        .context("loading configuration")?;
    let config = manager.into_config();
    init_structured_logging(&config);

    let store = Arc::new(
        PgStore::connect(&config.database)
            .await
            .context("connecting to the database")?,
    );

    match cli.command {
        Commands::Migrate => {
            store.migrate().await.context("running migrations")?;
            info!("Migrations applied");
            Ok(0)
        }
        Commands::Status => {
            let services = BallotBoxServices::new(store.clone(), runtime(&config), config);
            let rows = status_rows(store.as_ref(), &services.registry).await?;
            print!("{}", render_status_table(&rows));
            Ok(0)
        }
        Commands::Session { ballot_box } => {
            let line_ending = config.protocol.line_ending;
            let services = BallotBoxServices::new(store, runtime(&config), config);
            let outcome = run_session(
                &services,
                &ballot_box,
                LineStream::stdio(line_ending),
                shutdown_signal(),
            )
            .await?;

            Ok(match outcome {
                EngineOutcome::EndOfInput | EngineOutcome::Quit => 0,
                EngineOutcome::Interrupted => 130,
                EngineOutcome::Preempted => 2,
            })
        }
    }
}

fn runtime(config: &ballotbox_core::BallotBoxConfig) -> SessionRuntime {
    SessionRuntime::new(
        Arc::new(OsProcessControl),
        Arc::new(FileSignalChannel::new(config.session.signal_directory.clone())),
        Arc::new(SystemClock),
    )
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Installing the SIGINT handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Installing the SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}

//! # par2guard
//!
//! Orchestration engine for PAR2 parity sets, driving the external
//! `par2` (par2cmdline) tool.
//!
//! ## Design Philosophy
//!
//! par2guard is designed to be:
//! - **Safe with hostile names** - Every path reaches the tool after `--`
//! - **Conservative about success** - Damage only counts as repaired when the
//!   tool's own post-repair verification says so
//! - **Sequential** - One job at a time, in selection order
//! - **Event-driven** - Front ends subscribe to progress events and may only
//!   cancel, never mutate a run
//!
//! ## Quick Start
//!
//! ```no_run
//! use par2guard::{Config, Operation, Orchestrator};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let options = orchestrator.resolve_options(Operation::Create);
//!     let jobs = orchestrator.plan(&[PathBuf::from("/music/Album CD1")], &options)?;
//!     let handle = orchestrator.start(jobs)?;
//!
//!     let summary = handle.wait().await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Run-level result accumulation
pub mod aggregator;
/// par2 argument construction
pub mod command;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Sequential job execution
pub mod orchestrator;
/// External tool integration
pub mod parity;
/// Selection to job resolution
pub mod resolver;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use aggregator::RunAggregator;
pub use command::{CommandBuilder, CommandSpec};
pub use config::Config;
pub use error::{Error, Result, ToExitCode};
pub use orchestrator::{ExistingSet, Orchestrator, RunHandle};
pub use parity::{CliProcessRunner, OutputParser, ProcessOutput, ProcessRunner};
pub use resolver::{PathResolver, ResolveOptions};
pub use types::{
    Event, FileState, FileStatus, Job, JobOutcome, JobResult, JobState, Operation, Redundancy,
    RunSummary,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when a termination signal arrives
///
/// Spawns a task that waits for a termination signal and then cancels the
/// token, so a running batch stops as if the user had cancelled it.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use par2guard::{Config, Orchestrator, cancel_on_signal};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let orchestrator = Orchestrator::new(Config::default())?;
/// # let jobs = Vec::new();
/// let handle = orchestrator.start(jobs)?;
/// cancel_on_signal(handle.cancellation_token());
/// let summary = handle.wait().await?;
/// # Ok(())
/// # }
/// ```
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::warn!("cancelling run");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (sigterm, sigint) => {
            tracing::warn!(
                sigterm = sigterm.is_ok(),
                sigint = sigint.is_ok(),
                "Could not register signal handlers, using ctrl_c fallback"
            );
            signal_outcome(tokio::signal::ctrl_c().await).await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    signal_outcome(tokio::signal::ctrl_c().await).await;
}

/// Settle the result of waiting for Ctrl+C
///
/// A listener that could not be installed never resolves, so a broken signal
/// setup cannot cancel a run on its own.
async fn signal_outcome(result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}

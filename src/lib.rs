//! # manifest-dl
//!
//! Rate-limit aware acquisition of depot manifests.
//!
//! ## Pipeline
//!
//! For every selected item the pipeline:
//! 1. reads the item's depot ids from its descriptor file ([`scanner`])
//! 2. resolves each depot's public manifest id with one info request ([`resolver`])
//! 3. downloads each manifest with a bounded retry budget; HTTP 429 backs off
//!    without spending budget ([`retrieval`], [`retry`])
//! 4. writes the manifest under two output roots ([`writer`])
//!
//! Items run one after another with a cooldown in between. Failures are recorded per
//! item and per depot and never abort the run.
//!
//! ## Quick Start
//!
//! ```no_run
//! use manifest_dl::{Config, ItemId, Pipeline, RunRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(Config::from_install_root("/opt/host"))?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = RunRequest::new(vec![ItemId::new(1245620)], "my-manifest-api-key");
//!     let summary = pipeline.run(request, CancellationToken::new()).await?;
//!     println!("{} of {} depots stored", summary.succeeded(), summary.attempted());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Command line front-end
pub mod cli;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Display name lookup
pub mod names;
/// Run orchestration (decomposed into focused submodules)
pub mod pipeline;
/// Manifest id resolution
pub mod resolver;
/// Manifest downloads
pub mod retrieval;
/// Retry budget with rate-limit backoff
pub mod retry;
/// Descriptor discovery
pub mod scanner;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Dual-root persistence
pub mod writer;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use types::{
    DepotId, DepotOutcome, DepotReport, Event, Item, ItemId, ItemReport, ItemStatus, ManifestId,
    RunRequest, RunSummary,
};

/// Cancel `cancel` when the process receives a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// The returned task ends after the first signal, or when `cancel` is cancelled
/// by someone else.
pub fn cancel_on_signal(
    cancel: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = wait_for_signal() => {
                tracing::warn!("stopping run after current step");
                cancel.cancel();
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed
async fn ctrl_c_or_never() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}

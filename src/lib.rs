//! # repack-watch
//!
//! Watches a drop folder for game installers, unpacks them with an external
//! tool, names the payload after the product's catalog entry and repackages
//! it as a single archive.
//!
//! ## Design
//!
//! - **Idempotent** - a unit is recorded as processed only after its archive
//!   exists and its originals are relocated, so re-running never duplicates work
//! - **One unit at a time** - units are drained sequentially in discovery order
//! - **Failure stays local** - a failed unit is logged with its stage and the
//!   pass continues
//! - **Event-driven** - embedders subscribe to pipeline events
//!
//! ## Quick Start
//!
//! ```no_run
//! use repack_watch::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.folders.watch_dir = "/srv/drop".into();
//!     config.folders.dest_dir = "/srv/archives".into();
//!
//!     let mut pipeline = Pipeline::from_config(config)?;
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = pipeline.run_pass().await?;
//!     println!("{} archived, {} failed", summary.archived, summary.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive creation
pub mod archive;
/// Configuration types
pub mod config;
/// Unit discovery in the watch folder
pub mod discovery;
/// Error types
pub mod error;
/// Installer identification and extraction
pub mod extraction;
/// Catalog metadata lookups
pub mod metadata;
/// Archive name derivation
pub mod naming;
/// Per-unit orchestration
pub mod pipeline;
/// Disposal of processed originals
pub mod relocation;
/// Processed-state persistence
pub mod state;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Poll loop
pub mod watcher;

// Re-export commonly used types
pub use archive::{ArchiveBuilder, BuildOutcome, sweep_partial_archives};
pub use config::{ArchiveFormat, Config, FileCollisionAction, RelocationAction};
pub use discovery::UnitDiscovery;
pub use error::{Error, Result, Stage, StageError};
pub use extraction::{InnoextractCli, InstallerExtractor, ScratchWorkspace};
pub use metadata::{CatalogClient, MetadataResolver, Resolution};
pub use naming::NameNormalizer;
pub use pipeline::Pipeline;
pub use relocation::{Relocation, RelocationManager};
pub use state::ProcessedStateStore;
pub use types::{
    ArchiveName, Event, PassSummary, ProcessingUnit, ProductId, ResolvedMetadata, UnitKind,
    UnitOutcome,
};
pub use watcher::FolderWatcher;

/// Run the watcher until a termination signal arrives
///
/// The signal cancels the loop at the next unit boundary; the unit in flight
/// finishes first.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use repack_watch::{Config, FolderWatcher, Pipeline, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::from_config(Config::default())?;
///     run_with_shutdown(FolderWatcher::new(pipeline)).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(watcher: FolderWatcher) -> Result<()> {
    let cancel = watcher.cancellation_token();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::info!("shutting down after the current unit");
                signal_cancel.cancel();
            }
            _ = signal_cancel.cancelled() => {}
        }
    });

    let result = watcher.run().await;
    cancel.cancel();
    result
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
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

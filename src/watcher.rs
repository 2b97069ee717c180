//! Poll loop around the pipeline
//!
//! Every cycle runs one full discovery pass, then sleeps for the scan
//! interval. With `watch.use_notify` enabled, a filesystem notification on the
//! watch folder cuts the sleep short; the loop then waits for the settle delay
//! so an installer still being copied gets a chance to finish. The periodic
//! rescan stays in place either way, so a missed notification only delays
//! work by one interval.
//!
//! # Example
//!
//! ```no_run
//! use repack_watch::{Config, Pipeline};
//! use repack_watch::watcher::FolderWatcher;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::from_config(Config::default())?;
//! let watcher = FolderWatcher::new(pipeline);
//! let cancel = watcher.cancellation_token();
//!
//! let handle = tokio::spawn(watcher.run());
//! // later: stop at the next unit boundary
//! cancel.cancel();
//! handle.await??;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::types::PassSummary;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type NotifyReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Drives the pipeline until cancelled
pub struct FolderWatcher {
    pipeline: Pipeline,
    cancel: CancellationToken,
    scan_interval: Duration,
    settle_delay: Duration,
    use_notify: bool,
}

impl FolderWatcher {
    /// Wrap a pipeline, taking loop settings from its configuration
    pub fn new(pipeline: Pipeline) -> Self {
        let watch = pipeline.config().watch.clone();
        Self {
            pipeline,
            cancel: CancellationToken::new(),
            scan_interval: watch.scan_interval,
            settle_delay: watch.settle_delay,
            use_notify: watch.use_notify,
        }
    }

    /// Token that stops the loop at the next unit boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The wrapped pipeline
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run a single discovery pass
    pub async fn run_once(&mut self) -> Result<PassSummary> {
        self.pipeline.run_pass_until(&self.cancel).await
    }

    /// Run passes until the cancellation token fires
    ///
    /// A failed discovery pass is logged and retried on the next cycle.
    pub async fn run(mut self) -> Result<()> {
        let watch_dir = self.pipeline.config().watch_dir().to_path_buf();
        tokio::fs::create_dir_all(&watch_dir)
            .await
            .map_err(|e| Error::FolderWatch(format!("Failed to create watch folder: {}", e)))?;

        // the watcher must outlive the loop or notifications stop
        let (_notifier, mut changes) = if self.use_notify {
            let (watcher, rx) = start_notifier(&watch_dir)?;
            (Some(watcher), Some(rx))
        } else {
            (None, None)
        };

        info!(
            watch_dir = ?watch_dir,
            interval = ?self.scan_interval,
            notify = self.use_notify,
            "folder watcher started"
        );

        while !self.cancel.is_cancelled() {
            match self.run_once().await {
                Ok(summary) if summary.discovered > 0 => debug!(?summary, "cycle complete"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "discovery pass failed"),
            }

            // events caused by our own pass are not new work
            drain(&mut changes);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.scan_interval) => {}
                _ = next_change(&mut changes) => {
                    debug!("change detected in watch folder");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.settle_delay) => {}
                    }
                    drain(&mut changes);
                }
            }
        }

        info!("folder watcher stopped");
        Ok(())
    }
}

fn start_notifier(dir: &std::path::Path) -> Result<(RecommendedWatcher, NotifyReceiver)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if tx.send(res).is_err() {
                debug!("notification receiver dropped");
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|e| Error::FolderWatch(e.to_string()))?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| Error::FolderWatch(format!("Failed to watch folder: {}", e)))?;
    Ok((watcher, rx))
}

/// Resolve on the next relevant notification; never resolves without a
/// receiver
async fn next_change(changes: &mut Option<NotifyReceiver>) {
    let Some(rx) = changes.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Some(Ok(event)) if is_relevant(&event.kind) => return,
            Some(Ok(_)) => {}
            Some(Err(e)) => warn!(error = %e, "filesystem watcher error"),
            None => return std::future::pending().await,
        }
    }
}

fn drain(changes: &mut Option<NotifyReceiver>) {
    if let Some(rx) = changes.as_mut() {
        while rx.try_recv().is_ok() {}
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

//! repack-watch command line
//!
//! Usage:
//!     repack-watch --config /etc/repack-watch.toml
//!     repack-watch --config /etc/repack-watch.toml --once

use clap::Parser;
use repack_watch::{Config, FolderWatcher, Pipeline, run_with_shutdown};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "repack-watch",
    version,
    about = "Repackage game installers dropped into a watch folder"
)]
struct Args {
    /// TOML configuration file (built-in defaults when omitted)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run a single discovery pass and exit
    #[arg(long)]
    once: bool,

    /// Log filter, e.g. "debug" or "repack_watch=trace" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    tracing::info!(
        watch_dir = ?config.watch_dir(),
        dest_dir = ?config.dest_dir(),
        processed_dir = ?config.processed_dir(),
        "starting repack-watch"
    );

    let pipeline = Pipeline::from_config(config)?;
    let mut watcher = FolderWatcher::new(pipeline);

    if args.once {
        let summary = watcher.run_once().await?;
        tracing::info!(
            archived = summary.archived,
            skipped = summary.skipped,
            failed = summary.failed,
            "single pass complete"
        );
        return Ok(());
    }

    run_with_shutdown(watcher).await?;
    Ok(())
}

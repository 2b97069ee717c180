//! Installer unpacking
//!
//! The extraction tool is an external collaborator with two modes:
//! identifier introspection (`--gog-game-id <installer>`) and extraction into
//! an output directory. [`InstallerExtractor`] abstracts both so the pipeline
//! can be driven by the real `innoextract` binary or by a test double.
//!
//! Extraction always targets a [`ScratchWorkspace`], a uniquely named
//! temporary directory that is removed when dropped, whatever the outcome.

mod cli;
mod parser;
mod workspace;

pub use cli::InnoextractCli;
pub use parser::{ID_MARKER, parse_product_id};
pub use workspace::{SCRATCH_PREFIX, ScratchWorkspace, is_scratch_dir, sweep_stale_workspaces};

use crate::error::Result;
use crate::types::ProductId;
use async_trait::async_trait;
use std::path::Path;

/// Interface to the installer unpacking tool
///
/// # Examples
///
/// ```no_run
/// use repack_watch::extraction::{InnoextractCli, InstallerExtractor, ScratchWorkspace};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = InnoextractCli::from_path().expect("innoextract not found in PATH");
/// let installer = Path::new("/WATCHED/setup_game.exe");
///
/// let id = extractor.identify(installer).await?;
/// let scratch = ScratchWorkspace::create(Path::new("/WATCHED"))?;
/// extractor.extract(installer, scratch.path()).await?;
/// println!("{} unpacked to {}", id, scratch.path().display());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait InstallerExtractor: Send + Sync {
    /// Read the product identifier embedded in an installer
    ///
    /// Fails when the tool cannot be run or prints no identifier line.
    async fn identify(&self, installer: &Path) -> Result<ProductId>;

    /// Unpack `installer` into `output_dir`
    ///
    /// Several installers may target the same directory; their payloads merge.
    async fn extract(&self, installer: &Path, output_dir: &Path) -> Result<()>;

    /// Name of this extractor for logging
    fn name(&self) -> &'static str;
}

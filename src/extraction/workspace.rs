//! Per-unit scratch directories

use crate::error::{Error, Result};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Name prefix of every scratch workspace
pub const SCRATCH_PREFIX: &str = "processing_";

/// Uniquely named temporary directory owned by one unit's pipeline run
///
/// Removed on drop, so every exit path (success, stage failure, panic
/// unwinding) cleans it up. [`ScratchWorkspace::close`] removes it eagerly and
/// reports removal errors.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    /// Create a fresh workspace under `root`, creating `root` if needed
    pub fn create(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(root)?;
        debug!(path = ?dir.path(), "created scratch workspace");
        Ok(Self { dir })
    }

    /// Location of the workspace
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace now
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| Error::InvalidPath {
            path,
            reason: format!("failed to remove scratch workspace: {}", e),
        })
    }
}

/// Whether `path` looks like a scratch workspace
pub fn is_scratch_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(SCRATCH_PREFIX))
        .unwrap_or(false)
}

/// Remove workspaces a killed run left in `root`
///
/// Only directories carrying [`SCRATCH_PREFIX`] are touched. Returns how many
/// were removed; a missing `root` counts as zero.
pub fn sweep_stale_workspaces(root: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() || !is_scratch_dir(&path) {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(?path, "removed stale scratch workspace");
                removed += 1;
            }
            Err(e) => warn!(?path, error = %e, "failed to remove stale scratch workspace"),
        }
    }
    Ok(removed)
}

//! Disposal of originals after a successful archive
//!
//! Originals are either moved into `<processed_dir>/<archive name>/` or
//! deleted. Relocation is not transactional: a failure part-way leaves the
//! files already handled where they are, and only those installers are
//! reported back for recording.

use crate::config::{Config, FileCollisionAction, RelocationAction};
use crate::error::StageError;
use crate::types::{ArchiveName, ProcessingUnit};
use crate::utils::{get_unique_path, move_dir, move_file};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of [`RelocationManager::finalize`]
#[derive(Debug, Default)]
pub struct Relocation {
    /// Installers that were moved or deleted, in unit order
    pub installers: Vec<PathBuf>,
    /// Total number of files handled, auxiliary files included
    pub files: usize,
    /// Per-game subfolder the files went to (None when deleting)
    pub destination: Option<PathBuf>,
    /// The failure that stopped relocation, if any
    pub error: Option<StageError>,
}

/// Moves or deletes the originals of an archived unit
#[derive(Clone, Debug)]
pub struct RelocationManager {
    action: RelocationAction,
    processed_dir: PathBuf,
    installer_extensions: Vec<String>,
}

impl RelocationManager {
    /// Create a manager
    ///
    /// `installer_extensions` decides whether a group directory still holds
    /// installers after its pending ones are gone.
    pub fn new(
        action: RelocationAction,
        processed_dir: impl Into<PathBuf>,
        installer_extensions: &[String],
    ) -> Self {
        Self {
            action,
            processed_dir: processed_dir.into(),
            installer_extensions: installer_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Manager for the configured disposition and processed-items area
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.relocation.action,
            config.processed_dir(),
            &config.discovery.installer_extensions,
        )
    }

    /// Configured disposition
    pub fn action(&self) -> RelocationAction {
        self.action
    }

    /// Per-game subfolder used for `name`
    pub fn destination_for(&self, name: &ArchiveName) -> PathBuf {
        self.processed_dir.join(name.as_str())
    }

    /// Dispose of the unit's pending installers and their auxiliary files
    ///
    /// For a directory group that no longer contains any installer, the rest
    /// of the directory follows and the directory itself is removed.
    pub async fn finalize(&self, unit: &ProcessingUnit, name: &ArchiveName) -> Relocation {
        let mut relocation = Relocation::default();

        let destination = match self.action {
            RelocationAction::MoveToProcessed => {
                let dir = self.destination_for(name);
                if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                    relocation.error = Some(StageError::Relocation {
                        source_path: unit.source.clone(),
                        reason: format!("cannot create {}: {}", dir.display(), e),
                    });
                    return relocation;
                }
                relocation.destination = Some(dir.clone());
                Some(dir)
            }
            RelocationAction::Delete => None,
        };

        for installer in &unit.installers {
            if let Err(e) = self.dispose(installer, destination.as_deref()).await {
                relocation.error = Some(e);
                return relocation;
            }
            relocation.installers.push(installer.clone());
            relocation.files += 1;
        }

        for file in &unit.auxiliary {
            if let Err(e) = self.dispose(file, destination.as_deref()).await {
                relocation.error = Some(e);
                return relocation;
            }
            relocation.files += 1;
        }

        if unit.is_grouped() {
            match self.drain_group_dir(&unit.source, destination.as_deref()).await {
                Ok(moved) => relocation.files += moved,
                Err(e) => relocation.error = Some(e),
            }
        }

        info!(
            unit = %unit.label(),
            files = relocation.files,
            destination = ?relocation.destination,
            "originals relocated"
        );
        relocation
    }

    /// Move `file` into `destination`, or delete it when there is none
    async fn dispose(&self, file: &Path, destination: Option<&Path>) -> Result<(), StageError> {
        let fail = |reason: String| StageError::Relocation {
            source_path: file.to_path_buf(),
            reason,
        };

        match destination {
            Some(dir) => {
                let file_name = file
                    .file_name()
                    .ok_or_else(|| fail("path has no file name".to_string()))?;
                let target = get_unique_path(&dir.join(file_name), FileCollisionAction::Rename)
                    .map_err(|e| fail(e.to_string()))?;
                move_file(file, &target)
                    .await
                    .map_err(|e| fail(format!("move to {} failed: {}", target.display(), e)))?;
                debug!(from = ?file, to = ?target, "moved");
            }
            None => {
                tokio::fs::remove_file(file)
                    .await
                    .map_err(|e| fail(format!("delete failed: {}", e)))?;
                debug!(?file, "deleted");
            }
        }
        Ok(())
    }

    /// Clear out a group directory once it holds no installers
    ///
    /// Returns the number of leftover files handled. A directory that still
    /// contains an installer (e.g. one processed in an earlier pass and left
    /// in place) is kept untouched.
    async fn drain_group_dir(
        &self,
        dir: &Path,
        destination: Option<&Path>,
    ) -> Result<usize, StageError> {
        let fail = |reason: String| StageError::Relocation {
            source_path: dir.to_path_buf(),
            reason,
        };

        let mut leftovers = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(fail(e.to_string())),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| fail(e.to_string()))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| fail(e.to_string()))?;
            if file_type.is_file() && self.is_installer(&path) {
                debug!(?dir, remaining = ?path, "group directory still holds installers, keeping it");
                return Ok(0);
            }
            leftovers.push((path, file_type.is_dir()));
        }

        let mut handled = 0;
        for (path, is_dir) in leftovers {
            if is_dir {
                match destination {
                    Some(dest) => {
                        let Some(dir_name) = path.file_name() else {
                            continue;
                        };
                        let target = get_unique_path(&dest.join(dir_name), FileCollisionAction::Rename)
                            .map_err(|e| fail(e.to_string()))?;
                        move_dir(&path, &target)
                            .await
                            .map_err(|e| fail(format!("move of {} failed: {}", path.display(), e)))?;
                    }
                    None => tokio::fs::remove_dir_all(&path)
                        .await
                        .map_err(|e| fail(format!("delete of {} failed: {}", path.display(), e)))?,
                }
            } else {
                self.dispose(&path, destination).await?;
            }
            handled += 1;
        }

        if let Err(e) = tokio::fs::remove_dir(dir).await {
            warn!(?dir, error = %e, "could not remove emptied group directory");
            return Err(fail(format!("remove directory failed: {}", e)));
        }
        debug!(?dir, handled, "group directory removed");
        Ok(handled)
    }

    fn is_installer(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.installer_extensions
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }
}

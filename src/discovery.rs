//! Discovery of processable units in the watch folder
//!
//! Every call re-reads the filesystem; nothing is cached between passes.
//! Two kinds of unit are recognized:
//! - an installer directly in the watch folder (single-file unit)
//! - an immediate subdirectory holding at least one installer
//!   (directory-grouped unit)
//!
//! Entries are visited in lexicographic order, which also fixes the primary
//! installer of a group: the first installer name in that order.

use crate::config::Config;
use crate::error::Result;
use crate::extraction::is_scratch_dir;
use crate::state::ProcessedStateStore;
use crate::types::{ProcessingUnit, UnitKind};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Scans a watch folder for units
#[derive(Clone, Debug)]
pub struct UnitDiscovery {
    watch_root: PathBuf,
    extensions: Vec<String>,
    excluded: Vec<PathBuf>,
}

impl UnitDiscovery {
    /// Create a scanner for `watch_root` recognizing the given installer
    /// extensions (case-insensitive, without the dot)
    pub fn new(watch_root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            watch_root: watch_root.into(),
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            excluded: Vec::new(),
        }
    }

    /// Scanner for the configured watch folder
    ///
    /// The processed-items area, the destination folder and the scratch root
    /// are never treated as units even when they live inside the watch folder,
    /// and the state file is never picked up as an auxiliary file.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.watch_dir(),
            &config.discovery.installer_extensions,
        )
        .exclude(config.processed_dir())
        .exclude(config.dest_dir())
        .exclude(config.scratch_root())
        .exclude(config.state_file_path())
    }

    /// Never treat `path` as a unit or part of one
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path != self.watch_root {
            self.excluded.push(path);
        }
        self
    }

    /// Watch folder being scanned
    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    /// Whether `path` has an installer extension
    pub fn is_installer(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }

    /// Enumerate units not yet recorded in `state`
    ///
    /// Single-file units come first, then directory groups, each in name order.
    /// Only an unreadable watch folder is an error; a subdirectory or entry
    /// that cannot be read is logged and left out of this pass.
    pub fn discover(&self, state: &ProcessedStateStore) -> Result<Vec<ProcessingUnit>> {
        let (mut files, dirs) = list_sorted(&self.watch_root)?;
        files.retain(|f| !self.is_excluded(f));
        let mut units = Vec::new();

        let root_installers: Vec<&PathBuf> =
            files.iter().filter(|f| self.is_installer(f)).collect();

        for installer in &root_installers {
            if state.contains(&ProcessingUnit::key_for(installer)) {
                trace!(?installer, "already processed, skipping");
                continue;
            }
            let auxiliary = self.auxiliary_for(&files, &root_installers, &[*installer]);
            units.push(ProcessingUnit {
                kind: UnitKind::SingleFile,
                primary: (*installer).clone(),
                installers: vec![(*installer).clone()],
                auxiliary,
                source: (*installer).clone(),
            });
        }

        for dir in dirs {
            if is_scratch_dir(&dir) || self.is_excluded(&dir) {
                trace!(?dir, "excluded directory");
                continue;
            }
            match self.directory_unit(&dir, state) {
                Ok(Some(unit)) => units.push(unit),
                Ok(None) => {}
                Err(e) => warn!(?dir, error = %e, "cannot read directory, skipping it this pass"),
            }
        }

        debug!(root = ?self.watch_root, units = units.len(), "discovery pass complete");
        Ok(units)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|ex| ex == path)
    }

    fn directory_unit(
        &self,
        dir: &Path,
        state: &ProcessedStateStore,
    ) -> Result<Option<ProcessingUnit>> {
        let (files, _) = list_sorted(dir)?;
        let installers: Vec<&PathBuf> = files.iter().filter(|f| self.is_installer(f)).collect();

        let Some(primary) = installers.first() else {
            return Ok(None);
        };

        let pending: Vec<&PathBuf> = installers
            .iter()
            .copied()
            .filter(|i| !state.contains(&ProcessingUnit::key_for(i)))
            .collect();

        if pending.is_empty() {
            trace!(?dir, "all installers already processed");
            return Ok(None);
        }

        let auxiliary = self.auxiliary_for(&files, &installers, &pending);
        Ok(Some(ProcessingUnit {
            kind: UnitKind::DirectoryGrouped,
            primary: (*primary).clone(),
            installers: pending.into_iter().cloned().collect(),
            auxiliary,
            source: dir.to_path_buf(),
        }))
    }

    /// Non-installer files whose name extends the stem of a pending installer
    ///
    /// A file matching several stems belongs to the longest one, so
    /// `setup_game_dlc-1.bin` goes with `setup_game_dlc.exe` rather than
    /// `setup_game.exe`.
    fn auxiliary_for(
        &self,
        files: &[PathBuf],
        all_installers: &[&PathBuf],
        pending: &[&PathBuf],
    ) -> Vec<PathBuf> {
        files
            .iter()
            .filter(|f| !self.is_installer(f))
            .filter(|f| {
                owning_installer(f, all_installers)
                    .map(|owner| pending.iter().any(|p| *p == owner))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

fn owning_installer<'a>(file: &Path, installers: &[&'a PathBuf]) -> Option<&'a PathBuf> {
    let name = file.file_name()?.to_str()?;
    installers
        .iter()
        .filter_map(|installer| {
            let stem = installer.file_stem()?.to_str()?;
            name.starts_with(stem).then_some((stem.len(), *installer))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, installer)| installer)
}

/// Regular files and directories directly inside `dir`, each sorted by name
fn list_sorted(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((files, dirs)),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(?dir, error = %e, "unreadable directory entry, skipping");
                continue;
            }
        };
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!(path = ?entry.path(), error = %e, "cannot stat entry, skipping");
                continue;
            }
        };
        if file_type.is_dir() {
            dirs.push(entry.path());
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    dirs.sort();
    Ok((files, dirs))
}

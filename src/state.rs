//! Durable record of installers that completed the pipeline
//!
//! The record is a JSON array of installer path strings stored in the watch
//! folder. It is read once at startup and rewritten in full after every
//! completed unit. Writes go to a temporary sibling first and are renamed into
//! place, so a crash mid-write never leaves a truncated file behind.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Set of processed installer keys backed by a JSON file
#[derive(Debug)]
pub struct ProcessedStateStore {
    path: PathBuf,
    keys: BTreeSet<String>,
}

impl ProcessedStateStore {
    /// Load the store from `path`
    ///
    /// A missing file is a first run and yields an empty set. An unreadable or
    /// malformed file is an error: guessing would risk reprocessing everything.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let keys = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let list: Vec<String> = serde_json::from_str(&raw).map_err(|e| Error::State {
                    path: path.clone(),
                    reason: format!("malformed state file: {}", e),
                })?;
                list.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no state file yet, starting empty");
                BTreeSet::new()
            }
            Err(e) => {
                return Err(Error::State {
                    path,
                    reason: format!("failed to read state file: {}", e),
                });
            }
        };

        info!(?path, entries = keys.len(), "loaded processed state");
        Ok(Self { path, keys })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `key` has completed the pipeline
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of recorded keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate over recorded keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Record a single key and persist the full set
    pub fn record(&mut self, key: impl Into<String>) -> Result<()> {
        self.record_all([key.into()])
    }

    /// Record several keys and persist the full set once
    ///
    /// If persisting fails the new keys are removed again, so the in-memory
    /// view never claims more than the file does.
    pub fn record_all<I>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let added: Vec<String> = keys
            .into_iter()
            .filter(|key| self.keys.insert(key.clone()))
            .collect();

        if added.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.persist() {
            for key in &added {
                self.keys.remove(key);
            }
            return Err(e);
        }

        debug!(path = ?self.path, added = added.len(), total = self.keys.len(), "state persisted");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let state_err = |reason: String| Error::State {
            path: self.path.clone(),
            reason,
        };

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let list: Vec<&String> = self.keys.iter().collect();
        let json = serde_json::to_vec_pretty(&list)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| state_err(format!("failed to create temp file: {}", e)))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| state_err(format!("failed to write state: {}", e)))?;
        tmp.persist(&self.path)
            .map_err(|e| state_err(format!("failed to replace state file: {}", e.error)))?;
        Ok(())
    }
}

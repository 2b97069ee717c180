//! Error types for repack-watch
//!
//! Two layers of errors live here:
//! - [`Error`] is the crate-wide error used by every fallible operation
//! - [`StageError`] is the typed failure reason of a single pipeline stage
//!   (identification, extraction, archiving, relocation, state recording).
//!   The pipeline inspects it instead of letting errors cross stage boundaries.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for repack-watch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for repack-watch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "watch_dir")
        key: Option<String>,
    },

    /// Configuration file could not be parsed
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Zip archive could not be written
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Processed-state file could not be read or written
    #[error("state file error at {path}: {reason}")]
    State {
        /// Location of the state file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A pipeline stage failed for a unit
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Folder watching error
    #[error("folder watch error: {0}")]
    FolderWatch(String),

    /// External tool execution failed (innoextract, rar)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Invalid path encountered while handling files
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The invalid path that was encountered
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },

    /// File collision at destination
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision (e.g., "file already exists")
        reason: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Pipeline stage a unit was in when it failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading the product identifier out of the primary installer
    Identify,
    /// Unpacking installers into the scratch workspace
    Extract,
    /// Catalog lookup (never fatal, listed for events)
    Metadata,
    /// Packaging the scratch workspace
    Archive,
    /// Moving or deleting the original files
    Relocate,
    /// Persisting the processed-state file
    State,
}

impl Stage {
    /// Short lowercase name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Identify => "identify",
            Stage::Extract => "extract",
            Stage::Metadata => "metadata",
            Stage::Archive => "archive",
            Stage::Relocate => "relocate",
            Stage::State => "state",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure of one pipeline stage
///
/// Every variant names the file the stage was working on, so a log line is
/// enough to find the unit again.
#[derive(Debug, Error)]
pub enum StageError {
    /// The extraction tool reported no product identifier
    #[error("no product identifier found in {installer}: {reason}")]
    Identification {
        /// Installer that was introspected
        installer: PathBuf,
        /// Why no identifier was found
        reason: String,
    },

    /// The extraction tool failed on an installer
    #[error("extraction failed for {installer}: {reason}")]
    Extraction {
        /// Installer that failed to unpack
        installer: PathBuf,
        /// Tool output or spawn error
        reason: String,
    },

    /// The archive could not be written
    #[error("archiving to {archive} failed: {reason}")]
    Archive {
        /// Final archive path that was being produced
        archive: PathBuf,
        /// The reason archiving failed
        reason: String,
    },

    /// Originals could not be moved or deleted
    #[error("failed to relocate {source_path}: {reason}")]
    Relocation {
        /// The file that could not be relocated
        source_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// Completion could not be recorded durably
    #[error("failed to record completion in {path}: {reason}")]
    StateStore {
        /// Location of the state file
        path: PathBuf,
        /// The reason the write failed
        reason: String,
    },
}

impl StageError {
    /// The stage this failure belongs to
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Identification { .. } => Stage::Identify,
            StageError::Extraction { .. } => Stage::Extract,
            StageError::Archive { .. } => Stage::Archive,
            StageError::Relocation { .. } => Stage::Relocate,
            StageError::StateStore { .. } => Stage::State,
        }
    }

    /// Whether the originals are guaranteed untouched after this failure
    ///
    /// Identification, extraction and archiving happen before anything is
    /// moved; relocation and state failures happen after.
    pub fn originals_untouched(&self) -> bool {
        matches!(
            self,
            StageError::Identification { .. }
                | StageError::Extraction { .. }
                | StageError::Archive { .. }
        )
    }
}

//! Core types for repack-watch

use crate::error::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Title used when the catalog lookup fails
pub const FALLBACK_TITLE: &str = "Unknown Game";

/// Year sentinel meaning "release year unknown"
pub const UNKNOWN_YEAR: &str = "0000";

/// How a unit was found in the watch folder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// An installer sitting directly in the watch folder
    SingleFile,
    /// A subdirectory bundling one or more installers
    DirectoryGrouped,
}

/// One logical product's worth of installer input
///
/// Built fresh on every discovery pass; never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingUnit {
    /// Single file or directory group
    pub kind: UnitKind,
    /// Installer whose product identifier names the unit
    pub primary: PathBuf,
    /// Installers still to be extracted, in order (may exclude an already
    /// processed primary)
    pub installers: Vec<PathBuf>,
    /// Continuation parts and other data files belonging to the pending
    /// installers
    pub auxiliary: Vec<PathBuf>,
    /// The installer itself for single-file units, the subdirectory otherwise
    pub source: PathBuf,
}

impl ProcessingUnit {
    /// Stable state-store key for an installer path
    pub fn key_for(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Human readable label used in logs
    pub fn label(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    /// Whether the unit is a directory group
    pub fn is_grouped(&self) -> bool {
        self.kind == UnitKind::DirectoryGrouped
    }
}

/// Opaque product identifier reported by the extraction tool
///
/// Never empty: construction fails for blank input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Wrap a raw identifier, trimming whitespace; `None` if nothing is left
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Title and release year of a product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    /// Sanitized title
    pub title: String,
    /// Four digit year or [`UNKNOWN_YEAR`]
    pub year: String,
}

impl ResolvedMetadata {
    /// The value used when the catalog cannot be reached
    pub fn fallback() -> Self {
        Self {
            title: FALLBACK_TITLE.to_string(),
            year: UNKNOWN_YEAR.to_string(),
        }
    }
}

/// Deterministic, filesystem-safe name shared by the archive and the
/// processed-items subfolder
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveName(String);

impl ArchiveName {
    pub(crate) fn from_normalized(name: String) -> Self {
        Self(name)
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the archive with the given extension
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }
}

impl std::fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a unit that made it through the pipeline without a stage error
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOutcome {
    /// Archive written, originals disposed of, completion recorded
    Archived {
        /// Final archive path
        archive: PathBuf,
        /// Name shared with the processed-items subfolder
        name: ArchiveName,
        /// Installers recorded as processed
        recorded: Vec<String>,
    },
    /// Extraction produced no files; nothing archived or moved
    Empty {
        /// Name the archive would have had
        name: ArchiveName,
    },
    /// An archive with this name exists and collisions are configured to skip
    CollisionSkipped {
        /// Existing archive that was left alone
        archive: PathBuf,
    },
}

/// Totals of one discovery pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// Units discovered
    pub discovered: usize,
    /// Units archived and recorded
    pub archived: usize,
    /// Units that completed without producing an archive
    pub skipped: usize,
    /// Units that failed at some stage
    pub failed: usize,
}

/// Events emitted by the pipeline
///
/// Subscribe with [`Pipeline::subscribe`](crate::Pipeline::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A discovery pass began
    PassStarted {
        /// When the pass started
        at: DateTime<Utc>,
    },

    /// A unit was found
    UnitDiscovered {
        /// Unit source path
        source: PathBuf,
        /// Single file or directory group
        kind: UnitKind,
        /// Number of installers still to process
        installers: usize,
    },

    /// Product identifier read from the primary installer
    Identified {
        /// Primary installer
        installer: PathBuf,
        /// Identifier reported by the tool
        product_id: ProductId,
    },

    /// An installer is being unpacked
    Extracting {
        /// Installer being unpacked
        installer: PathBuf,
    },

    /// Title and year resolved
    MetadataResolved {
        /// Identifier that was looked up
        product_id: ProductId,
        /// Resolved title
        title: String,
        /// Resolved year or sentinel
        year: String,
        /// Whether the fallback was used
        fallback: bool,
    },

    /// Archive written
    Archived {
        /// Final archive path
        path: PathBuf,
    },

    /// Originals moved or deleted
    Relocated {
        /// Files handled
        files: usize,
        /// Target folder (None when deleted)
        destination: Option<PathBuf>,
    },

    /// Unit fully done
    UnitCompleted {
        /// Unit source path
        source: PathBuf,
        /// Derived name
        name: ArchiveName,
    },

    /// Unit finished without producing anything
    UnitSkipped {
        /// Unit source path
        source: PathBuf,
        /// Why it was skipped
        reason: String,
    },

    /// Unit failed at a stage
    UnitFailed {
        /// Unit source path
        source: PathBuf,
        /// Failing stage
        stage: Stage,
        /// Error message
        error: String,
    },

    /// A discovery pass finished
    PassFinished {
        /// Pass totals
        summary: PassSummary,
    },
}

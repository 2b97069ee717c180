//! In-process zip writer

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

/// Entries at or above this size need the zip64 extension
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Name prefix of zip staging files in the destination folder
pub(crate) const STAGING_PREFIX: &str = ".repack-";

/// Name suffix of zip staging files in the destination folder
pub(crate) const STAGING_SUFFIX: &str = ".zip.partial";

/// Write every regular file below `source` into a zip at `dest`
///
/// Entries are added in sorted order with `/`-separated paths relative to
/// `source`. When `base` names an existing zip, its entries are carried over
/// first, except those replaced by a file of the same name in `source`. The
/// archive is assembled in a temporary file beside `dest` and renamed over it
/// once finished; on error nothing is left at `dest`.
pub fn write_zip(
    source: &Path,
    dest: &Path,
    compression_level: Option<i32>,
    base: Option<&Path>,
) -> Result<()> {
    let parent = dest.parent().ok_or_else(|| Error::InvalidPath {
        path: dest.to_path_buf(),
        reason: "archive path has no parent directory".to_string(),
    })?;

    let files = collect_files(source)?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(STAGING_SUFFIX)
        .tempfile_in(parent)?;

    let mut writer = ZipWriter::new(BufWriter::new(staging.reopen()?));
    let mut carried = 0usize;

    if let Some(base) = base {
        let replaced: HashSet<&str> = files.iter().map(|f| f.name.as_str()).collect();
        let mut existing = ZipArchive::new(BufReader::new(File::open(base)?))?;
        for i in 0..existing.len() {
            let entry = existing.by_index_raw(i)?;
            if replaced.contains(entry.name()) {
                continue;
            }
            writer.raw_copy_file(entry)?;
            carried += 1;
        }
    }

    for file in &files {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(compression_level)
            .large_file(file.size >= ZIP64_THRESHOLD);

        writer.start_file(file.name.as_str(), options)?;
        let mut input = BufReader::new(File::open(&file.path)?);
        io::copy(&mut input, &mut writer)?;
    }

    let mut inner = writer.finish()?;
    inner.flush()?;
    inner.get_ref().sync_all()?;
    drop(inner);

    staging.persist(dest).map_err(|e| Error::Io(e.error))?;
    debug!(archive = ?dest, added = files.len(), carried, "zip written");
    Ok(())
}

struct SourceFile {
    path: PathBuf,
    name: String,
    size: u64,
}

fn collect_files(source: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| Error::InvalidPath {
                path: entry.path().to_path_buf(),
                reason: "entry is outside the archive root".to_string(),
            })?;

        files.push(SourceFile {
            name: entry_name(relative),
            size: entry.metadata().map(|m| m.len()).unwrap_or(0),
            path: entry.into_path(),
        });
    }
    Ok(files)
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

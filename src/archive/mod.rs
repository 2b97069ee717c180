//! Packaging of extracted payloads
//!
//! [`ArchiveBuilder`] turns a scratch workspace into a single archive in the
//! destination folder. The archive is written under a temporary name next to
//! its final location and renamed into place only once complete, so a failed
//! or interrupted build never leaves a truncated archive under the final name.

mod rar;
mod zip;

pub use self::rar::RarCli;
pub use self::zip::write_zip;

use crate::config::{ArchiveFormat, Config, FileCollisionAction};
use crate::error::{Error, Result};
use crate::types::ArchiveName;
use crate::utils::get_unique_path;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result of [`ArchiveBuilder::build`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Archive written at this path
    Written(PathBuf),
    /// The workspace held no files; nothing was written
    Empty,
    /// An archive with this name exists and collisions are set to skip
    Skipped(PathBuf),
}

/// Writes archives in the configured format
pub struct ArchiveBuilder {
    format: ArchiveFormat,
    collision: FileCollisionAction,
    compression_level: Option<i32>,
    rar: Option<RarCli>,
}

impl ArchiveBuilder {
    /// In-process zip builder
    pub fn zip() -> Self {
        Self {
            format: ArchiveFormat::Zip,
            collision: FileCollisionAction::default(),
            compression_level: None,
            rar: None,
        }
    }

    /// Builder driving an external rar binary
    pub fn rar(cli: RarCli) -> Self {
        Self {
            format: ArchiveFormat::Rar,
            collision: FileCollisionAction::default(),
            compression_level: None,
            rar: Some(cli),
        }
    }

    /// Build from configuration, locating the rar binary when needed
    pub fn from_config(config: &Config) -> Result<Self> {
        let builder = match config.archive.format {
            ArchiveFormat::Zip => Self::zip(),
            ArchiveFormat::Rar => Self::rar(RarCli::from_config(&config.tools)?),
        };
        Ok(builder
            .with_collision(config.archive.collision)
            .with_compression_level(config.archive.compression_level))
    }

    /// Set how an existing archive with the same name is handled
    pub fn with_collision(mut self, collision: FileCollisionAction) -> Self {
        self.collision = collision;
        self
    }

    /// Set the deflate level used for zip output
    pub fn with_compression_level(mut self, level: Option<i32>) -> Self {
        self.compression_level = level;
        self
    }

    /// Format produced by this builder
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Final path an archive named `name` would get in `dest_root`, before
    /// collision handling
    pub fn target_path(&self, name: &ArchiveName, dest_root: &Path) -> PathBuf {
        dest_root.join(name.file_name(self.format.extension()))
    }

    /// Package every regular file below `scratch` into `dest_root/<name>.<ext>`
    ///
    /// Paths inside the archive are relative to `scratch`. An empty workspace
    /// is not an error and produces [`BuildOutcome::Empty`]. An existing
    /// archive of the same name is handled per the collision setting.
    pub async fn build(
        &self,
        scratch: &Path,
        name: &ArchiveName,
        dest_root: &Path,
    ) -> Result<BuildOutcome> {
        self.write(scratch, name, dest_root, false).await
    }

    /// Like [`ArchiveBuilder::build`], but an existing archive of the same
    /// name is added to instead of replaced
    ///
    /// Used for directory groups whose earlier installers were archived in a
    /// previous pass; the collision setting does not apply to that archive.
    pub async fn extend(
        &self,
        scratch: &Path,
        name: &ArchiveName,
        dest_root: &Path,
    ) -> Result<BuildOutcome> {
        self.write(scratch, name, dest_root, true).await
    }

    async fn write(
        &self,
        scratch: &Path,
        name: &ArchiveName,
        dest_root: &Path,
        merge: bool,
    ) -> Result<BuildOutcome> {
        if count_files(scratch) == 0 {
            debug!(?scratch, "nothing extracted, skipping archive");
            return Ok(BuildOutcome::Empty);
        }

        tokio::fs::create_dir_all(dest_root).await?;

        let preferred = self.target_path(name, dest_root);
        let (target, base) = if merge && preferred.is_file() {
            info!(archive = ?preferred, "adding to existing archive");
            (preferred.clone(), Some(preferred))
        } else {
            match get_unique_path(&preferred, self.collision) {
                Ok(path) => (path, None),
                Err(Error::FileCollision { path, .. }) => {
                    info!(archive = ?path, "archive already exists, skipping");
                    return Ok(BuildOutcome::Skipped(path));
                }
                Err(e) => return Err(e),
            }
        };

        info!(archive = ?target, format = ?self.format, "creating archive");
        match (&self.format, &self.rar) {
            (ArchiveFormat::Zip, _) => {
                let scratch = scratch.to_path_buf();
                let dest = target.clone();
                let level = self.compression_level;
                tokio::task::spawn_blocking(move || {
                    write_zip(&scratch, &dest, level, base.as_deref())
                })
                .await
                .map_err(|e| Error::Other(format!("archive task failed: {}", e)))??;
            }
            (ArchiveFormat::Rar, Some(cli)) => cli.archive(scratch, &target, base.as_deref()).await?,
            (ArchiveFormat::Rar, None) => {
                return Err(Error::NotSupported("rar output requires a rar binary".to_string()));
            }
        }

        info!(archive = ?target, "archive created");
        Ok(BuildOutcome::Written(target))
    }
}

/// Remove staging files a killed run left in `dest_root`
///
/// Covers both the zip staging files and rar partials. Returns how many were
/// removed; a missing `dest_root` counts as zero.
pub fn sweep_partial_archives(dest_root: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(dest_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || !is_partial_archive(&path) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(?path, "removed stale partial archive");
                removed += 1;
            }
            Err(e) => warn!(?path, error = %e, "failed to remove stale partial archive"),
        }
    }
    Ok(removed)
}

fn is_partial_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| {
            (n.starts_with(self::zip::STAGING_PREFIX) && n.ends_with(self::zip::STAGING_SUFFIX))
                || (n.starts_with('.') && n.ends_with(self::rar::PARTIAL_SUFFIX))
        })
        .unwrap_or(false)
}

/// Number of regular files anywhere below `dir`
pub(crate) fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NameNormalizer;
    use std::io::Read;
    use tempfile::TempDir;

    fn name(title: &str, year: &str) -> ArchiveName {
        NameNormalizer::default().normalize(title, year)
    }

    fn populate(scratch: &Path) {
        std::fs::create_dir_all(scratch.join("app/data")).unwrap();
        std::fs::write(scratch.join("app/game.bin"), b"game").unwrap();
        std::fs::write(scratch.join("app/data/level1.dat"), b"level").unwrap();
        std::fs::write(scratch.join("goggame.info"), b"{}").unwrap();
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let file = std::fs::File::open(archive).unwrap();
        let mut zip = ::zip::ZipArchive::new(file).unwrap();
        let mut names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn builds_zip_with_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = temp_dir.path().join("scratch");
        let dest = temp_dir.path().join("dest");
        populate(&scratch);

        let outcome = ArchiveBuilder::zip()
            .build(&scratch, &name("Some Game", "2019"), &dest)
            .await
            .unwrap();

        let expected = dest.join("Some Game (W_P) (2019).zip");
        assert_eq!(outcome, BuildOutcome::Written(expected.clone()));
        assert_eq!(
            entry_names(&expected),
            vec!["app/data/level1.dat", "app/game.bin", "goggame.info"]
        );

        let file = std::fs::File::open(&expected).unwrap();
        let mut zip = ::zip::ZipArchive::new(file).unwrap();
        let mut content = String::new();
        zip.by_name("app/game.bin")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "game");
    }

    #[tokio::test]
    async fn empty_workspace_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = temp_dir.path().join("scratch");
        std::fs::create_dir_all(scratch.join("empty/dir")).unwrap();
        let dest = temp_dir.path().join("dest");

        let outcome = ArchiveBuilder::zip()
            .build(&scratch, &name("Game", "0000"), &dest)
            .await
            .unwrap();
        assert_eq!(outcome, BuildOutcome::Empty);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn overwrite_replaces_existing_archive() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = temp_dir.path().join("scratch");
        let dest = temp_dir.path().join("dest");
        populate(&scratch);
        std::fs::create_dir_all(&dest).unwrap();
        let existing = dest.join("Game (W_P).zip");
        std::fs::write(&existing, b"stale").unwrap();

        let outcome = ArchiveBuilder::zip()
            .build(&scratch, &name("Game", "0000"), &dest)
            .await
            .unwrap();
        assert_eq!(outcome, BuildOutcome::Written(existing.clone()));
        assert_eq!(entry_names(&existing).len(), 3);
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn rename_and_skip_collisions() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = temp_dir.path().join("scratch");
        let dest = temp_dir.path().join("dest");
        populate(&scratch);
        std::fs::create_dir_all(&dest).unwrap();
        let existing = dest.join("Game (W_P).zip");
        std::fs::write(&existing, b"stale").unwrap();

        let renamed = ArchiveBuilder::zip()
            .with_collision(FileCollisionAction::Rename)
            .build(&scratch, &name("Game", "0000"), &dest)
            .await
            .unwrap();
        assert_eq!(
            renamed,
            BuildOutcome::Written(dest.join("Game (W_P) (1).zip"))
        );

        let skipped = ArchiveBuilder::zip()
            .with_collision(FileCollisionAction::Skip)
            .build(&scratch, &name("Game", "0000"), &dest)
            .await
            .unwrap();
        assert_eq!(skipped, BuildOutcome::Skipped(existing.clone()));
        assert_eq!(std::fs::read(&existing).unwrap(), b"stale");
    }

    #[tokio::test]
    async fn failed_rar_leaves_no_archive() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = temp_dir.path().join("scratch");
        let dest = temp_dir.path().join("dest");
        populate(&scratch);

        let builder = ArchiveBuilder::rar(RarCli::new(PathBuf::from("/nonexistent/rar")));
        let result = builder.build(&scratch, &name("Game", "2001"), &dest).await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn target_path_uses_format_extension() {
        let zip = ArchiveBuilder::zip();
        let rar = ArchiveBuilder::rar(RarCli::new(PathBuf::from("rar")));
        let n = name("Game", "2001");
        assert_eq!(
            zip.target_path(&n, Path::new("/dest")),
            PathBuf::from("/dest/Game (W_P) (2001).zip")
        );
        assert_eq!(
            rar.target_path(&n, Path::new("/dest")),
            PathBuf::from("/dest/Game (W_P) (2001).rar")
        );
    }

    #[test]
    fn counts_nested_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        assert_eq!(count_files(root), 0);

        std::fs::create_dir_all(root.join("a/b")).unwrap();
        assert_eq!(count_files(root), 0, "directories alone do not count");

        std::fs::write(root.join("a/b/data.bin"), b"x").unwrap();
        std::fs::write(root.join("top.txt"), b"y").unwrap();
        assert_eq!(count_files(root), 2);
    }

    #[tokio::test]
    async fn extend_adds_to_existing_archive() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        let dest = temp_dir.path().join("dest");
        populate(&first);
        std::fs::create_dir_all(second.join("dlc")).unwrap();
        std::fs::write(second.join("dlc/pack.dat"), b"dlc").unwrap();

        let builder = ArchiveBuilder::zip().with_collision(FileCollisionAction::Skip);
        let n = name("Game", "2001");
        let archive = dest.join("Game (W_P) (2001).zip");
        assert_eq!(
            builder.build(&first, &n, &dest).await.unwrap(),
            BuildOutcome::Written(archive.clone())
        );
        assert_eq!(
            builder.extend(&second, &n, &dest).await.unwrap(),
            BuildOutcome::Written(archive.clone())
        );
        assert_eq!(
            entry_names(&archive),
            vec![
                "app/data/level1.dat",
                "app/game.bin",
                "dlc/pack.dat",
                "goggame.info"
            ]
        );
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn extend_without_existing_archive_builds_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = temp_dir.path().join("scratch");
        let dest = temp_dir.path().join("dest");
        populate(&scratch);

        let outcome = ArchiveBuilder::zip()
            .extend(&scratch, &name("Game", "0000"), &dest)
            .await
            .unwrap();
        let archive = dest.join("Game (W_P).zip");
        assert_eq!(outcome, BuildOutcome::Written(archive.clone()));
        assert_eq!(entry_names(&archive).len(), 3);
    }

    #[test]
    fn sweep_removes_only_staging_files() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path();
        std::fs::write(dest.join(".repack-a1b2.zip.partial"), b"x").unwrap();
        std::fs::write(dest.join(".Game (W_P).rar.partial.rar"), b"x").unwrap();
        std::fs::write(dest.join("Game (W_P).zip"), b"keep").unwrap();
        std::fs::write(dest.join("notes.partial"), b"keep").unwrap();

        assert_eq!(sweep_partial_archives(dest).unwrap(), 2);
        let mut left: Vec<String> = std::fs::read_dir(dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["Game (W_P).zip", "notes.partial"]);
        assert_eq!(sweep_partial_archives(&dest.join("missing")).unwrap(), 0);
    }
}

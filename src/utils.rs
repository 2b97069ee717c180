//! Utility functions for file operations

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Get a unique path for a file, handling collisions according to the specified action
///
/// # Arguments
///
/// * `path` - The desired file path
/// * `action` - How to handle file collisions
///
/// # Returns
///
/// Returns the final path to use. For Rename action, this may have a suffix added.
/// For Skip action, returns an error if the file already exists.
/// For Overwrite action, returns the original path unchanged.
///
/// # Examples
///
/// ```
/// use repack_watch::utils::get_unique_path;
/// use repack_watch::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/Some Game (W_P) (2019).zip");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If the archive exists, returns "/tmp/Some Game (W_P) (2019) (1).zip"
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::FileCollision {
                    path: path.to_path_buf(),
                    reason: "File already exists and collision action is Skip".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "Cannot extract file stem".to_string(),
                })?;

            let extension = path.extension().and_then(|e| e.to_str());

            let parent = path.parent().ok_or_else(|| Error::InvalidPath {
                path: path.to_path_buf(),
                reason: "Cannot extract parent directory".to_string(),
            })?;

            // Try adding (1), (2), (3), ... until we find a unique name
            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(Error::FileCollision {
                path: path.to_path_buf(),
                reason: "Could not find unique filename after 9999 attempts".to_string(),
            })
        }
    }
}

/// Move a file, falling back to copy and delete across filesystems
///
/// The processed-items area may live on a different mount than the watch
/// folder, where `rename` fails with `EXDEV`.
pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!(?from, ?to, "cross-device move, copying instead");
            if let Err(copy_err) = tokio::fs::copy(from, to).await {
                // a partial copy must not pass for a relocated file
                let _ = tokio::fs::remove_file(to).await;
                return Err(copy_err);
            }
            tokio::fs::remove_file(from).await
        }
        result => result,
    }
}

/// Move a directory tree, falling back to copy and delete across filesystems
pub async fn move_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!(?from, ?to, "cross-device directory move, copying instead");
            let (source, target) = (from.to_path_buf(), to.to_path_buf());
            let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &target))
                .await
                .map_err(std::io::Error::other)?;
            if let Err(copy_err) = copied {
                // a partial copy must not pass for a relocated directory
                let _ = tokio::fs::remove_dir_all(to).await;
                return Err(copy_err);
            }
            tokio::fs::remove_dir_all(from).await
        }
        result => result,
    }
}

/// Recursively copy the tree at `from` to `to`, which must not exist yet
pub(crate) fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(std::io::Error::other)?;
        let target = to.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(link)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, _target: &Path) -> std::io::Result<()> {
    debug!(?link, "symlink not copied");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_get_unique_path_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Game (W_P).zip");

        for action in [
            FileCollisionAction::Rename,
            FileCollisionAction::Overwrite,
            FileCollisionAction::Skip,
        ] {
            assert_eq!(get_unique_path(&path, action).unwrap(), path);
        }
    }

    #[test]
    fn test_get_unique_path_rename_with_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Game (W_P) (2019).zip");
        fs::write(&path, "existing").unwrap();

        let result = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(result, temp_dir.path().join("Game (W_P) (2019) (1).zip"));
    }

    #[test]
    fn test_get_unique_path_rename_sequential() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("setup.exe");
        fs::write(&path, "a").unwrap();
        fs::write(temp_dir.path().join("setup (1).exe"), "b").unwrap();

        let result = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(result, temp_dir.path().join("setup (2).exe"));
    }

    #[test]
    fn test_get_unique_path_rename_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("README");
        fs::write(&path, "existing").unwrap();

        let result = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(result, temp_dir.path().join("README (1)"));
    }

    #[test]
    fn test_get_unique_path_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Game (W_P).zip");
        fs::write(&path, "existing").unwrap();

        let result = get_unique_path(&path, FileCollisionAction::Overwrite).unwrap();
        assert_eq!(result, path);
    }

    #[test]
    fn test_get_unique_path_skip_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Game (W_P).zip");
        fs::write(&path, "existing").unwrap();

        match get_unique_path(&path, FileCollisionAction::Skip) {
            Err(Error::FileCollision { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected FileCollision, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn move_file_renames_within_filesystem() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("setup.exe");
        let to = temp_dir.path().join("moved.exe");
        fs::write(&from, "payload").unwrap();

        move_file(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "payload");
    }

    #[tokio::test]
    async fn move_file_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = move_file(
            &temp_dir.path().join("missing.exe"),
            &temp_dir.path().join("moved.exe"),
        )
        .await;
        assert!(result.is_err());
        assert!(!temp_dir.path().join("moved.exe").exists());
    }

    #[test]
    fn copy_tree_reproduces_nested_layout() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("extras");
        fs::create_dir_all(from.join("manuals/en")).unwrap();
        fs::create_dir_all(from.join("empty")).unwrap();
        fs::write(from.join("soundtrack.mp3"), "music").unwrap();
        fs::write(from.join("manuals/en/manual.pdf"), "pdf").unwrap();

        let to = temp_dir.path().join("copy");
        copy_tree(&from, &to).unwrap();

        assert_eq!(fs::read_to_string(to.join("soundtrack.mp3")).unwrap(), "music");
        assert_eq!(fs::read_to_string(to.join("manuals/en/manual.pdf")).unwrap(), "pdf");
        assert!(to.join("empty").is_dir());
        assert!(from.join("manuals/en/manual.pdf").exists(), "source is left alone");
    }

    #[tokio::test]
    async fn move_dir_relocates_whole_tree() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("extras");
        fs::create_dir_all(from.join("art")).unwrap();
        fs::write(from.join("art/cover.png"), "png").unwrap();

        let to = temp_dir.path().join("processed").join("extras");
        fs::create_dir_all(to.parent().unwrap()).unwrap();
        move_dir(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(to.join("art/cover.png")).unwrap(), "png");
    }
}

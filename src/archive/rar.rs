//! External `rar` binary driver

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

const BINARY_NAME: &str = "rar";

/// Name suffix of the partial file rar writes to
pub(crate) const PARTIAL_SUFFIX: &str = ".partial.rar";

/// Creates rar archives with a recovery record by shelling out to `rar`
#[derive(Clone, Debug)]
pub struct RarCli {
    binary_path: PathBuf,
}

impl RarCli {
    /// Use the binary at `binary_path`
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find rar in PATH
    pub fn from_path() -> Option<Self> {
        which::which(BINARY_NAME).ok().map(Self::new)
    }

    /// Explicit `rar_path` first, then PATH when `search_path` is enabled
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        match &tools.rar_path {
            Some(path) => Ok(Self::new(path.clone())),
            None if tools.search_path => Self::from_path().ok_or_else(|| {
                Error::NotSupported(format!("{} not found in PATH", BINARY_NAME))
            }),
            None => Err(Error::NotSupported(format!(
                "no {} path configured and PATH search disabled",
                BINARY_NAME
            ))),
        }
    }

    /// Path of the binary in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Archive the contents of `source` (not the directory itself) into `dest`
    ///
    /// rar writes to a partial file next to `dest`, which is renamed over
    /// `dest` on success and removed on failure. A partial left by a killed
    /// run is discarded first. With `base`, the partial starts as a copy of
    /// that archive and rar adds to it.
    pub async fn archive(&self, source: &Path, dest: &Path, base: Option<&Path>) -> Result<()> {
        let partial = partial_path(dest)?;

        match tokio::fs::remove_file(&partial).await {
            Ok(()) => debug!(?partial, "discarded stale partial archive"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(base) = base {
            tokio::fs::copy(base, &partial).await?;
        }

        let mut pattern = OsString::from(source.as_os_str());
        pattern.push("/*");

        debug!(?source, ?partial, "running rar");
        let output = Command::new(&self.binary_path)
            .args(["a", "-htb", "-rr", "-r", "-ep1", "-y", "-idq"])
            .arg(&partial)
            .arg(&pattern)
            .output()
            .await;

        let failure = match output {
            Err(e) => Some(format!("Failed to execute rar: {}", e)),
            Ok(out) if !out.status.success() => Some(format!(
                "rar exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Ok(_) => None,
        };

        if let Some(reason) = failure {
            if let Err(e) = tokio::fs::remove_file(&partial).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(?partial, error = %e, "failed to remove partial archive");
            }
            return Err(Error::ExternalTool(reason));
        }

        tokio::fs::rename(&partial, dest).await?;
        Ok(())
    }
}

/// `<dir>/.<file name>.partial.rar`
pub(crate) fn partial_path(dest: &Path) -> Result<PathBuf> {
    let file_name = dest.file_name().ok_or_else(|| Error::InvalidPath {
        path: dest.to_path_buf(),
        reason: "archive path has no file name".to_string(),
    })?;
    let mut partial = OsString::from(".");
    partial.push(file_name);
    partial.push(PARTIAL_SUFFIX);
    Ok(dest.with_file_name(partial))
}

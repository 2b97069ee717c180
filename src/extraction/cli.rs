//! CLI-based extractor using the external innoextract binary

use super::InstallerExtractor;
use super::parser::parse_product_id;
use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::types::ProductId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Binary looked up on PATH when no explicit path is configured
const BINARY_NAME: &str = "innoextract";

/// Extractor that shells out to `innoextract`
///
/// Identification runs `innoextract --gog-game-id <installer>`; extraction runs
/// `innoextract <extra args> --output-dir <dir> <installer>`.
pub struct InnoextractCli {
    binary_path: PathBuf,
    extra_args: Vec<String>,
}

impl InnoextractCli {
    /// Create an extractor with an explicit binary path and the default
    /// `--gog --exclude-temp` extraction flags
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            extra_args: ToolsConfig::default().extra_extract_args,
        }
    }

    /// Replace the flags passed before `--output-dir`
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Attempt to find innoextract in PATH
    pub fn from_path() -> Option<Self> {
        which::which(BINARY_NAME).ok().map(Self::new)
    }

    /// Build from tool configuration
    ///
    /// An explicit `extractor_path` wins; otherwise PATH is searched when
    /// `search_path` is enabled.
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        let binary_path = match &tools.extractor_path {
            Some(path) => path.clone(),
            None if tools.search_path => which::which(BINARY_NAME).map_err(|_| {
                Error::NotSupported(format!("{} not found in PATH", BINARY_NAME))
            })?,
            None => {
                return Err(Error::NotSupported(format!(
                    "no {} path configured and PATH search disabled",
                    BINARY_NAME
                )));
            }
        };

        Ok(Self::new(binary_path).with_extra_args(tools.extra_extract_args.clone()))
    }

    /// Path of the binary in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl InstallerExtractor for InnoextractCli {
    async fn identify(&self, installer: &Path) -> Result<ProductId> {
        let output = Command::new(&self.binary_path)
            .arg("--gog-game-id")
            .arg(installer)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute innoextract: {}", e)))?;

        // the exit code is not trusted here, only the printed identifier
        parse_product_id(&output.stdout).ok_or_else(|| {
            Error::ExternalTool(format!(
                "no product identifier in innoextract output (exit status {})",
                output.status
            ))
        })
    }

    async fn extract(&self, installer: &Path, output_dir: &Path) -> Result<()> {
        debug!(?installer, ?output_dir, "running innoextract");

        let output = Command::new(&self.binary_path)
            .args(&self.extra_args)
            .arg("--output-dir")
            .arg(output_dir)
            .arg(installer)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute innoextract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTool(format!(
                "innoextract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "cli-innoextract"
    }
}

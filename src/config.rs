//! Configuration types for repack-watch
//!
//! Every field has a default, so an empty configuration file is valid. Settings
//! are grouped into sections that map one-to-one onto TOML tables:
//!
//! ```toml
//! [folders]
//! watch_dir = "/WATCHED"
//! dest_dir = "/DEST"
//!
//! [archive]
//! format = "zip"
//!
//! [watch]
//! scan_interval = 5
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder replaced by the product identifier in the catalog endpoint
pub const ID_PLACEHOLDER: &str = "{id}";

/// Main configuration for the repack pipeline
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watch, destination and processed-items locations
    pub folders: FoldersConfig,

    /// External tool paths
    pub tools: ToolsConfig,

    /// Remote catalog lookup
    pub metadata: MetadataConfig,

    /// Output name derivation
    pub naming: NamingConfig,

    /// Archive format and collision handling
    pub archive: ArchiveConfig,

    /// What happens to originals after archiving
    pub relocation: RelocationConfig,

    /// Which files count as installers
    pub discovery: DiscoveryConfig,

    /// Poll loop settings
    pub watch: WatchConfig,
}

/// Folder layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FoldersConfig {
    /// Drop folder scanned for installers (default: "/WATCHED")
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Where finished archives are written (default: "/DEST")
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,

    /// Processed-items area (None = `<watch_dir>/processed`)
    #[serde(default)]
    pub processed_dir: Option<PathBuf>,

    /// Name of the processed-state file inside the watch folder
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Root for scratch workspaces (None = the watch folder)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for FoldersConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            dest_dir: default_dest_dir(),
            processed_dir: None,
            state_file: default_state_file(),
            scratch_dir: None,
        }
    }
}

/// External tool paths (innoextract, rar)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the innoextract executable (auto-detected if None)
    #[serde(default)]
    pub extractor_path: Option<PathBuf>,

    /// Path to the rar executable (auto-detected if None, only needed for `format = "rar"`)
    #[serde(default)]
    pub rar_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Arguments passed to every extraction run before `--output-dir`
    #[serde(default = "default_extract_args")]
    pub extra_extract_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            extractor_path: None,
            rar_path: None,
            search_path: true,
            extra_extract_args: default_extract_args(),
        }
    }
}

/// Catalog lookup settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Endpoint template; `{id}` is replaced by the product identifier
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout (default: 30 seconds)
    #[serde(default = "default_metadata_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_metadata_timeout(),
        }
    }
}

/// Output naming
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Provenance marker embedded in every produced name (default: "W_P")
    #[serde(default = "default_tag")]
    pub tag: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self { tag: default_tag() }
    }
}

/// Archive output settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archive format
    #[serde(default)]
    pub format: ArchiveFormat,

    /// What to do when an archive with the same name already exists
    #[serde(default)]
    pub collision: FileCollisionAction,

    /// Deflate level for zip output (None = library default)
    #[serde(default)]
    pub compression_level: Option<i32>,
}

/// Archive format produced by the pipeline
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    /// In-process zip writer (default)
    #[default]
    Zip,
    /// External `rar` binary with a recovery record
    Rar,
}

impl ArchiveFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Rar => "rar",
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename
    Rename,
    /// Overwrite existing file (default, keeps re-runs from producing duplicates)
    #[default]
    Overwrite,
    /// Refuse to write, keep existing
    Skip,
}

/// Disposition of originals
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelocationConfig {
    /// What to do with installers after a successful archive
    #[serde(default)]
    pub action: RelocationAction,
}

/// Action to take with installers after archiving
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationAction {
    /// Move into `<processed_dir>/<archive name>/` (default)
    #[default]
    MoveToProcessed,
    /// Delete the originals
    Delete,
}

/// Installer detection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// File extensions treated as installers, compared case-insensitively
    #[serde(default = "default_installer_extensions")]
    pub installer_extensions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            installer_extensions: default_installer_extensions(),
        }
    }
}

/// Poll loop configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Scan interval (default: 5 seconds)
    #[serde(default = "default_scan_interval", with = "duration_serde")]
    pub scan_interval: Duration,

    /// Also wake up early on filesystem notifications (default: false)
    #[serde(default)]
    pub use_notify: bool,

    /// Quiet period after a notification before scanning, in milliseconds
    #[serde(default = "default_settle_delay", with = "millis_serde")]
    pub settle_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            use_notify: false,
            settle_delay: default_settle_delay(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// The result is validated before it is returned.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if !self.metadata.endpoint.contains(ID_PLACEHOLDER) {
            return Err(Error::Config {
                message: format!("endpoint must contain {}", ID_PLACEHOLDER),
                key: Some("metadata.endpoint".to_string()),
            });
        }
        if self.discovery.installer_extensions.is_empty() {
            return Err(Error::Config {
                message: "at least one installer extension is required".to_string(),
                key: Some("discovery.installer_extensions".to_string()),
            });
        }
        if self.watch.scan_interval.is_zero() {
            return Err(Error::Config {
                message: "scan interval must be greater than zero".to_string(),
                key: Some("watch.scan_interval".to_string()),
            });
        }
        if self.folders.state_file.is_empty()
            || self.folders.state_file.contains(['/', '\\'])
        {
            return Err(Error::Config {
                message: "state file must be a plain file name".to_string(),
                key: Some("folders.state_file".to_string()),
            });
        }
        if self.folders.dest_dir == self.folders.watch_dir {
            return Err(Error::Config {
                message: "destination must differ from the watch folder".to_string(),
                key: Some("folders.dest_dir".to_string()),
            });
        }
        if self.processed_dir() == self.folders.watch_dir {
            return Err(Error::Config {
                message: "processed-items area must differ from the watch folder".to_string(),
                key: Some("folders.processed_dir".to_string()),
            });
        }
        Ok(())
    }

    /// Watch folder
    pub fn watch_dir(&self) -> &Path {
        &self.folders.watch_dir
    }

    /// Destination folder for archives
    pub fn dest_dir(&self) -> &Path {
        &self.folders.dest_dir
    }

    /// Processed-items area, defaulting to `<watch_dir>/processed`
    pub fn processed_dir(&self) -> PathBuf {
        self.folders
            .processed_dir
            .clone()
            .unwrap_or_else(|| self.folders.watch_dir.join("processed"))
    }

    /// Full path of the processed-state file
    pub fn state_file_path(&self) -> PathBuf {
        self.folders.watch_dir.join(&self.folders.state_file)
    }

    /// Where scratch workspaces are created
    pub fn scratch_root(&self) -> PathBuf {
        self.folders
            .scratch_dir
            .clone()
            .unwrap_or_else(|| self.folders.watch_dir.clone())
    }
}

// Default value functions
fn default_watch_dir() -> PathBuf {
    PathBuf::from("/WATCHED")
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("/DEST")
}

fn default_state_file() -> String {
    "processed_files.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_extract_args() -> Vec<String> {
    vec!["--gog".to_string(), "--exclude-temp".to_string()]
}

fn default_endpoint() -> String {
    "https://api.gog.com/products/{id}".to_string()
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_tag() -> String {
    "W_P".to_string()
}

fn default_installer_extensions() -> Vec<String> {
    vec!["exe".to_string()]
}

fn default_scan_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(500)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.watch_dir(), Path::new("/WATCHED"));
        assert_eq!(config.dest_dir(), Path::new("/DEST"));
        assert_eq!(config.processed_dir(), PathBuf::from("/WATCHED/processed"));
        assert_eq!(
            config.state_file_path(),
            PathBuf::from("/WATCHED/processed_files.json")
        );
        assert_eq!(config.scratch_root(), PathBuf::from("/WATCHED"));
        assert_eq!(config.naming.tag, "W_P");
        assert_eq!(config.archive.format, ArchiveFormat::Zip);
        assert_eq!(config.archive.collision, FileCollisionAction::Overwrite);
        assert_eq!(config.relocation.action, RelocationAction::MoveToProcessed);
        assert_eq!(config.watch.scan_interval, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sections_parse_from_toml() {
        let raw = r#"
            [folders]
            watch_dir = "/in"
            dest_dir = "/out"
            processed_dir = "/done"

            [archive]
            format = "rar"
            collision = "rename"

            [relocation]
            action = "delete"

            [watch]
            scan_interval = 60
            use_notify = true
            settle_delay = 250
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.watch_dir(), Path::new("/in"));
        assert_eq!(config.processed_dir(), PathBuf::from("/done"));
        assert_eq!(config.archive.format, ArchiveFormat::Rar);
        assert_eq!(config.archive.collision, FileCollisionAction::Rename);
        assert_eq!(config.relocation.action, RelocationAction::Delete);
        assert_eq!(config.watch.scan_interval, Duration::from_secs(60));
        assert_eq!(config.watch.settle_delay, Duration::from_millis(250));
        assert!(config.watch.use_notify);
        // untouched sections keep their defaults
        assert_eq!(config.tools.extra_extract_args, vec!["--gog", "--exclude-temp"]);
    }

    #[test]
    fn endpoint_without_placeholder_is_rejected() {
        let mut config = Config::default();
        config.metadata.endpoint = "https://catalog.example/products".to_string();
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("metadata.endpoint"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn dest_equal_to_watch_is_rejected() {
        let mut config = Config::default();
        config.folders.dest_dir = config.folders.watch_dir.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_and_empty_extensions_are_rejected() {
        let mut config = Config::default();
        config.watch.scan_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discovery.installer_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn state_file_with_separator_is_rejected() {
        let mut config = Config::default();
        config.folders.state_file = "nested/state.json".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_and_validates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repack.toml");
        std::fs::write(&path, "[naming]\ntag = \"XYZ\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.naming.tag, "XYZ");

        std::fs::write(&path, "[metadata]\nendpoint = \"http://x/\"\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn from_file_missing_file_is_config_error() {
        let result = Config::from_file(Path::new("/nonexistent/repack.toml"));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repack.toml");
        std::fs::write(&path, "[folders\nwatch_dir = 3").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(Error::ConfigParse(_))
        ));
    }
}

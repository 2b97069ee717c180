//! Watch-folder layouts, collaborator doubles and catalog mocks

use async_trait::async_trait;
use repack_watch::{Config, Error, InstallerExtractor, ProductId, Result};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Temporary watch/dest layout with a config pointing at it
pub struct TestFolders {
    /// Keeps the directories alive
    pub temp_dir: TempDir,
    /// Configuration using the temporary folders
    pub config: Config,
}

impl TestFolders {
    /// Fresh folders; the catalog endpoint points at `catalog_uri`
    pub fn new(catalog_uri: &str) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut config = Config::default();
        config.folders.watch_dir = temp_dir.path().join("WATCHED");
        config.folders.dest_dir = temp_dir.path().join("DEST");
        config.metadata.endpoint = format!("{}/products/{{id}}", catalog_uri);
        config.metadata.timeout = std::time::Duration::from_secs(5);
        std::fs::create_dir_all(&config.folders.watch_dir).expect("watch dir");
        Self { temp_dir, config }
    }

    /// The watch folder
    pub fn watch(&self) -> PathBuf {
        self.config.folders.watch_dir.clone()
    }

    /// The destination folder
    pub fn dest(&self) -> PathBuf {
        self.config.folders.dest_dir.clone()
    }

    /// The processed-items area
    pub fn processed(&self) -> PathBuf {
        self.config.processed_dir()
    }

    /// Create a file with placeholder content below the watch folder
    pub fn drop_file(&self, relative: &str) -> PathBuf {
        let path = self.watch().join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        std::fs::write(&path, b"installer bytes").expect("write file");
        path
    }
}

/// Extractor double keyed by installer file name
///
/// Identification returns the configured identifier; extraction writes
/// `app/<file stem>.dat`. Installers with no configured identifier fail
/// identification; names in `failing` fail extraction.
#[derive(Default)]
pub struct ScriptedExtractor {
    ids: HashMap<String, String>,
    failing: Vec<String>,
    extracted: Mutex<Vec<PathBuf>>,
}

impl ScriptedExtractor {
    /// Empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `id` for installer `file_name`
    pub fn with_id(mut self, file_name: &str, id: &str) -> Self {
        self.ids.insert(file_name.to_string(), id.to_string());
        self
    }

    /// Fail extraction of `file_name`
    pub fn failing(mut self, file_name: &str) -> Self {
        self.failing.push(file_name.to_string());
        self
    }

    /// Installers extracted so far, in call order
    pub fn extracted(&self) -> Vec<PathBuf> {
        self.extracted.lock().expect("lock").clone()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl InstallerExtractor for ScriptedExtractor {
    async fn identify(&self, installer: &Path) -> Result<ProductId> {
        self.ids
            .get(&file_name(installer))
            .and_then(|id| ProductId::new(id))
            .ok_or_else(|| Error::ExternalTool("no product identifier".to_string()))
    }

    async fn extract(&self, installer: &Path, output_dir: &Path) -> Result<()> {
        self.extracted
            .lock()
            .expect("lock")
            .push(installer.to_path_buf());
        let name = file_name(installer);
        if self.failing.contains(&name) {
            return Err(Error::ExternalTool(format!("{} exited with 1", name)));
        }
        let stem = installer
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let app = output_dir.join("app");
        tokio::fs::create_dir_all(&app).await?;
        tokio::fs::write(app.join(format!("{}.dat", stem)), b"payload").await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Zip at `path` holding `entries` (name, content), as an earlier pass would
/// have left it
pub fn seed_archive(path: &Path, entries: &[(&str, &str)]) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
    let file = std::fs::File::create(path).expect("create archive");
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, zip::write::FileOptions::default())
            .expect("start entry");
        std::io::Write::write_all(&mut zip, content.as_bytes()).expect("write entry");
    }
    zip.finish().expect("finish archive");
}

/// Catalog answering `id` with `title` and `release_date`
pub async fn mount_product(server: &MockServer, id: &str, title: &str, release_date: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/products/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "title": title,
            "release_date": release_date,
        })))
        .mount(server)
        .await;
}

/// Catalog answering `id` with 404
pub async fn mount_missing(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/products/{}", id)))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

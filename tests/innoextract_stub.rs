//! Full pipeline through the real `InnoextractCli` driving a shell stand-in
//! for the innoextract binary

#![cfg(unix)]

mod common;

use common::*;
use repack_watch::{ArchiveBuilder, CatalogClient, InnoextractCli, Pipeline, ProcessingUnit};
use serial_test::serial;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wiremock::MockServer;

/// Prints `GOG.com game ID is 12345678` in introspection mode; in extraction
/// mode writes `app/<installer name>.dat` below `--output-dir`
const STUB: &str = r#"#!/bin/sh
if [ "$1" = "--gog-game-id" ]; then
  echo "Inspecting \"$2\""
  echo "GOG.com game ID is 12345678"
  exit 0
fi
out=""
last=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-dir) out="$2"; shift 2 ;;
    *) last="$1"; shift ;;
  esac
done
mkdir -p "$out/app" && echo payload > "$out/app/$(basename "$last").dat"
"#;

fn write_stub(dir: &Path) -> PathBuf {
    let path = dir.join("innoextract-stub");
    std::fs::write(&path, STUB).expect("write stub");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

#[tokio::test]
#[serial]
async fn stub_binary_end_to_end() {
    let server = MockServer::start().await;
    mount_product(&server, "12345678", "Some Game: Deluxe", "2019-05-01").await;

    let folders = TestFolders::new(&server.uri());
    let installer = folders.drop_file("game_setup.exe");

    let extractor = InnoextractCli::new(write_stub(folders.temp_dir.path()));
    let resolver = CatalogClient::new(&folders.config.metadata).expect("catalog client");
    let mut pipeline = Pipeline::new(
        folders.config.clone(),
        Arc::new(extractor),
        Arc::new(resolver),
        ArchiveBuilder::zip(),
    )
    .expect("pipeline");

    let summary = pipeline.run_pass().await.expect("pass");
    assert_eq!(summary.archived, 1, "summary: {:?}", summary);

    let archive = folders.dest().join("Some Game Deluxe (W_P) (2019).zip");
    assert_eq!(zip_entries(&archive), vec!["app/game_setup.exe.dat"]);
    assert!(
        folders
            .processed()
            .join("Some Game Deluxe (W_P) (2019)")
            .join("game_setup.exe")
            .exists()
    );
    assert_eq!(
        state_keys(&folders.config.state_file_path()),
        vec![ProcessingUnit::key_for(&installer)]
    );
    assert_no_scratch(&folders.watch());
}

//! Filesystem assertions for pipeline outcomes

use repack_watch::extraction::SCRATCH_PREFIX;
use std::path::Path;

/// Sorted entry names of a zip archive
pub fn zip_entries(archive: &Path) -> Vec<String> {
    let file = std::fs::File::open(archive).expect("open archive");
    let mut zip = zip::ZipArchive::new(file).expect("read archive");
    let mut names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).expect("entry").name().to_string())
        .collect();
    names.sort();
    names
}

/// Sorted file names directly inside `dir` (empty if it does not exist)
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Panic if any scratch workspace is left in `root`
pub fn assert_no_scratch(root: &Path) {
    let leftovers: Vec<String> = file_names(root)
        .into_iter()
        .filter(|n| n.starts_with(SCRATCH_PREFIX))
        .collect();
    assert!(
        leftovers.is_empty(),
        "scratch workspaces left behind: {:?}",
        leftovers
    );
}

/// Keys stored in the state file
pub fn state_keys(state_file: &Path) -> Vec<String> {
    let raw = std::fs::read_to_string(state_file).expect("read state file");
    serde_json::from_str(&raw).expect("state file is a JSON array")
}

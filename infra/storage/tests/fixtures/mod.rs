use flex_storage::{FlexStorage, FlexStorageBuilder, Row, WithFolder};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Root folder used by every test storage: a not-yet-existing `data` directory in `tmp`.
#[must_use]
pub fn root(tmp: &TempDir) -> PathBuf {
    tmp.path().join("data")
}

/// A builder rooted at [`root`].
#[must_use]
pub fn builder(tmp: &TempDir) -> FlexStorageBuilder<WithFolder> {
    FlexStorage::builder().folder(root(tmp).display().to_string())
}

/// Converts a `json!` object literal into a row.
/// # Panics
/// * If the value is not an object.
#[must_use]
pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row literal must be an object")
}

/// Sorted names of the entries of `dir`.
/// # Panics
/// * If the directory cannot be listed.
#[must_use]
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("directory must be listable")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

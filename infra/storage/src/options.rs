//! Declarative storage configuration.

use crate::error::{Result, StorageErrorExt};
use crate::layout::LayoutKind;
use crate::meta::DEFAULT_META_CAPACITY;
use config::{Config, Environment, File};
use flex_formatter::FormatterKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const DEFAULT_KEY_FIELD: &str = "storage_key";
pub const DEFAULT_KEY_LENGTH: usize = 32;
pub const DEFAULT_RECORD_FILE: &str = "item";
pub const DEFAULT_SHARED_FILE: &str = "index";

/// Every knob of a [`FlexStorage`](crate::FlexStorage), in a serde-friendly shape.
///
/// ```toml
/// folder = "user://data/pages"
/// layout = "folder"
/// pattern = "{FOLDER}/{KEY:2}/{KEY}/item.yaml"
/// case_sensitive = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// Storage root; may be a `scheme://` stream path. For the shared layout it may also name
    /// the shared file itself (`/data/users.yaml`).
    pub folder: String,
    pub layout: LayoutKind,
    /// Path template; the layout's default when unset.
    pub pattern: Option<String>,
    /// Formatter kind; sniffed from the pattern (or shared file) extension when unset.
    pub formatter: Option<FormatterKind>,
    /// Record file name (folder layout) or shared file name (shared layout).
    pub file: Option<String>,
    /// Field that carries the key on rows handed to callers.
    pub key_field: String,
    /// Length of generated keys, `1..=64`.
    pub key_length: usize,
    pub case_sensitive: bool,
    /// Two-level sharding by key prefix; detected from `{KEY:2}` in the pattern when unset.
    pub prefixed: Option<bool>,
    /// Persist the key index instead of scanning directories on every listing.
    pub indexed: bool,
    /// Sub-map of the shared file this storage owns.
    pub prefix: Option<String>,
    /// Remove a record's directory when the record is deleted (folder layout only).
    pub delete_folder: bool,
    pub meta_cache_capacity: u64,
    /// Create the root directory when it is missing.
    pub create: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            folder: String::new(),
            layout: LayoutKind::default(),
            pattern: None,
            formatter: None,
            file: None,
            key_field: DEFAULT_KEY_FIELD.to_owned(),
            key_length: DEFAULT_KEY_LENGTH,
            case_sensitive: true,
            prefixed: None,
            indexed: false,
            prefix: None,
            delete_folder: true,
            meta_cache_capacity: DEFAULT_META_CAPACITY,
            create: true,
        }
    }
}

/// Loads [`StorageOptions`] from a configuration file, overridden by `FLEX__*` environment
/// variables (e.g. `FLEX__KEY_LENGTH=16`).
///
/// The file format follows its extension (`.toml`, `.yaml`, `.json`, ...).
///
/// # Errors
/// Returns [`StorageError::BadConfiguration`](crate::StorageError::BadConfiguration) if the file
/// is missing, unparsable, or does not match the options schema.
pub fn load_options(path: impl AsRef<Path>) -> Result<StorageOptions> {
    let path = path.as_ref();

    let builder = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix("FLEX").separator("__").convert_case(config::Case::Snake),
        );

    info!(path = %path.display(), "Loading storage options");

    builder
        .build()
        .context(format!("load_options({})", path.display()))?
        .try_deserialize::<StorageOptions>()
        .context(format!("load_options({})", path.display()))
}

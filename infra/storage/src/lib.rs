//! A flat-file record storage engine.
//! Records are field maps addressed by logical keys and persisted as human-editable files
//! (YAML, JSON, Markdown with front matter) under a storage root. All examples use temporary
//! directories to avoid writing to the real filesystem.
//!
//! # Core Features
//!
//! - **Pluggable Layouts**: one shared file for all records, one file per record, or one folder per record with room for media files.
//! - **Path Patterns**: templates such as `{FOLDER}/{KEY:2}/{KEY}/item.yaml` map keys to files, with optional two-character sharding.
//! - **Atomic Writes**: every record file is written through a unique temp file, `fsync` and `rename`, so readers never see a torn record.
//! - **Advisory Meta Cache**: existence and timestamps are cached per key and re-verified on disk before every structural change.
//! - **Self-Healing**: temp files abandoned by interrupted writes are cleaned up when a storage opens.
//!
//! # Architectural Overview
//!
//! The crate follows a layered approach:
//! 1.  **[`KeyCodec`]** and **[`PathPattern`]**: pure `key -> path` mapping.
//! 2.  **[`RecordFormatter`]**: `row <-> bytes` for one file format.
//! 3.  **[`ObjectMetaCache`]**: cached per-key existence and timestamps.
//! 4.  **[`FlexStorage`]**: the thread-safe handle orchestrating all of the above, built with
//!     the typestate [`FlexStorageBuilder`] or from declarative [`StorageOptions`].
//!
//! # Examples
//!
//! ```rust
//! use flex_storage::{FlexStorage, LayoutKind, Row, StorageError};
//! use serde_json::json;
//!
//! fn main() -> Result<(), StorageError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     # let root = tmp.path().join("users.yaml").display().to_string();
//!     // A shared-layout root may name the shared file itself.
//!     let users = FlexStorage::builder().folder(root).layout(LayoutKind::Shared).open()?;
//!
//!     let ann: Row = json!({ "name": "Ann" }).as_object().cloned().unwrap();
//!     let bob: Row = json!({ "name": "Bob" }).as_object().cloned().unwrap();
//!     users.create_rows([("ann", ann), ("bob", bob)])?;
//!
//!     // Renaming keeps the row's position in the file.
//!     users.rename_row("ann", "zed")?;
//!     let file = users.get_storage_path(Some("zed"))?;
//!     let text = std::fs::read_to_string(file).map_err(StorageError::from)?;
//!     assert!(text.find("zed:") < text.find("bob:"));
//!
//!     Ok(())
//! }
//! ```
//!
//! ```rust
//! # use flex_storage::{FlexStorage, LayoutKind, StorageError};
//! # fn main() -> Result<(), StorageError> {
//! # let tmp = tempfile::tempdir().unwrap();
//! # let root = tmp.path().display().to_string();
//! let pages = FlexStorage::builder()
//!     .folder(root)
//!     .layout(LayoutKind::FolderPerRecord)
//!     .pattern("{FOLDER}/{KEY:2}/{KEY}/page.md")
//!     .open()?;
//!
//! // Records are sharded by the first two characters of their key.
//! let path = pages.get_storage_path(Some("welcome"))?;
//! assert!(path.ends_with("we/welcome"));
//! assert!(pages.get_path_from_key("welcome").ends_with("/we/welcome/page.md"));
//! # Ok(())
//! # }
//! ```

mod builder;
mod engine;
mod error;
mod file;
mod folder;
mod index;
mod key;
mod layout;
mod meta;
mod options;
mod pattern;
mod resolver;
mod row;
mod shared;

pub use builder::{FlexStorageBuilder, NoFolder, WithFolder};
pub use engine::{FlexStorage, FlexStorageInner};
pub use error::{Result, StorageError, StorageErrorExt};
pub use flex_formatter::{
    FormatterError, FormatterKind, JsonFormatter, MarkdownFormatter, RecordFormatter,
    YamlFormatter,
};
pub use folder::{FolderOps, LocalFolders};
pub use key::{
    KeyCodec, KeyParts, MAX_KEY_LENGTH, NEW_KEY, generate_key, is_placeholder, validate_key,
};
pub use layout::LayoutKind;
pub use meta::{DEFAULT_META_CAPACITY, Meta, ObjectMetaCache};
pub use options::{
    DEFAULT_KEY_FIELD, DEFAULT_KEY_LENGTH, DEFAULT_RECORD_FILE, DEFAULT_SHARED_FILE, StorageOptions,
    load_options,
};
pub use pattern::{PathPattern, PatternVars};
pub use resolver::{PathResolver, PlainResolver, StreamResolver};
pub use row::{ERROR_FIELD, META_FIELD, RecordContent, Row, row_error, strip_transient};

//! The record storage engine.
//!
//! [`FlexStorage`] turns logical keys into record files through a [`KeyCodec`] and a
//! [`PathPattern`], delegates bytes to a [`RecordFormatter`], and keeps an [`ObjectMetaCache`]
//! consistent with what it observes on disk. The three layouts share one contract; only the
//! shared-file layout (see `shared.rs`) keeps its rows in an in-memory table.

use crate::builder::{FlexStorageBuilder, NoFolder};
use crate::error::{Result, StorageError, StorageErrorExt, op};
use crate::file;
use crate::folder::FolderOps;
use crate::index::DiskIndex;
use crate::key::{KeyCodec, is_placeholder, validate_key};
use crate::layout::LayoutKind;
use crate::meta::{Meta, ObjectMetaCache, stat_timestamp};
use crate::options::StorageOptions;
use crate::pattern::{PathPattern, PatternVars};
use crate::resolver::PathResolver;
use crate::row::{RecordContent, Row, annotate, broken, is_legacy_shape, strip_transient};
use crate::shared::SharedTable;
use flex_formatter::RecordFormatter;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tracing::{debug, warn};

pub(crate) const BROKEN_OBJECT: &str = "Broken object file";

/// Draws before giving up on finding an unused generated key.
const MAX_KEY_ATTEMPTS: usize = 1_000;

/// A key with its pending on-disk timestamp, `0` meaning removed.
pub(crate) type IndexChange = (String, i64);

/// The internal shared state of a [`FlexStorage`] instance.
#[derive(Debug)]
pub struct FlexStorageInner {
    /// Root folder in its configured (possibly `scheme://`) form, used for pattern expansion.
    pub(crate) folder: String,
    /// The resolved physical root.
    pub(crate) root: PathBuf,
    pub(crate) layout: LayoutKind,
    pub(crate) pattern: PathPattern,
    pub(crate) codec: KeyCodec,
    pub(crate) formatter: Arc<dyn RecordFormatter>,
    /// Formatter extension with its leading dot, substituted for `{EXT}`.
    pub(crate) extension: String,
    pub(crate) resolver: Arc<dyn PathResolver>,
    pub(crate) folders: Arc<dyn FolderOps>,
    pub(crate) meta: ObjectMetaCache,
    pub(crate) key_field: String,
    pub(crate) prefixed: bool,
    pub(crate) index: Option<DiskIndex>,
    /// Sub-map of the shared file this storage owns.
    pub(crate) prefix: Option<String>,
    pub(crate) delete_container: bool,
    /// Loaded shared-file rows; only used by the shared layout.
    pub(crate) table: Mutex<Option<SharedTable>>,
    /// A unique counter used to generate temporary file names.
    pub(crate) tmp_counter: AtomicU64,
}

/// A thread-safe handle to one storage root.
///
/// Every operation is synchronous and opens, reads or writes, and closes its files inline; no
/// file handle outlives a call. The handle is reference-counted and cheap to clone, but clones
/// share their caches, so two *separately opened* storages on one root only see each other's
/// writes when they re-stat the filesystem.
///
/// # Example
///
/// ```rust
/// use flex_storage::{FlexStorage, LayoutKind, Row, StorageError};
/// use serde_json::json;
///
/// # fn main() -> Result<(), StorageError> {
/// # let tmp = tempfile::tempdir().unwrap();
/// # let root = tmp.path().join("pages").display().to_string();
/// let storage = FlexStorage::builder()
///     .folder(root)
///     .layout(LayoutKind::FolderPerRecord)
///     .pattern("{FOLDER}/{KEY}/item.yaml")
///     .open()?;
///
/// let row: Row = json!({ "title": "Hello" }).as_object().cloned().unwrap();
/// let saved = storage.create_rows([("abc123", row)])?;
/// assert_eq!(saved["abc123"]["storage_key"], "abc123");
///
/// assert!(storage.has_key("abc123"));
/// assert_eq!(storage.read_row("abc123")?.unwrap()["title"], "Hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FlexStorage {
    pub(crate) inner: Arc<FlexStorageInner>,
}

impl Deref for FlexStorage {
    type Target = FlexStorageInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FlexStorage {
    #[must_use = "The storage is not opened until you call .open()"]
    pub fn builder() -> FlexStorageBuilder {
        FlexStorageBuilder::new()
    }

    /// Opens a storage described by declarative options.
    ///
    /// # Errors
    /// See [`FlexStorageBuilder::open`].
    pub fn from_options(options: &StorageOptions) -> Result<Self> {
        FlexStorageBuilder::<NoFolder>::from_options(options.clone()).open()
    }

    /// Name of the field that carries the key on returned rows.
    #[must_use]
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    #[must_use]
    pub fn layout(&self) -> LayoutKind {
        self.inner.layout
    }

    /// The resolved physical root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn formatter(&self) -> &Arc<dyn RecordFormatter> {
        &self.formatter
    }

    #[must_use]
    pub fn is_prefixed(&self) -> bool {
        self.inner.prefixed
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.inner.index.is_some()
    }

    /// Case-folds the key when the storage is case-insensitive.
    #[must_use]
    pub fn normalize_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        self.codec.normalize(key)
    }

    /// Configured-form path of the file holding `key`; the shared file for the shared layout.
    #[must_use]
    pub fn get_path_from_key(&self, key: &str) -> String {
        let parts = self.codec.parse(key, true);
        self.pattern.expand(&PatternVars::for_key(&self.folder, &parts, &self.extension))
    }

    /// Whether `key` holds a record.
    ///
    /// Per-record layouts answer from the meta cache (stat on miss); the shared layout answers
    /// from its loaded table. Invalid and placeholder keys never exist.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        let key = self.codec.normalize(key);
        if is_placeholder(&key) || !validate_key(&key) {
            return false;
        }
        match self.layout {
            LayoutKind::Shared => self.shared_contains(&key),
            LayoutKind::FolderPerRecord | LayoutKind::FilePerRecord => {
                self.meta_for(&key, false).exists()
            },
        }
    }

    /// [`has_key`](Self::has_key) for a batch, keyed by the normalized key.
    #[must_use]
    pub fn has_keys<I, K>(&self, keys: I) -> BTreeMap<String, bool>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .map(|key| {
                let key = key.as_ref();
                (self.codec.normalize(key).into_owned(), self.has_key(key))
            })
            .collect()
    }

    /// Every key holding a record, sorted, with its meta.
    ///
    /// Scans the root on every call unless the storage is indexed and the persisted index is
    /// readable.
    ///
    /// # Errors
    /// Returns [`StorageError::Io`] if the root cannot be listed.
    pub fn get_existing_keys(&self) -> Result<BTreeMap<String, Meta>> {
        if self.layout == LayoutKind::Shared {
            return self.shared_existing_keys(false);
        }
        if let Some(index) = &self.index
            && let Some(entries) = index.load()?
        {
            let keys = entries.into_iter().map(|(key, ts)| (key.clone(), Meta::new(key, ts)));
            return Ok(keys.collect());
        }
        self.build_index()
    }

    /// Rescans the root (or reloads the shared file), refreshing the meta cache and, for
    /// indexed storages, the persisted index.
    ///
    /// # Errors
    /// Returns [`StorageError::Io`] if the root cannot be listed or the index cannot be saved.
    pub fn build_index(&self) -> Result<BTreeMap<String, Meta>> {
        if self.layout == LayoutKind::Shared {
            return self.shared_existing_keys(true);
        }

        let found = self.scan()?;
        for meta in found.values() {
            self.meta.insert(meta.clone());
        }
        if let Some(index) = &self.index {
            let entries = found.iter().map(|(key, meta)| (key.clone(), meta.storage_timestamp));
            index.store(&entries.collect(), &self.tmp_counter)?;
        }

        debug!(root = %self.root.display(), count = found.len(), "Key index rebuilt");
        Ok(found)
    }

    /// Forgets everything cached about the root; the next access re-reads the filesystem.
    pub fn clear_cache(&self) {
        self.meta.invalidate();
        *self.table.lock() = None;
    }

    /// Loads the requested rows.
    ///
    /// Entries that already carry a row keep it, under their normalized key. The others are loaded,
    /// and every freshly loaded entry is also recorded in `fetched` when given. Missing and
    /// invalid keys map to `None`; undecodable records map to a row holding only `__ERROR` and
    /// `__META`.
    ///
    /// # Errors
    /// Returns [`StorageError::Io`] if a record file exists but cannot be read.
    pub fn read_rows<I, K>(
        &self,
        rows: I,
        mut fetched: Option<&mut BTreeMap<String, Option<Row>>>,
    ) -> Result<BTreeMap<String, Option<Row>>>
    where
        I: IntoIterator<Item = (K, Option<Row>)>,
        K: Into<String>,
    {
        let mut list = BTreeMap::new();
        for (key, row) in rows {
            let key: String = key.into();
            let key = self.codec.normalize(&key).into_owned();
            if let Some(row) = row {
                list.insert(key, Some(row));
                continue;
            }

            let loaded = self.load_row(&key)?;
            if let Some(fetched) = fetched.as_deref_mut() {
                fetched.insert(key.clone(), loaded.clone());
            }
            list.insert(key, loaded);
        }
        Ok(list)
    }

    /// Loads a single row.
    ///
    /// # Errors
    /// See [`read_rows`](Self::read_rows).
    pub fn read_row(&self, key: &str) -> Result<Option<Row>> {
        self.load_row(&self.codec.normalize(key))
    }

    /// Stores new records.
    ///
    /// Rows keyed by an empty string or the `@@` placeholder get a generated key. A supplied key
    /// that already holds a record is a conflict. All keys are checked before anything is
    /// written.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidKey`], [`StorageError::KeyConflict`], or
    /// [`StorageError::Io`] / [`StorageError::Format`] wrapped as `create_rows(key)`.
    pub fn create_rows<I, K>(&self, rows: I) -> Result<BTreeMap<String, Row>>
    where
        I: IntoIterator<Item = (K, Row)>,
        K: AsRef<str>,
    {
        let rows = self.checked_new_rows("create_rows", rows)?;
        if self.layout == LayoutKind::Shared {
            return self.shared_create(rows);
        }

        for key in rows.iter().filter_map(|(key, _)| key.as_deref()) {
            if self.meta_for(key, true).exists() {
                return Err(conflict(key, op("create_rows", key)));
            }
        }

        self.tracked(|changes| {
            let mut list = BTreeMap::new();
            for (key, row) in rows {
                let key = match key {
                    Some(key) => key,
                    None => self.new_key()?,
                };
                let (saved, meta) = self.save_record(&key, &row, "create_rows")?;
                changes.push((key.clone(), meta.storage_timestamp));
                list.insert(key, saved);
            }
            Ok(list)
        })
    }

    /// Overwrites records that exist; absent keys map to `None` and nothing is written for them.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidKey`] before any write, or [`StorageError::Io`] /
    /// [`StorageError::Format`] wrapped as `update_rows(key)`.
    pub fn update_rows<I, K>(&self, rows: I) -> Result<BTreeMap<String, Option<Row>>>
    where
        I: IntoIterator<Item = (K, Row)>,
        K: AsRef<str>,
    {
        let rows = self.checked_rows("update_rows", rows)?;
        if self.layout == LayoutKind::Shared {
            return self.shared_update(rows);
        }

        self.tracked(|changes| {
            let mut list = BTreeMap::new();
            for (key, row) in rows {
                if !self.meta_for(&key, true).exists() {
                    list.insert(key, None);
                    continue;
                }
                let (saved, meta) = self.save_record(&key, &row, "update_rows")?;
                changes.push((key.clone(), meta.storage_timestamp));
                list.insert(key, Some(saved));
            }
            Ok(list)
        })
    }

    /// Writes every row whether or not its key exists; placeholder keys get a generated key.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidKey`] before any write, or [`StorageError::Io`] /
    /// [`StorageError::Format`] wrapped as `replace_rows(key)`.
    pub fn replace_rows<I, K>(&self, rows: I) -> Result<BTreeMap<String, Row>>
    where
        I: IntoIterator<Item = (K, Row)>,
        K: AsRef<str>,
    {
        let rows = self.checked_new_rows("replace_rows", rows)?;
        if self.layout == LayoutKind::Shared {
            return self.shared_replace(rows);
        }

        self.tracked(|changes| {
            let mut list = BTreeMap::new();
            for (key, row) in rows {
                let key = match key {
                    Some(key) => key,
                    None => self.new_key()?,
                };
                let (saved, meta) = self.save_record(&key, &row, "replace_rows")?;
                changes.push((key.clone(), meta.storage_timestamp));
                list.insert(key, saved);
            }
            Ok(list)
        })
    }

    /// Deletes records, returning what each one held.
    ///
    /// Absent keys map to `None` and touch nothing. With the folder layout (and `delete_folder`
    /// on) the record's whole container directory goes too, but never the storage root.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidKey`] before any removal, or [`StorageError::Io`] wrapped
    /// as `delete_rows(key)`.
    pub fn delete_rows<I, K>(&self, keys: I) -> Result<BTreeMap<String, Option<RecordContent>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let keys = self.checked_keys("delete_rows", keys)?;
        if self.layout == LayoutKind::Shared {
            return self.shared_delete(keys);
        }

        self.tracked(|changes| {
            let mut list = BTreeMap::new();
            for key in keys {
                if !self.meta_for(&key, true).exists() {
                    list.insert(key, None);
                    continue;
                }
                let prior = self.delete_record(&key)?;
                changes.push((key.clone(), 0));
                list.insert(key, Some(prior));
            }
            Ok(list)
        })
    }

    /// Copies the record at `src` to the absent key `dst`.
    ///
    /// Returns `false` if `src` holds no record. The folder layout copies the whole container
    /// directory, media included.
    ///
    /// # Errors
    /// Returns [`StorageError::KeyConflict`] if `dst` already exists, or [`StorageError::Io`]
    /// wrapped as `copy_row(src, dst)`.
    pub fn copy_row(&self, src: &str, dst: &str) -> Result<bool> {
        let context = op("copy_row", format!("{src}, {dst}"));
        let src = self.checked_key(src, &context)?;
        let dst = self.checked_key(dst, &context)?;

        match self.layout {
            LayoutKind::Shared => self.shared_copy(&src, &dst, &context),
            LayoutKind::FolderPerRecord | LayoutKind::FilePerRecord => {
                if self.meta_for(&dst, true).exists() {
                    return Err(conflict(&dst, context));
                }
                if !self.meta_for(&src, true).exists() {
                    return Ok(false);
                }

                self.tracked(|changes| {
                    if self.layout.owns_container() {
                        let from = self.container_path(&src)?;
                        let to = self.container_path(&dst)?;
                        self.folders.copy(&from, &to).context(context.clone())?;
                    } else {
                        let from = self.record_file(&src)?;
                        let Some(data) = file::read(&from).context(context.clone())? else {
                            return Ok(false);
                        };
                        file::save(&self.record_file(&dst)?, &data, &self.tmp_counter)
                            .context(context.clone())?;
                    }

                    let meta = self.meta_for(&dst, true);
                    changes.push((dst.into_owned(), meta.storage_timestamp));
                    debug!(src = %src, dst = %meta.storage_key, "Record copied");
                    Ok(true)
                })
            },
        }
    }

    /// Moves the record at `src` to the absent key `dst`.
    ///
    /// Returns `false` if `src` holds no record, and `true` without touching anything when both
    /// keys normalize to the same key.
    ///
    /// # Errors
    /// Returns [`StorageError::KeyConflict`] if `dst` already exists, or [`StorageError::Io`]
    /// wrapped as `rename_row(src, dst)`.
    pub fn rename_row(&self, src: &str, dst: &str) -> Result<bool> {
        let context = op("rename_row", format!("{src}, {dst}"));
        let src = self.checked_key(src, &context)?;
        let dst = self.checked_key(dst, &context)?;
        if src == dst {
            return Ok(true);
        }

        match self.layout {
            LayoutKind::Shared => self.shared_rename(&src, &dst, &context),
            LayoutKind::FolderPerRecord | LayoutKind::FilePerRecord => {
                if self.meta_for(&dst, true).exists() {
                    return Err(conflict(&dst, context));
                }
                if !self.meta_for(&src, true).exists() {
                    return Ok(false);
                }

                self.tracked(|changes| {
                    if self.layout.owns_container() {
                        let from = self.container_path(&src)?;
                        let to = self.container_path(&dst)?;
                        self.folders.move_dir(&from, &to).context(context.clone())?;
                    } else {
                        let from = self.record_file(&src)?;
                        let to = self.record_file(&dst)?;
                        file::rename(&from, &to).context(context.clone())?;
                    }

                    self.meta.insert(Meta::absent(src.as_ref()));
                    let meta = self.meta_for(&dst, true);
                    changes.push((src.clone().into_owned(), 0));
                    changes.push((dst.into_owned(), meta.storage_timestamp));
                    debug!(src = %src, dst = %meta.storage_key, "Record renamed");
                    Ok(true)
                })
            },
        }
    }

    /// Physical directory holding the record of `key`, or the root when `key` is `None`.
    ///
    /// For the shared layout every key lives in the shared file, so that file is returned.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the resolver's error.
    pub fn get_storage_path(&self, key: Option<&str>) -> Result<PathBuf> {
        let Some(key) = key else {
            return Ok(self.root.clone());
        };
        let key = self.checked_key(key, &op("get_storage_path", key))?;
        match self.layout {
            LayoutKind::Shared => self.record_file(&key),
            LayoutKind::FolderPerRecord | LayoutKind::FilePerRecord => self.container_path(&key),
        }
    }

    /// Physical directory holding the media files attached to `key`.
    ///
    /// Per-record layouts keep media in the record's container. The shared layout keeps them
    /// under `{root}/{file}/{key}`, and `{root}/{file}` when `key` is `None`.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the resolver's error.
    pub fn get_media_path(&self, key: Option<&str>) -> Result<PathBuf> {
        match (self.layout, key) {
            (LayoutKind::Shared, None) => {
                self.resolver.resolve(&format!("{}/{}", self.folder, self.codec.file()))
            },
            (LayoutKind::Shared, Some(key)) => {
                let key = self.checked_key(key, &op("get_media_path", key))?;
                self.resolver.resolve(&format!("{}/{}/{key}", self.folder, self.codec.file()))
            },
            (_, key) => self.get_storage_path(key),
        }
    }

    fn load_row(&self, key: &str) -> Result<Option<Row>> {
        if is_placeholder(key) || !validate_key(key) {
            return Ok(None);
        }
        match self.layout {
            LayoutKind::Shared => self.shared_read(key),
            LayoutKind::FolderPerRecord | LayoutKind::FilePerRecord => self.load_record(key),
        }
    }

    fn load_record(&self, key: &str) -> Result<Option<Row>> {
        let path = self.record_file(key)?;
        let Some(data) = file::read(&path).context(op("read_rows", key))? else {
            self.meta.insert(Meta::absent(key));
            return Ok(None);
        };

        let meta = Meta::new(key, stat_timestamp(&path));
        self.meta.insert(meta.clone());

        let row = match self.formatter.decode(&data) {
            Ok(row) if !is_legacy_shape(&row) => annotate(row, &self.key_field, &meta),
            Ok(_) => {
                warn!(path = %path.display(), "Record file holds legacy indexed data");
                broken(BROKEN_OBJECT, &meta)
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Record file could not be decoded");
                broken(err.to_string(), &meta)
            },
        };
        Ok(Some(row))
    }

    fn save_record(&self, key: &str, row: &Row, operation: &str) -> Result<(Row, Meta)> {
        let context = op(operation, key);
        let path = self.record_file(key).context(context.clone())?;
        let stripped = strip_transient(row, &self.key_field);
        let data = self.formatter.encode(&stripped).context(context.clone())?;
        file::save(&path, &data, &self.tmp_counter).context(context)?;

        let meta = Meta::new(key, stat_timestamp(&path));
        self.meta.insert(meta.clone());
        Ok((annotate(stripped, &self.key_field, &meta), meta))
    }

    fn delete_record(&self, key: &str) -> Result<RecordContent> {
        let context = op("delete_rows", key);
        let path = self.record_file(key).context(context.clone())?;
        let data = file::read(&path).context(context.clone())?.unwrap_or_default();
        let prior = match self.formatter.decode(&data) {
            Ok(row) => RecordContent::Row(row),
            Err(_) => RecordContent::Raw(data),
        };

        file::remove(&path).context(context.clone())?;
        self.meta.insert(Meta::absent(key));

        if self.delete_container {
            let container = self.container_path(key).context(context.clone())?;
            self.delete_container_dir(&container, &context)?;
        }
        Ok(prior)
    }

    fn delete_container_dir(&self, path: &Path, context: &Cow<'static, str>) -> Result<()> {
        if self.root.starts_with(path) {
            warn!(path = %path.display(), "Refusing to delete the storage root");
            return Ok(());
        }
        self.folders.delete(path, true).context(context.clone())?;
        Ok(())
    }

    pub(crate) fn record_file(&self, key: &str) -> Result<PathBuf> {
        self.resolver.resolve(&self.get_path_from_key(key))
    }

    fn container_path(&self, key: &str) -> Result<PathBuf> {
        let parts = self.codec.parse(key, true);
        let vars = PatternVars::for_key(&self.folder, &parts, &self.extension);
        self.resolver.resolve(&self.pattern.storage_path_for(&vars, true))
    }

    fn meta_for(&self, key: &str, reload: bool) -> Meta {
        self.meta.get(key, reload, || self.record_file(key).ok())
    }

    /// Draws generated keys until one is unused.
    pub(crate) fn new_key_where(&self, unused: impl Fn(&str) -> bool) -> Result<String> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = self.codec.generate()?;
            if unused(&key) {
                return Ok(key);
            }
        }
        Err(StorageError::Internal {
            message: format!("no unused key of length {} found", self.codec.key_length()).into(),
            context: Some("generate_key".into()),
        })
    }

    fn new_key(&self) -> Result<String> {
        self.new_key_where(|key| !self.meta_for(key, true).exists())
    }

    pub(crate) fn checked_key<'a>(
        &self,
        key: &'a str,
        context: &Cow<'static, str>,
    ) -> Result<Cow<'a, str>> {
        let key = self.codec.normalize(key);
        KeyCodec::assert_valid(&key).context(context.clone())?;
        Ok(key)
    }

    fn checked_keys<I, K>(&self, operation: &str, keys: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .map(|key| {
                let key = key.as_ref();
                Ok(self.checked_key(key, &op(operation, key))?.into_owned())
            })
            .collect()
    }

    fn checked_rows<I, K>(&self, operation: &str, rows: I) -> Result<Vec<(String, Row)>>
    where
        I: IntoIterator<Item = (K, Row)>,
        K: AsRef<str>,
    {
        rows.into_iter()
            .map(|(key, row)| {
                let key = key.as_ref();
                Ok((self.checked_key(key, &op(operation, key))?.into_owned(), row))
            })
            .collect()
    }

    /// Like `checked_rows`, but empty and placeholder keys become `None` (generate one).
    fn checked_new_rows<I, K>(
        &self,
        operation: &str,
        rows: I,
    ) -> Result<Vec<(Option<String>, Row)>>
    where
        I: IntoIterator<Item = (K, Row)>,
        K: AsRef<str>,
    {
        rows.into_iter()
            .map(|(key, row)| {
                let key = key.as_ref();
                if key.is_empty() || is_placeholder(key) {
                    return Ok((None, row));
                }
                Ok((Some(self.checked_key(key, &op(operation, key))?.into_owned()), row))
            })
            .collect()
    }

    /// Runs a mutating batch and folds its changes into the persisted index, even when the
    /// batch fails halfway.
    fn tracked<R>(&self, batch: impl FnOnce(&mut Vec<IndexChange>) -> Result<R>) -> Result<R> {
        let mut changes = Vec::new();
        let result = batch(&mut changes);
        let synced = match &self.index {
            Some(index) => index.apply(&changes, &self.tmp_counter),
            None => Ok(()),
        };
        let value = result?;
        synced?;
        Ok(value)
    }

    fn scan(&self) -> Result<BTreeMap<String, Meta>> {
        let base = self.resolver.resolve(&self.pattern.index_root(&self.folder))?;
        let mut found = BTreeMap::new();
        if !base.is_dir() {
            return Ok(found);
        }

        if self.prefixed {
            for shard in visible_entries(&base)? {
                if shard.is_dir() {
                    self.scan_level(&shard, &mut found)?;
                }
            }
        } else {
            self.scan_level(&base, &mut found)?;
        }
        Ok(found)
    }

    fn scan_level(&self, dir: &Path, found: &mut BTreeMap<String, Meta>) -> Result<()> {
        for path in visible_entries(dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let candidate = match self.layout {
                LayoutKind::FolderPerRecord if path.is_dir() => Some(name),
                LayoutKind::FilePerRecord if path.is_file() => {
                    name.strip_suffix(self.extension.as_str())
                },
                _ => None,
            };
            let Some(key) = candidate.filter(|key| validate_key(key)) else {
                continue;
            };
            if self.codec.normalize(key) != key {
                debug!(path = %path.display(), "Skipping entry outside the normalized key space");
                continue;
            }

            let timestamp = self.record_file(key).map_or(0, |file| stat_timestamp(&file));
            if timestamp == 0 {
                debug!(path = %path.display(), "Skipping entry without a record file");
                continue;
            }
            found.insert(key.to_owned(), Meta::new(key, timestamp));
        }
        Ok(())
    }
}

/// Entries of `dir` whose names do not start with a dot.
fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let context = op("build_index", dir.display());
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).context(context.clone())? {
        let entry = entry.context(context.clone())?;
        if entry.file_name().to_str().is_some_and(|name| !name.starts_with('.')) {
            entries.push(entry.path());
        }
    }
    Ok(entries)
}

pub(crate) fn conflict(key: &str, context: Cow<'static, str>) -> StorageError {
    StorageError::KeyConflict { key: key.to_owned().into(), context: Some(context) }
}

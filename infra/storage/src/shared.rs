//! The shared-file layout: every row of the storage lives in one map-shaped file.
//!
//! The map is loaded into a [`SharedTable`] on first access and kept until the file's timestamp
//! changes or the cache is cleared. Each mutating batch reloads the file, applies all of its rows
//! to the table, and rewrites the file once at the end. With a `prefix` the storage owns only
//! that sub-map and writes it back without disturbing its siblings.

use crate::engine::{BROKEN_OBJECT, FlexStorage, conflict};
use crate::error::{Result, StorageError, StorageErrorExt, op};
use crate::file;
use crate::meta::{Meta, stat_timestamp};
use crate::row::{RecordContent, Row, annotate, broken, strip_transient};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Rows of the shared file as last read from disk.
#[derive(Debug, Default)]
pub(crate) struct SharedTable {
    rows: Row,
    timestamp: i64,
    /// Decode error of a file that could not be read as a map.
    broken: Option<String>,
}

impl SharedTable {
    fn meta(&self, key: &str) -> Meta {
        Meta::new(key, self.timestamp)
    }

    /// Refuses to overwrite a file whose content could not be decoded.
    fn ensure_writable(&self, context: &Cow<'static, str>) -> Result<()> {
        match &self.broken {
            Some(message) => Err(StorageError::CorruptStore {
                message: message.clone().into(),
                context: Some(context.clone()),
            }),
            None => Ok(()),
        }
    }

    fn row(&self, key: &str, key_field: &str) -> Option<Row> {
        let meta = self.meta(key);
        match self.rows.get(key)? {
            Value::Object(row) => Some(annotate(row.clone(), key_field, &meta)),
            _ => Some(broken(BROKEN_OBJECT, &meta)),
        }
    }

    fn annotate_all(&self, keys: Vec<String>, key_field: &str) -> BTreeMap<String, Row> {
        keys.into_iter()
            .filter_map(|key| {
                let row = self.row(&key, key_field)?;
                Some((key, row))
            })
            .collect()
    }
}

impl FlexStorage {
    pub(crate) fn shared_contains(&self, key: &str) -> bool {
        match self.with_table(false, |table| Ok(table.rows.contains_key(key))) {
            Ok(found) => found,
            Err(err) => {
                warn!(key, error = %err, "Shared file could not be read");
                false
            },
        }
    }

    pub(crate) fn shared_existing_keys(&self, reload: bool) -> Result<BTreeMap<String, Meta>> {
        self.with_table(reload, |table| {
            Ok(table.rows.keys().map(|key| (key.clone(), table.meta(key))).collect())
        })
    }

    pub(crate) fn shared_read(&self, key: &str) -> Result<Option<Row>> {
        self.with_table(false, |table| Ok(table.row(key, &self.key_field)))
    }

    pub(crate) fn shared_create(
        &self,
        rows: Vec<(Option<String>, Row)>,
    ) -> Result<BTreeMap<String, Row>> {
        self.with_table(true, |table| {
            table.ensure_writable(&op("create_rows", self.folder.as_str()))?;
            for key in rows.iter().filter_map(|(key, _)| key.as_deref()) {
                if table.rows.contains_key(key) {
                    return Err(conflict(key, op("create_rows", key)));
                }
            }

            let mut keys = Vec::with_capacity(rows.len());
            for (key, row) in rows {
                let key = match key {
                    Some(key) => key,
                    None => self.new_key_where(|key| !table.rows.contains_key(key))?,
                };
                let row = strip_transient(&row, &self.key_field);
                table.rows.insert(key.clone(), Value::Object(row));
                keys.push(key);
            }

            self.save_table(table, "create_rows")?;
            Ok(table.annotate_all(keys, &self.key_field))
        })
    }

    pub(crate) fn shared_update(
        &self,
        rows: Vec<(String, Row)>,
    ) -> Result<BTreeMap<String, Option<Row>>> {
        self.with_table(true, |table| {
            table.ensure_writable(&op("update_rows", self.folder.as_str()))?;

            let mut keys = Vec::with_capacity(rows.len());
            let mut list = BTreeMap::new();
            for (key, row) in rows {
                let Some(slot) = table.rows.get_mut(&key) else {
                    list.insert(key, None);
                    continue;
                };
                *slot = Value::Object(strip_transient(&row, &self.key_field));
                keys.push(key);
            }

            if !keys.is_empty() {
                self.save_table(table, "update_rows")?;
            }
            let saved = table.annotate_all(keys, &self.key_field);
            list.extend(saved.into_iter().map(|(key, row)| (key, Some(row))));
            Ok(list)
        })
    }

    pub(crate) fn shared_replace(
        &self,
        rows: Vec<(Option<String>, Row)>,
    ) -> Result<BTreeMap<String, Row>> {
        self.with_table(true, |table| {
            table.ensure_writable(&op("replace_rows", self.folder.as_str()))?;

            let mut keys = Vec::with_capacity(rows.len());
            for (key, row) in rows {
                let key = match key {
                    Some(key) => key,
                    None => self.new_key_where(|key| !table.rows.contains_key(key))?,
                };
                let row = strip_transient(&row, &self.key_field);
                table.rows.insert(key.clone(), Value::Object(row));
                keys.push(key);
            }

            self.save_table(table, "replace_rows")?;
            Ok(table.annotate_all(keys, &self.key_field))
        })
    }

    pub(crate) fn shared_delete(
        &self,
        keys: Vec<String>,
    ) -> Result<BTreeMap<String, Option<RecordContent>>> {
        self.with_table(true, |table| {
            table.ensure_writable(&op("delete_rows", self.folder.as_str()))?;

            let mut removed = false;
            let mut list = BTreeMap::new();
            for key in keys {
                let prior = table.rows.shift_remove(&key).map(|value| match value {
                    Value::Object(row) => RecordContent::Row(row),
                    other => RecordContent::Raw(other.to_string().into_bytes()),
                });
                removed |= prior.is_some();
                list.insert(key, prior);
            }

            if removed {
                self.save_table(table, "delete_rows")?;
            }
            Ok(list)
        })
    }

    pub(crate) fn shared_copy(
        &self,
        src: &str,
        dst: &str,
        context: &Cow<'static, str>,
    ) -> Result<bool> {
        self.with_table(true, |table| {
            if table.rows.contains_key(dst) {
                return Err(conflict(dst, context.clone()));
            }
            let Some(value) = table.rows.get(src).cloned() else {
                return Ok(false);
            };
            table.ensure_writable(context)?;

            table.rows.insert(dst.to_owned(), value);
            self.save_table(table, "copy_row")?;
            debug!(src, dst, "Shared row copied");
            Ok(true)
        })
    }

    /// Renames in place, so the row keeps its position in the file.
    pub(crate) fn shared_rename(
        &self,
        src: &str,
        dst: &str,
        context: &Cow<'static, str>,
    ) -> Result<bool> {
        self.with_table(true, |table| {
            if table.rows.contains_key(dst) {
                return Err(conflict(dst, context.clone()));
            }
            if !table.rows.contains_key(src) {
                return Ok(false);
            }
            table.ensure_writable(context)?;

            table.rows = std::mem::take(&mut table.rows)
                .into_iter()
                .map(|(key, value)| if key == src { (dst.to_owned(), value) } else { (key, value) })
                .collect();
            self.save_table(table, "rename_row")?;
            debug!(src, dst, "Shared row renamed");
            Ok(true)
        })
    }

    /// Runs `f` against the loaded table, (re)loading it when `reload` is set, nothing is
    /// loaded yet, or the file changed on disk since it was read. The table is dropped when `f`
    /// fails, so the next access reads the file again.
    fn with_table<R>(
        &self,
        reload: bool,
        f: impl FnOnce(&mut SharedTable) -> Result<R>,
    ) -> Result<R> {
        let path = self.shared_file()?;
        let mut guard = self.table.lock();

        let stale = reload
            || guard.as_ref().is_none_or(|table| table.timestamp != stat_timestamp(&path));
        if stale {
            *guard = Some(self.load_table(&path)?);
        }

        let result = f(guard.get_or_insert_with(SharedTable::default));
        if result.is_err() {
            // A failed batch may have left rows in the table that never reached the file.
            *guard = None;
        }
        result
    }

    fn load_table(&self, path: &Path) -> Result<SharedTable> {
        let context = op("load_table", path.display());
        let Some(data) = file::read(path).context(context)? else {
            return Ok(SharedTable::default());
        };
        let timestamp = stat_timestamp(path);

        let content = match self.formatter.decode(&data) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Shared file could not be decoded");
                let broken = Some(err.to_string());
                return Ok(SharedTable { rows: Row::new(), timestamp, broken });
            },
        };

        let rows = match &self.prefix {
            None => content,
            Some(prefix) => match content.get(prefix) {
                None | Some(Value::Null) => Row::new(),
                Some(Value::Object(rows)) => rows.clone(),
                Some(_) => {
                    let message = format!("entry '{prefix}' is not a map");
                    warn!(path = %path.display(), prefix, "Shared file prefix is not a map");
                    return Ok(SharedTable { rows: Row::new(), timestamp, broken: Some(message) });
                },
            },
        };
        Ok(SharedTable { rows, timestamp, broken: None })
    }

    fn save_table(&self, table: &mut SharedTable, operation: &str) -> Result<()> {
        let path = self.shared_file()?;
        let context = op(operation, path.display());

        let content = match &self.prefix {
            None => table.rows.clone(),
            Some(prefix) => {
                let mut content = match file::read(&path).context(context.clone())? {
                    Some(data) => self.formatter.decode(&data).context(context.clone())?,
                    None => Row::new(),
                };
                content.insert(prefix.clone(), Value::Object(table.rows.clone()));
                content
            },
        };

        let data = self.formatter.encode(&content).context(context.clone())?;
        file::save(&path, &data, &self.tmp_counter).context(context)?;
        table.timestamp = stat_timestamp(&path);

        debug!(path = %path.display(), rows = table.rows.len(), "Shared file written");
        Ok(())
    }

    fn shared_file(&self) -> Result<PathBuf> {
        self.record_file("")
    }
}

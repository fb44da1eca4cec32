//! Persisted key index for storages configured as `indexed`.
//!
//! The index is a JSON map `key -> timestamp` kept in a dot-file under the storage root, so the
//! directory scan never mistakes it for a record.

use crate::error::{Result, StorageError, StorageErrorExt, op};
use crate::file;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use tracing::warn;

pub(crate) const INDEX_FILE: &str = ".flexindex.json";

#[derive(Debug)]
pub(crate) struct DiskIndex {
    path: PathBuf,
}

impl DiskIndex {
    pub(crate) fn new(root: &Path) -> Self {
        Self { path: root.join(INDEX_FILE) }
    }

    /// Reads the persisted index; `None` when it is missing or unreadable.
    pub(crate) fn load(&self) -> Result<Option<BTreeMap<String, i64>>> {
        let Some(data) = file::read(&self.path).context(op("load_index", self.path.display()))?
        else {
            return Ok(None);
        };

        match serde_json::from_slice(&data) {
            Ok(entries) => Ok(Some(entries)),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Ignoring unreadable key index");
                Ok(None)
            },
        }
    }

    pub(crate) fn store(&self, entries: &BTreeMap<String, i64>, counter: &AtomicU64) -> Result<()> {
        let data = serde_json::to_vec(entries)
            .map_err(|e| StorageError::from(e.to_string()))
            .context(op("store_index", self.path.display()))?;
        file::save(&self.path, &data, counter).context(op("store_index", self.path.display()))
    }

    /// Applies `key -> timestamp` changes; a zero timestamp drops the key.
    ///
    /// A missing index is left missing; the next listing rebuilds it from disk.
    pub(crate) fn apply(&self, changes: &[(String, i64)], counter: &AtomicU64) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let Some(mut entries) = self.load()? else {
            return Ok(());
        };

        for (key, timestamp) in changes {
            if *timestamp == 0 {
                entries.remove(key);
            } else {
                entries.insert(key.clone(), *timestamp);
            }
        }

        self.store(&entries, counter)
    }
}

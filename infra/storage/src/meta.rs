//! Per-key existence and timestamp cache.
//!
//! Entries are advisory: they save a `stat` on hot paths, but every operation whose correctness
//! depends on existence (copy, rename, key generation) asks for a reload first. Another process
//! writing to the same root is only noticed on reload or after [`ObjectMetaCache::invalidate`].

use crate::key::is_placeholder;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub const DEFAULT_META_CAPACITY: u64 = 100_000;

/// Cached on-disk state of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub storage_key: String,
    /// Unix modification time of the record, or `0` when it does not exist.
    pub storage_timestamp: i64,
}

impl Meta {
    #[must_use]
    pub fn new(key: impl Into<String>, timestamp: i64) -> Self {
        Self { storage_key: key.into(), storage_timestamp: timestamp }
    }

    #[must_use]
    pub fn absent(key: impl Into<String>) -> Self {
        Self::new(key, 0)
    }

    #[must_use]
    pub const fn exists(&self) -> bool {
        self.storage_timestamp != 0
    }

    /// The `__META` envelope attached to rows handed back to callers.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "storage_key": self.storage_key,
            "storage_timestamp": self.storage_timestamp,
            "exists": self.exists(),
        })
    }
}

/// Modification time of a regular file as a non-zero unix timestamp, or `0` if there is none.
pub(crate) fn stat_timestamp(path: &Path) -> i64 {
    std::fs::metadata(path)
        .ok()
        .filter(std::fs::Metadata::is_file)
        .and_then(|m| m.modified().ok())
        .map_or(0, |modified| {
            let secs = modified.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
            i64::try_from(secs).unwrap_or(i64::MAX).max(1)
        })
}

/// Bounded `key -> Meta` cache owned by one storage instance.
#[derive(Debug, Clone)]
pub struct ObjectMetaCache {
    cache: Cache<String, Meta>,
}

impl Default for ObjectMetaCache {
    fn default() -> Self {
        Self::new(DEFAULT_META_CAPACITY)
    }
}

impl ObjectMetaCache {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self { cache: Cache::builder().max_capacity(capacity).build() }
    }

    /// Returns the cached meta for `key`, or stats the file `locate` points at.
    ///
    /// `reload` skips the cached entry. Placeholder keys report a zero timestamp without touching
    /// the filesystem and are never cached.
    pub fn get(&self, key: &str, reload: bool, locate: impl FnOnce() -> Option<PathBuf>) -> Meta {
        if is_placeholder(key) {
            return Meta::absent(key);
        }
        if !reload && let Some(meta) = self.cache.get(key) {
            return meta;
        }

        let timestamp = locate().as_deref().map_or(0, stat_timestamp);
        let meta = Meta::new(key, timestamp);
        self.cache.insert(key.to_owned(), meta.clone());
        meta
    }

    /// Records freshly observed state, e.g. right after a write.
    pub fn insert(&self, meta: Meta) {
        self.cache.insert(meta.storage_key.clone(), meta);
    }

    pub fn remove(&self, key: &str) {
        self.cache.invalidate(key);
    }

    /// Drops every entry.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

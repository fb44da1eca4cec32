//! Key validation, case folding, decomposition and generation.
//!
//! Keys address records independently of where the layout puts them on disk, so every key that
//! reaches path expansion must be safe to splice into a path: no separators, no wildcards, no
//! `..`, and no leading dot (dot entries are reserved for the engine's own files).

use crate::error::{Result, StorageError};
use getrandom::fill;
use sha2::{Digest, Sha256};
use std::borrow::Cow;

/// Placeholder key meaning "not assigned yet"; writes replace it with a generated key.
pub const NEW_KEY: &str = "@@";

/// Longest key [`KeyCodec::generate`] can produce (hex-encoded SHA-256).
pub const MAX_KEY_LENGTH: usize = 64;

const FORBIDDEN: &[char] = &['\\', '/', '?', '*', ':', ';', '{', '}', '\n'];

/// Checks a key against the path-safety rules.
#[must_use]
pub fn validate_key(key: &str) -> bool {
    !key.is_empty() && !key.starts_with('.') && !key.contains("..") && !key.contains(FORBIDDEN)
}

/// Whether the key is, or embeds, the [`NEW_KEY`] placeholder.
#[must_use]
pub fn is_placeholder(key: &str) -> bool {
    key.contains(NEW_KEY)
}

/// Hashes `entropy` and keeps the first `length` hex characters.
///
/// `length` is clamped to [`MAX_KEY_LENGTH`].
#[must_use]
pub fn generate_key(entropy: &[u8], length: usize) -> String {
    let mut key = hex::encode(Sha256::digest(entropy));
    key.truncate(length.min(MAX_KEY_LENGTH));
    key
}

/// The path-construction parts of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParts<'a> {
    pub key: &'a str,
    /// First two characters, used as the shard directory.
    pub key_prefix2: &'a str,
    /// The record file name, present only when requested.
    pub file: Option<&'a str>,
}

/// Key rules for one storage instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    case_sensitive: bool,
    key_length: usize,
    file: String,
}

impl KeyCodec {
    #[must_use]
    pub fn new(case_sensitive: bool, key_length: usize, file: impl Into<String>) -> Self {
        Self { case_sensitive, key_length, file: file.into() }
    }

    #[must_use]
    pub const fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    #[must_use]
    pub const fn key_length(&self) -> usize {
        self.key_length
    }

    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Lower-cases the key when the storage is case-insensitive.
    #[must_use]
    pub fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if self.case_sensitive || !key.chars().any(char::is_uppercase) {
            Cow::Borrowed(key)
        } else {
            Cow::Owned(key.to_lowercase())
        }
    }

    /// Rejects keys that [`validate_key`] refuses.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidKey`] carrying the offending key.
    pub fn assert_valid(key: &str) -> Result<()> {
        if validate_key(key) {
            Ok(())
        } else {
            Err(StorageError::InvalidKey { key: key.to_owned().into(), context: None })
        }
    }

    /// Splits a key into its path-construction parts.
    #[must_use]
    pub fn parse<'a>(&'a self, key: &'a str, with_file: bool) -> KeyParts<'a> {
        let split = key.char_indices().nth(2).map_or(key.len(), |(idx, _)| idx);
        KeyParts {
            key,
            key_prefix2: &key[..split],
            file: with_file.then_some(self.file.as_str()),
        }
    }

    /// Draws a fresh candidate key from the system RNG.
    ///
    /// The candidate is unique with overwhelming probability, but callers still have to check it
    /// against existing records and draw again on collision.
    ///
    /// # Errors
    /// Returns [`StorageError::Internal`] if the system entropy source fails.
    pub fn generate(&self) -> Result<String> {
        let mut entropy = [0u8; 32];
        fill(&mut entropy).map_err(|e| StorageError::Internal {
            message: e.to_string().into(),
            context: Some("Failed to draw key entropy".into()),
        })?;
        Ok(generate_key(&entropy, self.key_length))
    }
}

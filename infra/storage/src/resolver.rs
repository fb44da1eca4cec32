//! Translation of configured (possibly symbolic) paths into filesystem paths.

use crate::error::{Result, StorageError};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Maps a configured path such as `user://data/pages` onto a real filesystem path.
pub trait PathResolver: fmt::Debug + Send + Sync {
    /// # Errors
    /// Returns [`StorageError`] when the path names an unknown scheme or escapes its base.
    fn resolve(&self, path: &str) -> Result<PathBuf>;
}

/// Treats every path as a plain filesystem path.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainResolver;

impl PathResolver for PlainResolver {
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(PathBuf::from(path))
    }
}

/// Resolves `scheme://relative/path` against registered base directories.
///
/// Paths without a scheme pass through unchanged. The relative part may use `..` as long as it
/// stays inside the base directory.
///
/// ```rust
/// use flex_storage::{PathResolver, StreamResolver};
/// use std::path::PathBuf;
///
/// let resolver = StreamResolver::new().mount("user", "/srv/site/user");
/// assert_eq!(
///     resolver.resolve("user://data/pages").unwrap(),
///     PathBuf::from("/srv/site/user/data/pages")
/// );
/// assert!(resolver.resolve("user://../etc").is_err());
/// ```
#[derive(Debug, Default, Clone)]
pub struct StreamResolver {
    schemes: BTreeMap<String, PathBuf>,
}

impl StreamResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the base directory of a scheme.
    #[must_use]
    pub fn mount(mut self, scheme: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        self.schemes.insert(scheme.into(), base.into());
        self
    }

    #[must_use]
    pub fn is_stream(path: &str) -> bool {
        path.contains("://")
    }
}

impl PathResolver for StreamResolver {
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let Some((scheme, rest)) = path.split_once("://") else {
            return Ok(PathBuf::from(path));
        };

        let base = self.schemes.get(scheme).ok_or_else(|| StorageError::BadConfiguration {
            message: format!("unknown stream scheme '{scheme}'").into(),
            context: Some(path.to_owned().into()),
        })?;

        let relative = normalize_relative(Path::new(rest.trim_start_matches('/')))?;
        Ok(base.join(relative))
    }
}

/// Collapse `.` / `..` lexically while ensuring the path never escapes the base.
fn normalize_relative(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();

    for c in path.components() {
        match c {
            Component::CurDir => {},
            Component::Normal(seg) => out.push(seg),
            Component::ParentDir => {
                if !out.pop() {
                    return Err(StorageError::PathTraversalAttempt {
                        message: path.display().to_string().into(),
                        context: Some("Stream path attempted to escape its base via '..'".into()),
                    });
                }
            },
            Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::PathTraversalAttempt {
                    message: path.display().to_string().into(),
                    context: Some("Stream path must be relative to its base".into()),
                });
            },
        }
    }

    Ok(out)
}

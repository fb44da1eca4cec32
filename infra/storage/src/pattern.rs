//! Path templates mapping a key onto a record file.
//!
//! A pattern is a `/`-separated template with five placeholders:
//!
//! | Placeholder | Expands to                                  |
//! |-------------|---------------------------------------------|
//! | `{FOLDER}`  | the storage root                            |
//! | `{KEY}`     | the record key                              |
//! | `{KEY:2}`   | the first two characters of the key (shard) |
//! | `{FILE}`    | the record file name                        |
//! | `{EXT}`     | the formatter's file extension              |
//!
//! Expansion is plain string substitution and never touches the filesystem.

use crate::error::{Result, StorageError};
use crate::key::KeyParts;
use crate::layout::LayoutKind;
use std::path::Path;

pub(crate) const FOLDER: &str = "{FOLDER}";
pub(crate) const KEY: &str = "{KEY}";
pub(crate) const KEY_PREFIX2: &str = "{KEY:2}";
pub(crate) const FILE: &str = "{FILE}";
pub(crate) const EXT: &str = "{EXT}";

const PLACEHOLDERS: [&str; 5] = [FOLDER, KEY, KEY_PREFIX2, FILE, EXT];

/// Values substituted into a pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternVars<'a> {
    pub folder: &'a str,
    pub key: &'a str,
    pub key_prefix2: &'a str,
    pub file: &'a str,
    pub ext: &'a str,
}

impl<'a> PatternVars<'a> {
    /// Variables for one key of a storage rooted at `folder`.
    #[must_use]
    pub fn for_key(folder: &'a str, parts: &KeyParts<'a>, ext: &'a str) -> Self {
        Self {
            folder,
            key: parts.key,
            key_prefix2: parts.key_prefix2,
            file: parts.file.unwrap_or_default(),
            ext,
        }
    }
}

/// A validated, completed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    template: String,
    file: Option<String>,
    extension: Option<String>,
}

impl PathPattern {
    /// Compiles a user-supplied template for the given layout.
    ///
    /// A template naming neither `{FILE}` nor `{EXT}` is completed so it still resolves to a
    /// concrete file: a literal last segment (`item.yaml`, `item`) becomes the record file name
    /// and its extension is remembered for formatter detection; otherwise the file-per-record
    /// layout appends `{EXT}` and the other layouts append `/{FILE}{EXT}`.
    ///
    /// # Errors
    /// Returns [`StorageError::BadConfiguration`] if the template is blank, names an unknown
    /// placeholder, lacks `{KEY}` for a per-record layout, or uses a key placeholder in the
    /// shared layout.
    pub fn new(template: &str, layout: LayoutKind) -> Result<Self> {
        let template = template.trim().trim_end_matches('/');
        if template.is_empty() {
            return Err(bad(template, "pattern expands to an empty path"));
        }
        check_placeholders(template)?;

        let has_key = template.contains(KEY) || template.contains(KEY_PREFIX2);
        match layout {
            LayoutKind::Shared if has_key => {
                return Err(bad(template, "shared layout cannot address keys by path"));
            },
            LayoutKind::FolderPerRecord | LayoutKind::FilePerRecord if !template.contains(KEY) => {
                return Err(bad(template, "per-record layout needs a {KEY} placeholder"));
            },
            _ => {},
        }

        if template.contains(FILE) || template.contains(EXT) {
            return Ok(Self { template: template.to_owned(), file: None, extension: None });
        }

        let (head, last) = match template.rsplit_once('/') {
            Some((head, last)) => (Some(head), last),
            None => (None, template),
        };
        if !last.contains('{') {
            let last = Path::new(last);
            let file = last.file_stem().and_then(|s| s.to_str()).map(str::to_owned);
            let extension =
                last.extension().and_then(|s| s.to_str()).map(|ext| format!(".{ext}"));
            let template =
                head.map_or_else(|| format!("{FILE}{EXT}"), |head| format!("{head}/{FILE}{EXT}"));
            return Ok(Self { template, file, extension });
        }

        if layout == LayoutKind::FilePerRecord {
            let literal = &last[last.rfind('}').map_or(0, |idx| idx + 1)..];
            if let Some(dot) = literal.rfind('.') {
                let extension = &literal[dot..];
                let stem = &template[..template.len() - extension.len()];
                return Ok(Self {
                    template: format!("{stem}{EXT}"),
                    file: None,
                    extension: Some(extension.to_owned()),
                });
            }
        }

        let template = match layout {
            LayoutKind::FilePerRecord => format!("{template}{EXT}"),
            LayoutKind::Shared | LayoutKind::FolderPerRecord => format!("{template}/{FILE}{EXT}"),
        };
        Ok(Self { template, file: None, extension: None })
    }

    /// The completed template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Record file name taken from a literal last segment, if the template had one.
    #[must_use]
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Extension (with leading dot) taken from a literal last segment, if the template had one.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Whether the template shards records by key prefix.
    #[must_use]
    pub fn is_prefixed(&self) -> bool {
        self.template.contains(KEY_PREFIX2)
    }

    /// Substitutes every placeholder.
    #[must_use]
    pub fn expand(&self, vars: &PatternVars<'_>) -> String {
        substitute(&self.template, vars)
    }

    /// The root folder, or the container of a key's record: the expansion truncated right
    /// before the first `{FILE}`/`{EXT}` placeholder, without a trailing separator.
    #[must_use]
    pub fn storage_path_for(&self, vars: &PatternVars<'_>, keyed: bool) -> String {
        if !keyed {
            return vars.folder.trim_end_matches('/').to_owned();
        }
        let cut = [self.template.find(FILE), self.template.find(EXT)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.template.len());
        let expanded = substitute(&self.template[..cut], vars);
        expanded.trim_end_matches('/').to_owned()
    }

    /// The directory whose entries are keys (or key shards): everything before the segment
    /// holding the first key placeholder.
    #[must_use]
    pub fn index_root(&self, folder: &str) -> String {
        let first = [self.template.find(KEY_PREFIX2), self.template.find(KEY)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.template.len());
        let head = self.template[..first].rfind('/').map_or("", |slash| &self.template[..slash]);
        let vars = PatternVars { folder, ..PatternVars::default() };
        substitute(head, &vars).trim_end_matches('/').to_owned()
    }
}

fn substitute(template: &str, vars: &PatternVars<'_>) -> String {
    template
        .replace(KEY_PREFIX2, vars.key_prefix2)
        .replace(KEY, vars.key)
        .replace(FILE, vars.file)
        .replace(EXT, vars.ext)
        .replace(FOLDER, vars.folder.trim_end_matches('/'))
}

fn check_placeholders(template: &str) -> Result<()> {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            return Err(bad(template, "unterminated placeholder"));
        };
        let placeholder = &tail[..=close];
        if !PLACEHOLDERS.contains(&placeholder) {
            return Err(bad(template, format!("unknown placeholder {placeholder}")));
        }
        rest = &tail[close + 1..];
    }
    Ok(())
}

fn bad(template: &str, reason: impl Into<String>) -> StorageError {
    StorageError::BadConfiguration {
        message: reason.into().into(),
        context: Some(format!("pattern '{template}'").into()),
    }
}

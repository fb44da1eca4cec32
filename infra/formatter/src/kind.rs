use crate::error::FormatterError;
use crate::{JsonFormatter, MarkdownFormatter, RecordFormatter, Result, YamlFormatter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// The stock formatters, selectable by name or by file extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatterKind {
    #[default]
    Json,
    #[serde(alias = "yml")]
    Yaml,
    #[serde(alias = "md")]
    Markdown,
}

impl FormatterKind {
    /// The extension (with leading dot) this kind writes.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => ".json",
            Self::Yaml => ".yaml",
            Self::Markdown => ".md",
        }
    }

    /// Maps a file extension, with or without the leading dot, onto a formatter kind.
    ///
    /// # Errors
    /// Returns [`FormatterError::UnknownExtension`] for anything outside the fixed table.
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "md" => Ok(Self::Markdown),
            _ => Err(FormatterError::UnknownExtension {
                message: ext.to_owned().into(),
                context: Some("expected one of .json, .yaml, .md".into()),
            }),
        }
    }

    /// Sniffs the kind from the trailing extension of a path or pattern.
    ///
    /// # Errors
    /// Returns [`FormatterError::UnknownExtension`] when the path has no extension or an
    /// unrecognised one.
    pub fn detect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|ext| ext.to_str()).ok_or_else(|| {
            FormatterError::UnknownExtension {
                message: path.display().to_string().into(),
                context: Some("path has no extension".into()),
            }
        })?;
        Self::from_extension(ext)
    }

    /// Instantiates the stock formatter for this kind.
    #[must_use]
    pub fn build(self) -> Arc<dyn RecordFormatter> {
        match self {
            Self::Json => Arc::new(JsonFormatter::new()),
            Self::Yaml => Arc::new(YamlFormatter::new()),
            Self::Markdown => Arc::new(MarkdownFormatter::new()),
        }
    }
}

impl FromStr for FormatterKind {
    type Err = FormatterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "markdown" | "md" => Ok(Self::Markdown),
            _ => Self::from_extension(s),
        }
    }
}

impl fmt::Display for FormatterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Markdown => "markdown",
        })
    }
}

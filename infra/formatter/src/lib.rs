//! Pluggable record formatters for flex storage.
//!
//! A formatter turns one record's field map into bytes and back, and names the file
//! extension records of its kind are stored under. The storage engine never looks inside the
//! bytes; everything format-specific lives behind [`RecordFormatter`].
//!
//! # Stock formatters
//!
//! | Kind                  | Extension | Notes                                             |
//! |-----------------------|-----------|---------------------------------------------------|
//! | [`JsonFormatter`]     | `.json`   | Pretty-printed unless built with `compact()`      |
//! | [`YamlFormatter`]     | `.yaml`   | Block style                                       |
//! | [`MarkdownFormatter`] | `.md`     | YAML frontmatter in `header`, body in `markdown`  |
//!
//! # Examples
//!
//! ```rust
//! use flex_formatter::{FormatterKind, Row};
//!
//! # fn main() -> Result<(), flex_formatter::FormatterError> {
//! let formatter = FormatterKind::detect("pages/item.yaml")?.build();
//!
//! let mut row = Row::new();
//! row.insert("title".into(), "Hello".into());
//!
//! let bytes = formatter.encode(&row)?;
//! assert_eq!(bytes, b"title: Hello\n");
//! assert_eq!(formatter.decode(&bytes)?, row);
//! # Ok(())
//! # }
//! ```

mod error;
mod json;
mod kind;
mod markdown;
mod yaml;

pub use error::{FormatterError, FormatterErrorExt};
pub use json::JsonFormatter;
pub use kind::FormatterKind;
pub use markdown::MarkdownFormatter;
pub use yaml::YamlFormatter;

use serde_json::Value;
use std::fmt;

/// One record's fields, in insertion order.
pub type Row = serde_json::Map<String, Value>;

pub type Result<T> = std::result::Result<T, FormatterError>;

/// Encodes and decodes a record's field map for one file extension.
pub trait RecordFormatter: fmt::Debug + Send + Sync {
    /// The extension (with leading dot) record files of this kind are stored under.
    fn default_file_extension(&self) -> &str;

    /// Serializes a row into the bytes written to disk.
    ///
    /// # Errors
    /// Returns [`FormatterError`] if a value cannot be represented in this format.
    fn encode(&self, row: &Row) -> Result<Vec<u8>>;

    /// Parses file bytes back into a row.
    ///
    /// Blank input decodes to an empty row.
    ///
    /// # Errors
    /// Returns [`FormatterError`] if the bytes are not valid for this format, or if the
    /// document's top level is not a map.
    fn decode(&self, data: &[u8]) -> Result<Row>;
}

pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data)
}

pub(crate) fn is_blank(data: &[u8]) -> bool {
    data.iter().all(u8::is_ascii_whitespace)
}

/// Narrows a decoded document to a field map.
pub(crate) fn into_row(value: Value) -> Result<Row> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Row::new()),
        Value::Array(_) => Err(FormatterError::Malformed {
            message: "top-level sequence where a map was expected".into(),
            context: None,
        }),
        other => Err(FormatterError::Malformed {
            message: format!("top-level scalar `{other}` where a map was expected").into(),
            context: None,
        }),
    }
}

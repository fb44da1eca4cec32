//! Out-of-band row fields and the shapes rows travel in.

use crate::meta::Meta;
pub use flex_formatter::Row;
use serde_json::Value;

/// Transient envelope with the record's [`Meta`], attached to rows handed to callers.
pub const META_FIELD: &str = "__META";

/// Set instead of the record's fields when its file could not be decoded.
pub const ERROR_FIELD: &str = "__ERROR";

/// Prior content of a deleted record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordContent {
    Row(Row),
    /// The file's bytes, when they could not be decoded.
    Raw(Vec<u8>),
}

impl RecordContent {
    #[must_use]
    pub const fn as_row(&self) -> Option<&Row> {
        match self {
            Self::Row(row) => Some(row),
            Self::Raw(_) => None,
        }
    }
}

/// Copy of `row` without the key field, `__META` and `__ERROR`.
#[must_use]
pub fn strip_transient(row: &Row, key_field: &str) -> Row {
    let mut row = row.clone();
    row.shift_remove(key_field);
    row.shift_remove(META_FIELD);
    row.shift_remove(ERROR_FIELD);
    row
}

/// The decode error recorded on a row, if any.
#[must_use]
pub fn row_error(row: &Row) -> Option<&str> {
    row.get(ERROR_FIELD).and_then(Value::as_str)
}

pub(crate) fn annotate(mut row: Row, key_field: &str, meta: &Meta) -> Row {
    row.insert(key_field.to_owned(), Value::String(meta.storage_key.clone()));
    row.insert(META_FIELD.to_owned(), meta.to_value());
    row
}

pub(crate) fn broken(message: impl Into<String>, meta: &Meta) -> Row {
    let mut row = Row::new();
    row.insert(ERROR_FIELD.to_owned(), Value::String(message.into()));
    row.insert(META_FIELD.to_owned(), meta.to_value());
    row
}

/// Legacy array-indexed data decodes into a map keyed `"0"`, `"1"`, ...
pub(crate) fn is_legacy_shape(row: &Row) -> bool {
    row.contains_key("0")
}

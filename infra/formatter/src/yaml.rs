use crate::error::FormatterErrorExt;
use crate::{RecordFormatter, Result, Row, into_row, is_blank, strip_bom};
use serde_json::Value;

/// YAML records in block style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YamlFormatter;

impl YamlFormatter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RecordFormatter for YamlFormatter {
    fn default_file_extension(&self) -> &str {
        ".yaml"
    }

    fn encode(&self, row: &Row) -> Result<Vec<u8>> {
        if row.is_empty() {
            return Ok(Vec::new());
        }
        serde_yaml::to_string(row).map(String::into_bytes).context("encode yaml")
    }

    fn decode(&self, data: &[u8]) -> Result<Row> {
        let data = strip_bom(data);
        if is_blank(data) {
            return Ok(Row::new());
        }
        let value: Value = serde_yaml::from_slice(data).context("decode yaml")?;
        into_row(value)
    }
}

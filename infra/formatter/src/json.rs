use crate::error::FormatterErrorExt;
use crate::{RecordFormatter, Result, Row, into_row, is_blank, strip_bom};
use serde_json::Value;

/// JSON records, pretty-printed by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonFormatter {
    pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFormatter {
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: true }
    }

    /// Single-line output without indentation.
    #[must_use]
    pub const fn compact() -> Self {
        Self { pretty: false }
    }
}

impl RecordFormatter for JsonFormatter {
    fn default_file_extension(&self) -> &str {
        ".json"
    }

    fn encode(&self, row: &Row) -> Result<Vec<u8>> {
        let mut out = if self.pretty {
            serde_json::to_vec_pretty(row).context("encode json")?
        } else {
            serde_json::to_vec(row).context("encode json")?
        };
        out.push(b'\n');
        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Row> {
        let data = strip_bom(data);
        if is_blank(data) {
            return Ok(Row::new());
        }
        let value: Value = serde_json::from_slice(data).context("decode json")?;
        into_row(value)
    }
}

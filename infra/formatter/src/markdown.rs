use crate::error::{FormatterError, FormatterErrorExt};
use crate::{RecordFormatter, Result, Row, into_row, strip_bom};
use serde_json::Value;
use std::borrow::Cow;

const FENCE: &str = "---";

/// Markdown documents with an optional YAML frontmatter block.
///
/// A decoded row carries three fields:
/// - `header`: the frontmatter as a map (empty when the document has none),
/// - `markdown`: the body text,
/// - `frontmatter`: the raw frontmatter text, present only when the document had one.
///
/// Only `header` and `markdown` are written back; `frontmatter` is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownFormatter {
    header_field: Cow<'static, str>,
    body_field: Cow<'static, str>,
    raw_field: Cow<'static, str>,
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self {
            header_field: Cow::Borrowed("header"),
            body_field: Cow::Borrowed("markdown"),
            raw_field: Cow::Borrowed("frontmatter"),
        }
    }
}

impl MarkdownFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the names of the header, body and raw-frontmatter fields.
    #[must_use]
    pub fn with_fields(
        header: impl Into<Cow<'static, str>>,
        body: impl Into<Cow<'static, str>>,
        raw: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self { header_field: header.into(), body_field: body.into(), raw_field: raw.into() }
    }
}

impl RecordFormatter for MarkdownFormatter {
    fn default_file_extension(&self) -> &str {
        ".md"
    }

    fn encode(&self, row: &Row) -> Result<Vec<u8>> {
        let body = row.get(&*self.body_field).and_then(Value::as_str).unwrap_or_default();
        let header = row
            .get(&*self.header_field)
            .and_then(Value::as_object)
            .filter(|header| !header.is_empty());

        let mut out = String::with_capacity(body.len() + 64);
        if let Some(header) = header {
            let yaml = serde_yaml::to_string(header).context("encode frontmatter")?;
            out.push_str(FENCE);
            out.push('\n');
            out.push_str(yaml.trim_end());
            out.push('\n');
            out.push_str(FENCE);
            out.push_str("\n\n");
        }
        out.push_str(body);

        Ok(out.into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<Row> {
        let text = std::str::from_utf8(strip_bom(data)).map_err(|e| FormatterError::Malformed {
            message: e.to_string().into(),
            context: Some("decode markdown".into()),
        })?;
        let text = text.replace("\r\n", "\n").replace('\r', "\n");

        let mut row = Row::new();
        match split_frontmatter(&text) {
            Some((raw, body)) => {
                let value: Value =
                    serde_yaml::from_str(raw).context("decode frontmatter")?;
                let header = into_row(value).context("decode frontmatter")?;
                row.insert(self.header_field.to_string(), Value::Object(header));
                row.insert(self.raw_field.to_string(), Value::String(raw.to_owned()));
                row.insert(self.body_field.to_string(), Value::String(body.to_owned()));
            },
            None => {
                row.insert(self.header_field.to_string(), Value::Object(Row::new()));
                row.insert(self.body_field.to_string(), Value::String(text));
            },
        }

        Ok(row)
    }
}

/// Splits `---\n<frontmatter>\n---\n<body>` into its two parts.
///
/// Returns `None` when the text does not open with a non-empty fenced block.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim_start().strip_prefix(FENCE)?.strip_prefix('\n')?;

    let mut offset = 1;
    while let Some(found) = rest.get(offset..).and_then(|tail| tail.find("\n---")) {
        let start = offset + found;
        let after = &rest[start + 1 + FENCE.len()..];
        if after.is_empty() || after.starts_with('\n') {
            return Some((&rest[..start], after.trim_start_matches('\n')));
        }
        offset = start + 1;
    }

    None
}

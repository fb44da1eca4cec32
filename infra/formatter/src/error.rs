use std::borrow::Cow;

/// A specialized [`FormatterError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum FormatterError {
    #[error("JSON codec failure{}: {source}", format_context(.context))]
    Json { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[error("YAML codec failure{}: {source}", format_context(.context))]
    Yaml { source: serde_yaml::Error, context: Option<Cow<'static, str>> },

    /// The bytes decoded, but not into a field map.
    #[error("Malformed document{}: {message}", format_context(.context))]
    Malformed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unknown formatter extension{}: {message}", format_context(.context))]
    UnknownExtension { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

pub trait FormatterErrorExt<T> {
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, FormatterError>;
}

impl<T> FormatterErrorExt<T> for Result<T, FormatterError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                FormatterError::Json { context: c, .. }
                | FormatterError::Yaml { context: c, .. }
                | FormatterError::Malformed { context: c, .. }
                | FormatterError::UnknownExtension { context: c, .. } => {
                    *c = Some(context.into());
                },
            }
            e
        })
    }
}

impl From<serde_json::Error> for FormatterError {
    #[inline]
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source, context: None }
    }
}

impl<T> FormatterErrorExt<T> for Result<T, serde_json::Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, FormatterError> {
        self.map_err(|source| FormatterError::Json { source, context: Some(context.into()) })
    }
}

impl From<serde_yaml::Error> for FormatterError {
    #[inline]
    fn from(source: serde_yaml::Error) -> Self {
        Self::Yaml { source, context: None }
    }
}

impl<T> FormatterErrorExt<T> for Result<T, serde_yaml::Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, FormatterError> {
        self.map_err(|source| FormatterError::Yaml { source, context: Some(context.into()) })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

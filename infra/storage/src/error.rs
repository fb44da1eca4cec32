use flex_formatter::FormatterError;
use std::borrow::Cow;

/// A specialized [`StorageError`] enum of this crate.
///
/// The `context` of a variant raised by a storage operation names the operation and the key it
/// was working on, e.g. `delete_rows(abc123)`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key is empty, hidden, or contains path-hostile characters.
    #[error("Invalid key{}: '{key}'", format_context(.context))]
    InvalidKey { key: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Copy or rename onto a key that already holds a record.
    #[error("Key conflict{}: '{key}' already exists", format_context(.context))]
    KeyConflict { key: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("I/O failure{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Formatter failure{}: {source}", format_context(.context))]
    Format { source: FormatterError, context: Option<Cow<'static, str>> },

    /// A shared record file that cannot be decoded; writing to it would destroy its content.
    #[error("Corrupt record store{}: {message}", format_context(.context))]
    CorruptStore { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Bad storage configuration{}: {message}", format_context(.context))]
    BadConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Path traversal security violation{}: {message}", format_context(.context))]
    PathTraversalAttempt { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal storage error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub trait StorageErrorExt<T> {
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T>;
}

impl<T> StorageErrorExt<T> for Result<T> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                StorageError::InvalidKey { context: c, .. }
                | StorageError::KeyConflict { context: c, .. }
                | StorageError::Io { context: c, .. }
                | StorageError::Format { context: c, .. }
                | StorageError::CorruptStore { context: c, .. }
                | StorageError::BadConfiguration { context: c, .. }
                | StorageError::PathTraversalAttempt { context: c, .. }
                | StorageError::Internal { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl From<std::io::Error> for StorageError {
    #[inline]
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, context: None }
    }
}

impl<T> StorageErrorExt<T> for std::result::Result<T, std::io::Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T> {
        self.map_err(|source| StorageError::Io { source, context: Some(context.into()) })
    }
}

impl From<FormatterError> for StorageError {
    #[inline]
    fn from(source: FormatterError) -> Self {
        Self::Format { source, context: None }
    }
}

impl<T> StorageErrorExt<T> for std::result::Result<T, FormatterError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T> {
        self.map_err(|source| StorageError::Format { source, context: Some(context.into()) })
    }
}

impl From<config::ConfigError> for StorageError {
    #[inline]
    fn from(source: config::ConfigError) -> Self {
        Self::BadConfiguration { message: source.to_string().into(), context: None }
    }
}

impl<T> StorageErrorExt<T> for std::result::Result<T, config::ConfigError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T> {
        self.map_err(|source| StorageError::BadConfiguration {
            message: source.to_string().into(),
            context: Some(context.into()),
        })
    }
}

impl From<&'static str> for StorageError {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self::Internal { message: Cow::Borrowed(s), context: None }
    }
}

impl From<String> for StorageError {
    #[inline]
    fn from(s: String) -> Self {
        Self::Internal { message: Cow::Owned(s), context: None }
    }
}

/// Formats the `operation(subject)` context attached to errors raised by storage operations.
pub(crate) fn op(operation: &str, subject: impl std::fmt::Display) -> Cow<'static, str> {
    Cow::Owned(format!("{operation}({subject})"))
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

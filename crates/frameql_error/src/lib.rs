//! Error type shared by every frameql crate.
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// A key/value pair attached to an error for extra context.
#[derive(Debug)]
struct ErrorField {
    key: String,
    value: String,
}

#[derive(Debug)]
struct DbErrorInner {
    msg: String,
    source: Option<Box<dyn Error + Send + Sync>>,
    fields: Vec<ErrorField>,
    backtrace: Backtrace,
}

/// The error returned from all frameql operations.
///
/// Boxed so that `Result<T>` stays small on the happy path.
pub struct DbError {
    inner: Box<DbErrorInner>,
}

impl DbError {
    pub fn new(msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                msg: msg.into(),
                source: None,
                fields: Vec::new(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    /// Attach a field to the error.
    ///
    /// Fields are printed after the message in the order they were added.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Debug,
    {
        self.inner.fields.push(ErrorField {
            key: key.into(),
            value: format!("{value:?}"),
        });
        self
    }

    pub fn message(&self) -> &str {
        &self.inner.msg
    }

    /// Get the value of a field by key, formatted with `Debug`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;

        for field in &self.inner.fields {
            write!(f, "\n  {}: {}", field.key, field.value)?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }

        Ok(())
    }
}

impl fmt::Debug for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")?;

        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\nBacktrace:\n{}", self.inner.backtrace)?;
        }

        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::with_source("Format error", Box::new(value))
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        DbError::with_source("IO error", Box::new(value))
    }
}

/// Attach context to errors coming from outside of frameql.
pub trait ResultExt<T, E> {
    fn context(self, msg: &'static str) -> Result<T>;

    /// Like `context`, but the message is only built on error.
    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| DbError::with_source(msg, Box::new(e)))
    }

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| DbError::with_source(f(), Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Error with "Missing {msg}" if the option is `None`.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(DbError::new(format!("Missing {msg}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_fields_and_source() {
        let io = std::io::Error::other("disk on fire");
        let err = DbError::with_source("Failed to open", Box::new(io))
            .with_field("table", "t1")
            .with_field("rows", 3);

        let s = err.to_string();
        assert!(s.starts_with("Failed to open"));
        assert!(s.contains("table: \"t1\""));
        assert!(s.contains("rows: 3"));
        assert!(s.contains("disk on fire"));
        assert_eq!(Some("3"), err.field("rows"));
    }

    #[test]
    fn context_wraps_source() {
        let res: std::result::Result<i64, _> = "abc".parse::<i64>();
        let err = res.context("Failed to parse").unwrap_err();
        assert_eq!("Failed to parse", err.message());
        assert!(err.source().is_some());
    }

    #[test]
    fn required_on_none() {
        let err = None::<i32>.required("column").unwrap_err();
        assert_eq!("Missing column", err.message());
        assert_eq!(4, Some(4).required("column").unwrap());
    }
}

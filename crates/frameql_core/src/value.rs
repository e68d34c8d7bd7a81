use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use frameql_error::Result;

use crate::format::{DEFAULT_DATETIME_LAYOUT, Format};
use crate::scalar::ScalarValue;

/// A single formatted value.
///
/// The raw payload always matches the format. A missing payload is SQL NULL.
/// Two values are equal only if both format and payload are equal, so nulls
/// of different formats are not equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    format: Format,
    raw: Option<ScalarValue>,
}

impl Value {
    pub const fn null(format: Format) -> Self {
        Value { format, raw: None }
    }

    /// Create a value, converting the raw payload into `format`.
    pub fn try_new(format: Format, raw: Option<ScalarValue>) -> Result<Self> {
        let raw = format.convert(raw)?;
        Ok(Value { format, raw })
    }

    /// Create a value from a payload, taking the format from the payload.
    pub fn from_scalar(raw: ScalarValue) -> Self {
        Value {
            format: raw.format(),
            raw: Some(raw),
        }
    }

    pub fn integer(v: i64) -> Self {
        Self::from_scalar(ScalarValue::Integer(v))
    }

    pub fn double(v: f64) -> Self {
        Self::from_scalar(ScalarValue::Double(v))
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self::from_scalar(ScalarValue::String(v.into()))
    }

    pub fn bool(v: bool) -> Self {
        Self::from_scalar(ScalarValue::Bool(v))
    }

    pub fn datetime(v: DateTime<Utc>) -> Self {
        Self::from_scalar(ScalarValue::DateTime(v))
    }

    pub const fn format(&self) -> Format {
        self.format
    }

    pub const fn raw(&self) -> Option<&ScalarValue> {
        self.raw.as_ref()
    }

    pub fn into_raw(self) -> Option<ScalarValue> {
        self.raw
    }

    pub const fn is_nil(&self) -> bool {
        self.raw.is_none()
    }

    /// Convert this value into a different format.
    pub fn cast(&self, format: Format) -> Result<Value> {
        self.cast_with_layout(format, DEFAULT_DATETIME_LAYOUT)
    }

    pub fn cast_with_layout(&self, format: Format, layout: &str) -> Result<Value> {
        if format == self.format {
            return Ok(self.clone());
        }
        let raw = format.convert_with_layout(self.raw.clone(), layout)?;
        Ok(Value { format, raw })
    }

    pub fn as_string(&self) -> Result<Option<String>> {
        self.as_string_with_layout(DEFAULT_DATETIME_LAYOUT)
    }

    pub fn as_string_with_layout(&self, layout: &str) -> Result<Option<String>> {
        match Format::String.convert_with_layout(self.raw.clone(), layout)? {
            Some(ScalarValue::String(s)) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    pub fn as_int(&self) -> Result<Option<i64>> {
        match Format::Integer.convert(self.raw.clone())? {
            Some(ScalarValue::Integer(v)) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn as_double(&self) -> Result<Option<f64>> {
        match Format::Double.convert(self.raw.clone())? {
            Some(ScalarValue::Double(v)) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn as_bool(&self) -> Result<Option<bool>> {
        match Format::Bool.convert(self.raw.clone())? {
            Some(ScalarValue::Bool(v)) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn as_datetime(&self) -> Result<Option<DateTime<Utc>>> {
        self.as_datetime_with_layout(DEFAULT_DATETIME_LAYOUT)
    }

    pub fn as_datetime_with_layout(&self, layout: &str) -> Result<Option<DateTime<Utc>>> {
        match Format::DateTime.convert_with_layout(self.raw.clone(), layout)? {
            Some(ScalarValue::DateTime(v)) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    /// Order two values. Nulls sort before everything else.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (&self.raw, &other.raw) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.compare(b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Some(raw) => write!(f, "{raw}"),
            None => write!(f, "NULL"),
        }
    }
}

//! Value formats and the conversions between them.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use frameql_error::{DbError, Result};

use crate::scalar::ScalarValue;

/// Layout used when a datetime is converted to or from a string without an
/// explicit layout.
pub const DEFAULT_DATETIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

/// The closed set of value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Integer,
    Double,
    String,
    Bool,
    DateTime,
}

/// How a format is physically stored by the SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalKind {
    Integer,
    Real,
    Text,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Integer,
        Format::Double,
        Format::String,
        Format::Bool,
        Format::DateTime,
    ];

    /// Canonical lowercase name of the format.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Double => "double",
            Self::String => "string",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
        }
    }

    /// Column type to use when declaring a SQL column of this format.
    pub const fn sql_type_name(&self) -> &'static str {
        match self {
            Self::String => "text",
            other => other.name(),
        }
    }

    pub const fn physical_kind(&self) -> PhysicalKind {
        match self {
            Self::Integer | Self::Bool => PhysicalKind::Integer,
            Self::Double => PhysicalKind::Real,
            Self::String | Self::DateTime => PhysicalKind::Text,
        }
    }

    /// Look up a format from a declared column type name.
    ///
    /// Matching is case-insensitive. Returns `None` for names that don't map
    /// to any format.
    pub fn from_type_name(name: &str) -> Option<Format> {
        let name = name.trim().to_ascii_lowercase();
        Some(match name.as_str() {
            "integer" | "int" | "bigint" => Format::Integer,
            "double" | "real" | "float" => Format::Double,
            "string" | "text" | "varchar" => Format::String,
            "bool" | "boolean" => Format::Bool,
            "datetime" | "timestamp" => Format::DateTime,
            _ => return None,
        })
    }

    /// Convert a payload into this format using the default datetime layout.
    ///
    /// `None` (null) always passes through.
    pub fn convert(&self, input: Option<ScalarValue>) -> Result<Option<ScalarValue>> {
        self.convert_with_layout(input, DEFAULT_DATETIME_LAYOUT)
    }

    /// Convert a payload into this format, parsing and formatting datetimes
    /// with `layout`.
    pub fn convert_with_layout(
        &self,
        input: Option<ScalarValue>,
        layout: &str,
    ) -> Result<Option<ScalarValue>> {
        let input = match input {
            Some(input) => input,
            None => return Ok(None),
        };

        let out = match self {
            Self::Integer => ScalarValue::Integer(to_integer(input)?),
            Self::Double => ScalarValue::Double(to_double(input)?),
            Self::String => ScalarValue::String(match input {
                ScalarValue::String(s) => s,
                other => other.to_string_with_layout(layout),
            }),
            Self::Bool => ScalarValue::Bool(to_bool(input)?),
            Self::DateTime => ScalarValue::DateTime(to_datetime(input, layout)?),
        };

        Ok(Some(out))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Format {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::from_type_name(s).ok_or_else(|| DbError::new(format!("Unknown format '{s}'")))
    }
}

fn conversion_error(input: &ScalarValue, to: Format) -> DbError {
    DbError::new(format!("Cannot convert {} value to {to}", input.format()))
        .with_field("value", input.to_string())
}

fn to_integer(input: ScalarValue) -> Result<i64> {
    match input {
        ScalarValue::Integer(v) => Ok(v),
        ScalarValue::Double(v) => {
            // i64::MAX isn't representable as f64, the bound is exclusive.
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(conversion_error(&input, Format::Integer))
            }
        }
        ScalarValue::Bool(v) => Ok(v as i64),
        ScalarValue::String(ref s) => s
            .parse::<i64>()
            .map_err(|_| conversion_error(&input, Format::Integer)),
        ScalarValue::DateTime(v) => Ok(v.timestamp_millis()),
    }
}

fn to_double(input: ScalarValue) -> Result<f64> {
    match input {
        ScalarValue::Integer(v) => Ok(v as f64),
        ScalarValue::Double(v) => Ok(v),
        ScalarValue::Bool(v) => Ok(if v { 1.0 } else { 0.0 }),
        ScalarValue::String(ref s) => s
            .parse::<f64>()
            .map_err(|_| conversion_error(&input, Format::Double)),
        ScalarValue::DateTime(v) => Ok(v.timestamp_millis() as f64),
    }
}

fn to_bool(input: ScalarValue) -> Result<bool> {
    match input {
        ScalarValue::Integer(0) => Ok(false),
        ScalarValue::Integer(1) => Ok(true),
        ScalarValue::Double(v) if v == 0.0 => Ok(false),
        ScalarValue::Double(v) if v == 1.0 => Ok(true),
        ScalarValue::Bool(v) => Ok(v),
        ScalarValue::String(ref s) => {
            parse_bool(s).ok_or_else(|| conversion_error(&input, Format::Bool))
        }
        other => Err(conversion_error(&other, Format::Bool)),
    }
}

fn to_datetime(input: ScalarValue, layout: &str) -> Result<DateTime<Utc>> {
    let millis = match input {
        ScalarValue::DateTime(v) => return Ok(v),
        ScalarValue::String(ref s) => {
            return parse_datetime(s, layout).ok_or_else(|| {
                conversion_error(&input, Format::DateTime).with_field("layout", layout)
            });
        }
        ScalarValue::Integer(v) => Some(v),
        ScalarValue::Double(v) if v.fract() == 0.0 => Some(v as i64),
        _ => None,
    };

    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| conversion_error(&input, Format::DateTime))
}

/// Strict boolean parse.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Parse a datetime using a strftime-style layout.
///
/// Layouts without an offset are interpreted as UTC, and date-only layouts
/// as midnight UTC.
pub fn parse_datetime(s: &str, layout: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, layout) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, layout)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

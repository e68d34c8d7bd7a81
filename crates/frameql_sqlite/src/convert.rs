//! Conversions between frame values and SQLite values.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use frameql_core::dataframe::DataFrame;
use frameql_core::format::{DEFAULT_DATETIME_LAYOUT, Format, parse_datetime};
use frameql_core::row::Row;
use frameql_core::scalar::ScalarValue;
use frameql_core::schema::{Field, Schema};
use frameql_core::value::Value;
use frameql_error::{DbError, Result};
use rusqlite::types::Value as SqlValue;

/// Layouts tried after the configured one when reading datetimes back.
const FALLBACK_DATETIME_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", DEFAULT_DATETIME_LAYOUT];

/// Convert a value into the SQLite value of its physical kind.
///
/// NaN has no SQLite representation and becomes NULL.
pub fn value_to_sql(value: &Value, layout: &str) -> SqlValue {
    match value.raw() {
        None => SqlValue::Null,
        Some(ScalarValue::Double(v)) if v.is_nan() => SqlValue::Null,
        Some(ScalarValue::Integer(v)) => SqlValue::Integer(*v),
        Some(ScalarValue::Double(v)) => SqlValue::Real(*v),
        Some(ScalarValue::String(v)) => SqlValue::Text(v.clone()),
        Some(ScalarValue::Bool(v)) => SqlValue::Integer(*v as i64),
        Some(ScalarValue::DateTime(v)) => SqlValue::Text(v.format(layout).to_string()),
    }
}

/// Convert a SQLite value into a value of `format`.
pub fn sql_to_value(value: &SqlValue, format: Format, layout: &str) -> Result<Value> {
    let raw = match value {
        SqlValue::Null => return Ok(Value::null(format)),
        SqlValue::Integer(v) => ScalarValue::Integer(*v),
        SqlValue::Real(v) => ScalarValue::Double(*v),
        SqlValue::Text(v) if format == Format::DateTime => {
            return parse_sql_datetime(v, layout)
                .map(Value::datetime)
                .ok_or_else(|| {
                    DbError::new("Cannot convert text to datetime")
                        .with_field("value", v)
                        .with_field("layout", layout)
                });
        }
        SqlValue::Text(v) => ScalarValue::String(v.clone()),
        SqlValue::Blob(v) => ScalarValue::String(String::from_utf8_lossy(v).into_owned()),
    };

    Value::from_scalar(raw).cast_with_layout(format, layout)
}

fn parse_sql_datetime(s: &str, layout: &str) -> Option<DateTime<Utc>> {
    std::iter::once(layout)
        .chain(FALLBACK_DATETIME_LAYOUTS)
        .find_map(|layout| parse_datetime(s, layout))
}

/// Format of a result column with no declared type.
///
/// The column takes the format of the storage class shared by all its
/// non-null values. Mixed or all-null columns are strings.
pub fn infer_format<'a>(values: impl IntoIterator<Item = &'a SqlValue>) -> Format {
    let mut format = None;
    for value in values {
        let next = match value {
            SqlValue::Null => continue,
            SqlValue::Integer(_) => Format::Integer,
            SqlValue::Real(_) => Format::Double,
            SqlValue::Text(_) | SqlValue::Blob(_) => Format::String,
        };
        match format {
            None => format = Some(next),
            Some(f) if f == next => (),
            Some(_) => return Format::String,
        }
    }
    format.unwrap_or(Format::String)
}

/// A result column as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    pub decl_type: Option<String>,
}

impl ResultColumn {
    /// Format from the declared type, falling back to string for types the
    /// registry doesn't know.
    pub fn declared_format(&self) -> Option<Format> {
        self.decl_type
            .as_deref()
            .map(|t| Format::from_type_name(t).unwrap_or(Format::String))
    }
}

/// Build a frame from the columns and raw rows of a query result.
pub fn frame_from_sql(
    name: &str,
    columns: &[ResultColumn],
    rows: Vec<Vec<SqlValue>>,
    layout: &str,
) -> Result<DataFrame> {
    let fields = columns.iter().enumerate().map(|(idx, col)| {
        let format = col
            .declared_format()
            .unwrap_or_else(|| infer_format(rows.iter().map(|r| &r[idx])));
        Field::new(col.name.clone(), format)
    });
    let schema = Arc::new(Schema::new(fields));

    let rows = rows
        .iter()
        .map(|raw| {
            let values = raw
                .iter()
                .zip(schema.iter())
                .map(|(v, field)| {
                    sql_to_value(v, field.format, layout).map_err(|e| e.with_field("column", &field.name))
                })
                .collect::<Result<Vec<_>>>()?;
            Row::try_new(schema.clone(), values)
        })
        .collect::<Result<Vec<_>>>()?;

    DataFrame::try_from_rows(name, schema, rows)
}

//! Helpers for building and inspecting frames in tests.
use std::sync::Arc;

use crate::dataframe::DataFrame;
use crate::format::Format;
use crate::scalar::ScalarValue;
use crate::schema::{Field, Schema};

/// Build a schema from `(name, format)` pairs.
pub fn schema(fields: &[(&str, Format)]) -> Arc<Schema> {
    Arc::new(Schema::new(
        fields.iter().map(|(name, format)| Field::new(*name, *format)),
    ))
}

/// Build a frame from raw rows, panicking on conversion errors.
pub fn frame(
    name: &str,
    fields: &[(&str, Format)],
    rows: Vec<Vec<Option<ScalarValue>>>,
) -> DataFrame {
    DataFrame::try_from_raw_rows(name, schema(fields), rows).unwrap()
}

pub fn int(v: i64) -> Option<ScalarValue> {
    Some(ScalarValue::Integer(v))
}

pub fn double(v: f64) -> Option<ScalarValue> {
    Some(ScalarValue::Double(v))
}

pub fn text(v: &str) -> Option<ScalarValue> {
    Some(ScalarValue::String(v.to_string()))
}

/// Values of an integer-convertible column.
pub fn column_ints(frame: &DataFrame, col: usize) -> Vec<Option<i64>> {
    frame
        .iter()
        .map(|row| row.values()[col].as_int().unwrap())
        .collect()
}

/// String forms of a column.
pub fn column_strings(frame: &DataFrame, col: usize) -> Vec<Option<String>> {
    frame
        .iter()
        .map(|row| row.values()[col].as_string().unwrap())
        .collect()
}

use std::sync::Arc;

use frameql_error::{DbError, Result};

use crate::format::Format;
use crate::schema::{Field, Schema};
use crate::value::Value;

/// Separator placed between the parts of a composite group key.
pub const GROUP_KEY_SEPARATOR: char = '\u{1f}';

/// Stands in for a null value inside a group key.
pub const GROUP_KEY_NULL: &str = "\u{0}";

/// Precedes any separator, null marker or escape character that appears in
/// a value's string form, so keys of distinct values never collide.
pub const GROUP_KEY_ESCAPE: char = '\u{1b}';

/// An ordered tuple of values bound to a schema.
///
/// Rows built through `try_new` always have one value per schema field with
/// a matching format.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row, checking values against the schema.
    pub fn try_new(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(DbError::new("Row length does not match schema")
                .with_field("row_len", values.len())
                .with_field("schema_len", schema.len()));
        }

        for (idx, (value, field)) in values.iter().zip(schema.iter()).enumerate() {
            if value.format() != field.format {
                return Err(DbError::new("Value format does not match schema")
                    .with_field("column", idx)
                    .with_field("name", &field.name)
                    .with_field("expected", field.format)
                    .with_field("got", value.format()));
            }
        }

        Ok(Row { schema, values })
    }

    /// Create a row, converting each value into the format of its field.
    pub fn try_coerce(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(DbError::new("Row length does not match schema")
                .with_field("row_len", values.len())
                .with_field("schema_len", schema.len()));
        }

        let values = values
            .into_iter()
            .zip(schema.iter())
            .map(|(v, field)| {
                if v.format() == field.format {
                    Ok(v)
                } else {
                    v.cast(field.format)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Row { schema, values })
    }

    /// A row of all nulls for the given schema.
    pub fn nulls(schema: Arc<Schema>) -> Self {
        let values = schema.formats().map(Value::null).collect();
        Row { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get a value by case-insensitive column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|idx| &self.values[idx])
    }

    pub fn try_get_by_name(&self, name: &str) -> Result<&Value> {
        let idx = self.schema.try_index_of(name)?;
        Ok(&self.values[idx])
    }

    /// Project the row down to the given column indices.
    pub fn select(&self, indices: &[usize]) -> Result<Row> {
        let schema = Arc::new(self.schema.project(indices)?);
        let values = indices.iter().map(|&idx| self.values[idx].clone()).collect();
        Ok(Row { schema, values })
    }

    /// Returns a new row with an extra named value at the end.
    pub fn append(&self, name: &str, value: Value) -> Result<Row> {
        let schema = Arc::new(
            self.schema
                .try_with_field(Field::new(name, value.format()))?,
        );
        let mut values = self.values.clone();
        values.push(value);
        Ok(Row { schema, values })
    }

    pub fn is_any_nil(&self) -> bool {
        self.values.iter().any(|v| v.is_nil())
    }

    pub fn format_at(&self, idx: usize) -> Option<Format> {
        self.values.get(idx).map(|v| v.format())
    }

    /// Build the composite group key for the given columns.
    pub fn group_key(&self, columns: &[usize]) -> String {
        group_key(columns.iter().filter_map(|&idx| self.values.get(idx)))
    }
}

/// Concatenate the string forms of values into a single group key.
pub fn group_key<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    let mut key = String::new();
    for (idx, value) in values.into_iter().enumerate() {
        if idx > 0 {
            key.push(GROUP_KEY_SEPARATOR);
        }
        match value.raw() {
            Some(raw) => {
                for c in raw.to_string().chars() {
                    if matches!(c, GROUP_KEY_SEPARATOR | GROUP_KEY_ESCAPE | '\u{0}') {
                        key.push(GROUP_KEY_ESCAPE);
                    }
                    key.push(c);
                }
            }
            None => key.push_str(GROUP_KEY_NULL),
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new([
            Field::new("id", Format::Integer),
            Field::new("name", Format::String),
        ]))
    }

    #[test]
    fn try_new_checks_shape() {
        Row::try_new(schema(), vec![Value::integer(1)]).unwrap_err();
        Row::try_new(schema(), vec![Value::string("1"), Value::string("a")]).unwrap_err();
        Row::try_new(schema(), vec![Value::integer(1), Value::null(Format::String)]).unwrap();
    }

    #[test]
    fn try_coerce_converts() {
        let row = Row::try_coerce(schema(), vec![Value::string("5"), Value::integer(3)]).unwrap();
        assert_eq!(&Value::integer(5), row.get(0).unwrap());
        assert_eq!(&Value::string("3"), row.get(1).unwrap());

        Row::try_coerce(schema(), vec![Value::string("x"), Value::integer(3)]).unwrap_err();
    }

    #[test]
    fn access_by_name() {
        let row = Row::try_new(schema(), vec![Value::integer(1), Value::string("a")]).unwrap();
        assert_eq!(&Value::string("a"), row.get_by_name("NAME").unwrap());
        assert!(row.get_by_name("missing").is_none());
        row.try_get_by_name("missing").unwrap_err();
    }

    #[test]
    fn select_and_append() {
        let row = Row::try_new(schema(), vec![Value::integer(1), Value::string("a")]).unwrap();

        let selected = row.select(&[1]).unwrap();
        assert_eq!(1, selected.len());
        assert_eq!("name", selected.schema().field(0).unwrap().name);

        let appended = row.append("flag", Value::bool(true)).unwrap();
        assert_eq!(3, appended.len());
        assert_eq!(Format::Bool, appended.format_at(2).unwrap());
        assert_eq!(2, row.len());

        row.append("id", Value::bool(true)).unwrap_err();
    }

    #[test]
    fn nil_checks_and_keys() {
        let row = Row::try_new(schema(), vec![Value::integer(1), Value::null(Format::String)])
            .unwrap();
        assert!(row.is_any_nil());
        assert_eq!(format!("1{GROUP_KEY_SEPARATOR}{GROUP_KEY_NULL}"), row.group_key(&[0, 1]));
        assert!(!Row::nulls(schema()).values().iter().any(|v| !v.is_nil()));
    }

    #[test]
    fn keys_escape_reserved_characters() {
        let null = Value::null(Format::String);
        let nul_text = Value::string(GROUP_KEY_NULL);
        assert_ne!(group_key([&null]), group_key([&nul_text]));

        // ("a<sep>b", "c") and ("a", "b<sep>c") are different groups.
        let left = [
            Value::string(format!("a{GROUP_KEY_SEPARATOR}b")),
            Value::string("c"),
        ];
        let right = [
            Value::string("a"),
            Value::string(format!("b{GROUP_KEY_SEPARATOR}c")),
        ];
        assert_ne!(group_key(&left), group_key(&right));

        let escape = Value::string(GROUP_KEY_ESCAPE.to_string());
        assert_eq!(
            format!("{GROUP_KEY_ESCAPE}{GROUP_KEY_ESCAPE}"),
            group_key([&escape])
        );
        assert_eq!("plain", group_key([&Value::string("plain")]));
    }
}

use frameql_error::{DbError, Result};

use crate::format::Format;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub format: Format,
}

impl Field {
    pub fn new(name: impl Into<String>, format: Format) -> Self {
        Field {
            name: name.into(),
            format,
        }
    }
}

/// Ordered list of named, formatted fields.
///
/// Name lookups are case-insensitive. Duplicate names are allowed, but only
/// the first field with a given name can be found by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema {
            fields: fields.into_iter().collect(),
        }
    }

    pub const fn empty() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|idx| &self.fields[idx])
    }

    /// Like `index_of`, but errors if the name doesn't exist.
    pub fn try_index_of(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| DbError::new(format!("Missing column '{name}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn formats(&self) -> impl Iterator<Item = Format> + '_ {
        self.fields.iter().map(|f| f.format)
    }

    /// Returns a new schema with `field` appended.
    ///
    /// Errors if a field with the same name already exists.
    pub fn try_with_field(&self, field: Field) -> Result<Schema> {
        if self.index_of(&field.name).is_some() {
            return Err(DbError::new(format!(
                "Column '{}' already exists",
                field.name
            )));
        }
        let mut fields = self.fields.clone();
        fields.push(field);
        Ok(Schema { fields })
    }

    /// Returns the index of the removed field and the new schema.
    pub fn try_without_field(&self, name: &str) -> Result<(usize, Schema)> {
        let idx = self.try_index_of(name)?;
        let mut fields = self.fields.clone();
        fields.remove(idx);
        Ok((idx, Schema { fields }))
    }

    pub fn try_rename_field(&self, from: &str, to: &str) -> Result<Schema> {
        let idx = self.try_index_of(from)?;
        if let Some(existing) = self.index_of(to) {
            if existing != idx {
                return Err(DbError::new(format!("Column '{to}' already exists")));
            }
        }
        let mut fields = self.fields.clone();
        fields[idx].name = to.to_string();
        Ok(Schema { fields })
    }

    /// Project the schema down to the given indices, in the given order.
    pub fn project(&self, indices: &[usize]) -> Result<Schema> {
        let fields = indices
            .iter()
            .map(|&idx| {
                self.fields.get(idx).cloned().ok_or_else(|| {
                    DbError::new("Column index out of range")
                        .with_field("index", idx)
                        .with_field("len", self.fields.len())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema { fields })
    }

    /// Concatenate two schemas. Duplicate names are kept.
    pub fn merge(&self, other: &Schema) -> Schema {
        Schema {
            fields: self.fields.iter().chain(&other.fields).cloned().collect(),
        }
    }

    /// Check that rows of `other` can be combined with rows of this schema.
    ///
    /// Schemas are compatible if they have the same number of fields with
    /// pointwise equal formats and names (ignoring case).
    pub fn verify_compatible(&self, other: &Schema, operation: &str) -> Result<()> {
        let compatible = self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.format == b.format && a.name.eq_ignore_ascii_case(&b.name));

        if !compatible {
            return Err(DbError::new(format!("Schema mismatch for {operation}"))
                .with_field("left", self.describe())
                .with_field("right", other.describe()));
        }

        Ok(())
    }

    fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{} {}", f.name, f.format))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<Field> for Schema {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        Schema::new(iter)
    }
}

//! Series and frames partitioned by group key.
//!
//! Keys are the string forms of the grouping values joined with
//! [`GROUP_KEY_SEPARATOR`](crate::row::GROUP_KEY_SEPARATOR), with reserved
//! characters escaped. Groups are kept in the order their key was first seen.
use std::sync::Arc;

use frameql_error::{DbError, Result};
use indexmap::IndexMap;

use crate::dataframe::DataFrame;
use crate::format::Format;
use crate::row::{Row, group_key};
use crate::schema::Schema;
use crate::series::Series;
use crate::value::Value;

type GroupMap<T> = IndexMap<String, T, ahash::RandomState>;

#[derive(Debug, Clone)]
pub struct GroupedSeries {
    name: String,
    format: Format,
    groups: GroupMap<Series>,
}

impl GroupedSeries {
    pub(crate) fn from_series(series: &Series) -> Self {
        let mut groups: GroupMap<Vec<Value>> = GroupMap::default();
        for v in series.iter() {
            groups
                .entry(group_key([v]))
                .or_default()
                .push(v.clone());
        }

        let groups = groups
            .into_iter()
            .map(|(key, values)| {
                let series = Series::new_unchecked(series.name(), series.format(), values);
                (key, series)
            })
            .collect();

        GroupedSeries {
            name: series.name().to_string(),
            format: series.format(),
            groups,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(|k| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Series> {
        self.groups.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.groups.iter().map(|(k, s)| (k.as_str(), s))
    }

    /// Map every element of every group.
    pub fn map<F>(&self, format: Format, mut f: F) -> Result<GroupedSeries>
    where
        F: FnMut(&Value) -> Result<Value>,
    {
        let groups = self
            .groups
            .iter()
            .map(|(key, s)| Ok((key.clone(), s.map(format, &mut f)?)))
            .collect::<Result<GroupMap<_>>>()?;

        Ok(GroupedSeries {
            name: self.name.clone(),
            format,
            groups,
        })
    }

    /// Filter every group, dropping groups left empty.
    pub fn filter<F>(&self, mut predicate: F) -> Result<GroupedSeries>
    where
        F: FnMut(&Value) -> Result<bool>,
    {
        let mut groups = GroupMap::default();
        for (key, s) in &self.groups {
            let filtered = s.filter(&mut predicate)?;
            if !filtered.is_empty() {
                groups.insert(key.clone(), filtered);
            }
        }

        Ok(GroupedSeries {
            name: self.name.clone(),
            format: self.format,
            groups,
        })
    }

    /// Fold every group, producing one value per group in key order.
    ///
    /// Results are converted into the format of `seed`.
    pub fn reduce<F>(&self, seed: Value, mut f: F) -> Result<Series>
    where
        F: FnMut(Value, &Value) -> Result<Value>,
    {
        let format = seed.format();
        let values = self
            .groups
            .values()
            .map(|s| s.reduce(seed.clone(), &mut f)?.cast(format))
            .collect::<Result<Vec<_>>>()?;
        Series::try_new(self.name.clone(), format, values)
    }

    /// Number of elements per group, in key order.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.groups
            .iter()
            .map(|(k, s)| (k.as_str(), s.len()))
            .collect()
    }

    /// Concatenate the groups back into one series, group by group.
    pub fn ungroup(&self) -> Series {
        let values = self
            .groups
            .values()
            .flat_map(|s| s.values().iter().cloned())
            .collect();
        Series::new_unchecked(&self.name, self.format, values)
    }
}

#[derive(Debug, Clone)]
pub struct GroupedDataFrame {
    name: String,
    schema: Arc<Schema>,
    key_columns: Vec<usize>,
    groups: GroupMap<DataFrame>,
}

impl GroupedDataFrame {
    pub(crate) fn try_from_frame(frame: &DataFrame, key_columns: Vec<usize>) -> Result<Self> {
        if let Some(&col) = key_columns.iter().find(|&&c| c >= frame.num_columns()) {
            return Err(DbError::new("Group column out of range")
                .with_field("column", col)
                .with_field("len", frame.num_columns()));
        }

        let mut rows: GroupMap<Vec<Row>> = GroupMap::default();
        for row in frame.iter() {
            rows.entry(row.group_key(&key_columns))
                .or_default()
                .push(row.clone());
        }

        let groups = rows
            .into_iter()
            .map(|(key, rows)| {
                let group = DataFrame::try_from_rows(frame.name(), frame.schema().clone(), rows)?;
                Ok((key, group))
            })
            .collect::<Result<GroupMap<_>>>()?;

        Ok(GroupedDataFrame {
            name: frame.name().to_string(),
            schema: frame.schema().clone(),
            key_columns,
            groups,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Indices of the columns making up the group key.
    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(|k| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&DataFrame> {
        self.groups.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataFrame)> {
        self.groups.iter().map(|(k, df)| (k.as_str(), df))
    }

    /// Map the rows of every group into rows of `schema`.
    pub fn map<F>(&self, schema: Arc<Schema>, mut f: F) -> Result<GroupedDataFrame>
    where
        F: FnMut(&Row) -> Result<Vec<Value>>,
    {
        let groups = self
            .groups
            .iter()
            .map(|(key, df)| Ok((key.clone(), df.map_rows(schema.clone(), &mut f)?)))
            .collect::<Result<GroupMap<_>>>()?;

        Ok(GroupedDataFrame {
            name: self.name.clone(),
            schema,
            key_columns: self.key_columns.clone(),
            groups,
        })
    }

    /// Filter the rows of every group, dropping groups left empty.
    pub fn filter<F>(&self, mut predicate: F) -> Result<GroupedDataFrame>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        let mut groups = GroupMap::default();
        for (key, df) in &self.groups {
            let filtered = df.filter_rows(&mut predicate)?;
            if !filtered.is_empty() {
                groups.insert(key.clone(), filtered);
            }
        }

        Ok(GroupedDataFrame {
            name: self.name.clone(),
            schema: self.schema.clone(),
            key_columns: self.key_columns.clone(),
            groups,
        })
    }

    /// Produce one row of `schema` per group, in key order.
    pub fn aggregate<F>(&self, schema: Arc<Schema>, mut f: F) -> Result<DataFrame>
    where
        F: FnMut(&str, &DataFrame) -> Result<Vec<Value>>,
    {
        let rows = self
            .groups
            .iter()
            .map(|(key, df)| Row::try_coerce(schema.clone(), f(key, df)?))
            .collect::<Result<Vec<_>>>()?;
        DataFrame::try_from_rows(self.name.clone(), schema, rows)
    }

    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.groups
            .iter()
            .map(|(k, df)| (k.as_str(), df.len()))
            .collect()
    }

    /// Concatenate the groups back into one frame, group by group.
    pub fn ungroup(&self) -> Result<DataFrame> {
        let rows = self
            .groups
            .values()
            .flat_map(|df| df.rows().iter().cloned())
            .collect::<Vec<_>>();
        DataFrame::try_from_rows(self.name.clone(), self.schema.clone(), rows)
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use frameql_error::{DbError, Result};

use crate::format::Format;
use crate::grouped::GroupedDataFrame;
use crate::join::{JoinType, drive_join};
use crate::row::Row;
use crate::scalar::ScalarValue;
use crate::schema::{Field, Schema};
use crate::series::Series;
use crate::sort::{SortKey, compare_rows};
use crate::value::Value;

/// A named table of rows sharing a single schema.
///
/// All operations are pure and return a new frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    name: String,
    schema: Arc<Schema>,
    rows: Vec<Row>,
}

impl DataFrame {
    pub fn empty(name: impl Into<String>, schema: Arc<Schema>) -> Self {
        DataFrame {
            name: name.into(),
            schema,
            rows: Vec::new(),
        }
    }

    /// Create a frame from rows, rebinding every row to `schema`.
    ///
    /// Rows must have the same width and formats as the schema.
    pub fn try_from_rows(
        name: impl Into<String>,
        schema: Arc<Schema>,
        rows: impl IntoIterator<Item = Row>,
    ) -> Result<Self> {
        let rows = rows
            .into_iter()
            .map(|row| {
                if Arc::ptr_eq(row.schema(), &schema) {
                    Ok(row)
                } else {
                    Row::try_new(schema.clone(), row.into_values())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DataFrame {
            name: name.into(),
            schema,
            rows,
        })
    }

    /// Create a frame from raw row payloads.
    ///
    /// Each payload is converted into the format of its schema field.
    pub fn try_from_raw_rows<I, R, T>(
        name: impl Into<String>,
        schema: Arc<Schema>,
        rows: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = Option<T>>,
        T: Into<ScalarValue>,
    {
        let mut out = Vec::new();
        for (row_idx, raw) in rows.into_iter().enumerate() {
            let mut values = Vec::with_capacity(schema.len());
            for (col_idx, v) in raw.into_iter().enumerate() {
                let field = schema.field(col_idx).ok_or_else(|| {
                    DbError::new("Row has more values than the schema has fields")
                        .with_field("row", row_idx)
                        .with_field("schema_len", schema.len())
                })?;
                let value = Value::try_new(field.format, v.map(Into::into)).map_err(|e| {
                    DbError::with_source("Failed to convert row value", Box::new(e))
                        .with_field("row", row_idx)
                        .with_field("column", &field.name)
                })?;
                values.push(value);
            }
            out.push(Row::try_new(schema.clone(), values)?);
        }

        Ok(DataFrame {
            name: name.into(),
            schema,
            rows: out,
        })
    }

    /// Create a frame from columns of equal length.
    pub fn try_from_series(name: impl Into<String>, series: &[Series]) -> Result<Self> {
        let len = series.first().map(|s| s.len()).unwrap_or(0);
        if let Some(bad) = series.iter().find(|s| s.len() != len) {
            return Err(DbError::new("Series lengths differ")
                .with_field("expected", len)
                .with_field("series", bad.name())
                .with_field("got", bad.len()));
        }

        let schema = Arc::new(Schema::new(
            series.iter().map(|s| Field::new(s.name(), s.format())),
        ));
        let rows = (0..len)
            .map(|idx| {
                let values = series.iter().map(|s| s.values()[idx].clone()).collect();
                Row::try_new(schema.clone(), values)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DataFrame {
            name: name.into(),
            schema,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.len()
    }

    fn derive(&self, rows: Vec<Row>) -> DataFrame {
        DataFrame {
            name: self.name.clone(),
            schema: self.schema.clone(),
            rows,
        }
    }

    fn derive_with_schema(&self, schema: Schema, rows: Vec<Vec<Value>>) -> Result<DataFrame> {
        let schema = Arc::new(schema);
        let rows = rows
            .into_iter()
            .map(|values| Row::try_new(schema.clone(), values))
            .collect::<Result<Vec<_>>>()?;
        Ok(DataFrame {
            name: self.name.clone(),
            schema,
            rows,
        })
    }

    /// Extract a column.
    pub fn series(&self, idx: usize) -> Result<Series> {
        let field = self.schema.field(idx).ok_or_else(|| {
            DbError::new("Column index out of range")
                .with_field("index", idx)
                .with_field("len", self.schema.len())
        })?;
        let values = self.rows.iter().map(|r| r.values()[idx].clone()).collect();
        Series::try_new(field.name.clone(), field.format, values)
    }

    /// Extract a column by case-insensitive name.
    pub fn series_by_name(&self, name: &str) -> Result<Series> {
        self.series(self.schema.try_index_of(name)?)
    }

    /// Add a column to the end of the frame.
    pub fn add_series(&self, series: &Series) -> Result<DataFrame> {
        if series.len() != self.len() {
            return Err(DbError::new("Series length does not match frame length")
                .with_field("series", series.name())
                .with_field("series_len", series.len())
                .with_field("frame_len", self.len()));
        }

        let schema = self
            .schema
            .try_with_field(Field::new(series.name(), series.format()))?;
        let rows = self
            .rows
            .iter()
            .zip(series.iter())
            .map(|(row, v)| {
                let mut values = row.values().to_vec();
                values.push(v.clone());
                values
            })
            .collect();

        self.derive_with_schema(schema, rows)
    }

    pub fn remove_series(&self, name: &str) -> Result<DataFrame> {
        let (idx, schema) = self.schema.try_without_field(name)?;
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut values = row.values().to_vec();
                values.remove(idx);
                values
            })
            .collect();

        self.derive_with_schema(schema, rows)
    }

    pub fn rename_series(&self, from: &str, to: &str) -> Result<DataFrame> {
        let schema = self.schema.try_rename_field(from, to)?;
        let rows = self.rows.iter().map(|r| r.values().to_vec()).collect();
        self.derive_with_schema(schema, rows)
    }

    /// Project the frame down to the given column indices.
    pub fn select_series(&self, indices: &[usize]) -> Result<DataFrame> {
        let schema = self.schema.project(indices)?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&idx| row.values()[idx].clone()).collect())
            .collect();
        self.derive_with_schema(schema, rows)
    }

    /// Keep the rows where `mask` is true.
    ///
    /// Null mask entries count as false. A mask shorter than the frame
    /// stops the scan early.
    pub fn select_rows(&self, mask: &Series) -> Result<DataFrame> {
        if mask.format() != Format::Bool {
            return Err(DbError::new("Row selection mask must be bool")
                .with_field("format", mask.format()));
        }

        let mut rows = Vec::new();
        for (row, keep) in self.rows.iter().zip(mask.iter()) {
            if keep.as_bool()?.unwrap_or(false) {
                rows.push(row.clone());
            }
        }

        Ok(self.derive(rows))
    }

    /// Transform every row into a row of `schema`.
    ///
    /// Returned values are converted into the formats of `schema`.
    pub fn map_rows<F>(&self, schema: Arc<Schema>, mut f: F) -> Result<DataFrame>
    where
        F: FnMut(&Row) -> Result<Vec<Value>>,
    {
        let rows = self
            .rows
            .iter()
            .map(|row| Row::try_coerce(schema.clone(), f(row)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(DataFrame {
            name: self.name.clone(),
            schema,
            rows,
        })
    }

    /// Transform every row into zero or more rows of `schema`.
    pub fn flat_map_rows<F>(&self, schema: Arc<Schema>, mut f: F) -> Result<DataFrame>
    where
        F: FnMut(&Row) -> Result<Vec<Vec<Value>>>,
    {
        let mut rows = Vec::new();
        for row in &self.rows {
            for values in f(row)? {
                rows.push(Row::try_coerce(schema.clone(), values)?);
            }
        }

        Ok(DataFrame {
            name: self.name.clone(),
            schema,
            rows,
        })
    }

    pub fn filter_rows<F>(&self, mut predicate: F) -> Result<DataFrame>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        let mut rows = Vec::new();
        for row in &self.rows {
            if predicate(row)? {
                rows.push(row.clone());
            }
        }
        Ok(self.derive(rows))
    }

    /// Left fold over the rows.
    pub fn reduce_rows<T, F>(&self, seed: T, mut f: F) -> Result<T>
    where
        F: FnMut(T, &Row) -> Result<T>,
    {
        let mut acc = seed;
        for row in &self.rows {
            acc = f(acc, row)?;
        }
        Ok(acc)
    }

    /// Stable multi-key sort.
    pub fn sort(&self, keys: &[SortKey]) -> Result<DataFrame> {
        if let Some(key) = keys.iter().find(|k| k.column >= self.schema.len()) {
            return Err(DbError::new("Sort column out of range")
                .with_field("column", key.column)
                .with_field("len", self.schema.len()));
        }

        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| compare_rows(a, b, keys));
        Ok(self.derive(rows))
    }

    /// Join with another frame.
    ///
    /// With an empty `on` list rows are paired by position (or as a
    /// cartesian product for cross joins). Otherwise rows match when every
    /// `(left column, right column)` pair holds equal, non-null values.
    /// Rows produced by `combiner` are converted into `schema`.
    pub fn join<F>(
        &self,
        name: impl Into<String>,
        schema: Arc<Schema>,
        other: &DataFrame,
        join_type: JoinType,
        on: &[(usize, usize)],
        mut combiner: F,
    ) -> Result<DataFrame>
    where
        F: FnMut(Option<&Row>, Option<&Row>) -> Result<Vec<Vec<Value>>>,
    {
        if let Some(&(l, r)) = on
            .iter()
            .find(|(l, r)| *l >= self.num_columns() || *r >= other.num_columns())
        {
            return Err(DbError::new("Join column out of range")
                .with_field("left", l)
                .with_field("right", r));
        }

        let matcher = (!on.is_empty()).then_some(|l: &Row, r: &Row| {
            on.iter().all(|&(lc, rc)| {
                let (a, b) = (&l.values()[lc], &r.values()[rc]);
                !a.is_nil() && a == b
            })
        });

        let mut rows = Vec::new();
        drive_join(&self.rows, &other.rows, join_type, matcher, |l, r| {
            for values in combiner(l, r)? {
                rows.push(Row::try_coerce(schema.clone(), values)?);
            }
            Ok(())
        })?;

        Ok(DataFrame {
            name: name.into(),
            schema,
            rows,
        })
    }

    pub fn append(&self, other: &DataFrame) -> Result<DataFrame> {
        self.schema.verify_compatible(&other.schema, "append")?;
        let mut rows = self.rows.clone();
        rows.extend(
            other
                .rows
                .iter()
                .map(|r| Row::try_new(self.schema.clone(), r.values().to_vec()))
                .collect::<Result<Vec<_>>>()?,
        );
        Ok(self.derive(rows))
    }

    pub fn limit(&self, n: usize) -> DataFrame {
        self.derive(self.rows.iter().take(n).cloned().collect())
    }

    /// Remove later duplicate rows, keeping first-seen order.
    pub fn distinct(&self) -> DataFrame {
        let mut seen = HashSet::with_hasher(ahash::RandomState::new());
        let rows = self
            .rows
            .iter()
            .filter(|r| seen.insert(r.values()))
            .cloned()
            .collect();
        self.derive(rows)
    }

    /// Distinct rows from both frames.
    pub fn union(&self, other: &DataFrame) -> Result<DataFrame> {
        self.schema.verify_compatible(&other.schema, "union")?;
        Ok(self.append(other)?.distinct())
    }

    /// Distinct rows of this frame that also appear in `other`.
    pub fn intersection(&self, other: &DataFrame) -> Result<DataFrame> {
        self.schema.verify_compatible(&other.schema, "intersection")?;
        let other: HashSet<_, ahash::RandomState> = other.rows.iter().map(|r| r.values()).collect();
        let rows = self
            .distinct()
            .rows
            .into_iter()
            .filter(|r| other.contains(r.values()))
            .collect();
        Ok(self.derive(rows))
    }

    /// Distinct rows of this frame that don't appear in `other`.
    pub fn except(&self, other: &DataFrame) -> Result<DataFrame> {
        self.schema.verify_compatible(&other.schema, "except")?;
        let other: HashSet<_, ahash::RandomState> = other.rows.iter().map(|r| r.values()).collect();
        let rows = self
            .distinct()
            .rows
            .into_iter()
            .filter(|r| !other.contains(r.values()))
            .collect();
        Ok(self.derive(rows))
    }

    /// Group rows by the values of `key_col` and `other_cols`.
    pub fn group(&self, key_col: usize, other_cols: &[usize]) -> Result<GroupedDataFrame> {
        let mut columns = Vec::with_capacity(other_cols.len() + 1);
        columns.push(key_col);
        columns.extend_from_slice(other_cols);
        GroupedDataFrame::try_from_frame(self, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{column_ints, column_strings, frame, int, schema, text};

    fn people() -> DataFrame {
        frame(
            "people",
            &[("name", Format::String), ("age", Format::Integer)],
            vec![
                vec![text("a"), int(1)],
                vec![text("b"), int(1)],
                vec![text("a"), int(2)],
            ],
        )
    }

    #[test]
    fn raw_rows_convert_through_schema() {
        let df = frame(
            "t",
            &[("a", Format::Integer), ("b", Format::Bool)],
            vec![vec![text("12"), text("true")], vec![None, None]],
        );
        assert_eq!(vec![Some(12), None], column_ints(&df, 0));
        assert_eq!(&Value::bool(true), df.row(0).unwrap().get(1).unwrap());

        let err = DataFrame::try_from_raw_rows(
            "t",
            schema(&[("a", Format::Integer)]),
            vec![vec![Some(ScalarValue::from("x"))]],
        )
        .unwrap_err();
        assert_eq!(Some("\"a\""), err.field("column"));

        DataFrame::try_from_raw_rows(
            "t",
            schema(&[("a", Format::Integer)]),
            vec![vec![Some(ScalarValue::Integer(1)), Some(ScalarValue::Integer(2))]],
        )
        .unwrap_err();
    }

    #[test]
    fn series_round_trip() {
        let df = people();
        let names = df.series_by_name("NAME").unwrap();
        assert_eq!("name", names.name());
        assert_eq!(3, names.len());

        let back = DataFrame::try_from_series("people", &[names, df.series(1).unwrap()]).unwrap();
        assert_eq!(df.rows().len(), back.rows().len());
        assert_eq!(column_strings(&df, 0), column_strings(&back, 0));

        df.series(5).unwrap_err();
        df.series_by_name("missing").unwrap_err();
    }

    #[test]
    fn try_from_series_length_mismatch() {
        let a = Series::try_from_raw("a", Format::Integer, [Some(1)]).unwrap();
        let b = Series::try_from_raw("b", Format::Integer, [Some(1), Some(2)]).unwrap();
        DataFrame::try_from_series("t", &[a, b]).unwrap_err();
    }

    #[test]
    fn add_remove_rename() {
        let df = people();
        let flag = Series::try_from_raw("flag", Format::Bool, [Some(true), Some(false), None])
            .unwrap();

        let added = df.add_series(&flag).unwrap();
        assert_eq!(3, added.num_columns());
        assert_eq!(2, df.num_columns());

        df.add_series(&flag.clone().with_name("NAME")).unwrap_err();
        df.add_series(&flag.limit(1)).unwrap_err();

        let removed = added.remove_series("age").unwrap();
        assert_eq!(vec!["name", "flag"], removed.schema().names().collect::<Vec<_>>());
        added.remove_series("age2").unwrap_err();

        let renamed = df.rename_series("age", "years").unwrap();
        assert_eq!(Some(1), renamed.schema().index_of("years"));
        df.rename_series("age", "name").unwrap_err();
    }

    #[test]
    fn select_series_and_rows() {
        let df = people();
        let projected = df.select_series(&[1]).unwrap();
        assert_eq!(vec![Some(1), Some(1), Some(2)], column_ints(&projected, 0));

        let mask = Series::try_from_raw("m", Format::Bool, [Some(false), None]).unwrap();
        assert!(df.select_rows(&mask).unwrap().is_empty());

        let mask = Series::try_from_raw("m", Format::Bool, [Some(true), None, Some(true)]).unwrap();
        let selected = df.select_rows(&mask).unwrap();
        assert_eq!(vec![Some(1), Some(2)], column_ints(&selected, 1));

        let mask = Series::try_from_raw("m", Format::Integer, [Some(1)]).unwrap();
        df.select_rows(&mask).unwrap_err();
    }

    #[test]
    fn map_filter_flat_map() {
        let df = people();
        let out_schema = schema(&[("label", Format::String)]);
        let mapped = df
            .map_rows(out_schema.clone(), |row| {
                Ok(vec![Value::string(format!(
                    "{}{}",
                    row.values()[0],
                    row.values()[1]
                ))])
            })
            .unwrap();
        assert_eq!(
            vec![Some("a1".to_string()), Some("b1".to_string()), Some("a2".to_string())],
            column_strings(&mapped, 0)
        );

        let doubled = df
            .flat_map_rows(out_schema, |row| {
                Ok(vec![vec![row.values()[0].clone()], vec![row.values()[0].clone()]])
            })
            .unwrap();
        assert_eq!(6, doubled.len());

        let filtered = df
            .filter_rows(|row| Ok(row.values()[0] == Value::string("a")))
            .unwrap();
        assert_eq!(vec![Some(1), Some(2)], column_ints(&filtered, 1));

        let total = df
            .reduce_rows(0, |acc, row| Ok(acc + row.values()[1].as_int()?.unwrap_or(0)))
            .unwrap();
        assert_eq!(4, total);

        // Output values are coerced into the declared schema.
        let coerced = df
            .map_rows(schema(&[("age", Format::String)]), |row| {
                Ok(vec![row.values()[1].clone()])
            })
            .unwrap();
        assert_eq!(Some("1".to_string()), column_strings(&coerced, 0)[0]);
    }

    #[test]
    fn sort_is_stable() {
        let df = people();
        let sorted = df.sort(&[SortKey::asc(1)]).unwrap();
        assert_eq!(
            vec![Some("a".to_string()), Some("b".to_string()), Some("a".to_string())],
            column_strings(&sorted, 0)
        );
        assert_eq!(vec![Some(1), Some(1), Some(2)], column_ints(&sorted, 1));

        let sorted = df.sort(&[SortKey::desc(1), SortKey::asc(0)]).unwrap();
        assert_eq!(vec![Some(2), Some(1), Some(1)], column_ints(&sorted, 1));

        let sorted = df.sort(&[SortKey::asc(0), SortKey::desc(1)]).unwrap();
        assert_eq!(vec![Some(2), Some(1), Some(1)], column_ints(&sorted, 1));

        df.sort(&[SortKey::asc(9)]).unwrap_err();
    }

    #[test]
    fn join_on_columns() {
        let left = frame(
            "l",
            &[("a", Format::Integer)],
            vec![vec![int(1)], vec![int(2)], vec![int(3)]],
        );
        let right = frame(
            "r",
            &[("a", Format::Integer)],
            vec![vec![int(2)], vec![int(3)], vec![int(4)]],
        );
        let out_schema = schema(&[("l", Format::Integer), ("r", Format::Integer)]);
        let combine = |l: Option<&Row>, r: Option<&Row>| -> Result<Vec<Vec<Value>>> {
            let get = |row: Option<&Row>| {
                row.map(|r| r.values()[0].clone())
                    .unwrap_or(Value::null(Format::Integer))
            };
            Ok(vec![vec![get(l), get(r)]])
        };

        let out = left
            .join("j", out_schema.clone(), &right, JoinType::Equi, &[(0, 0)], combine)
            .unwrap();
        assert_eq!("j", out.name());
        assert_eq!(vec![Some(2), Some(3)], column_ints(&out, 0));

        let out = left
            .join("j", out_schema.clone(), &right, JoinType::Left, &[(0, 0)], combine)
            .unwrap();
        assert_eq!(vec![Some(2), Some(3), Some(1)], column_ints(&out, 0));
        assert_eq!(vec![Some(2), Some(3), None], column_ints(&out, 1));

        let out = left
            .join("j", out_schema.clone(), &right, JoinType::Right, &[(0, 0)], combine)
            .unwrap();
        assert_eq!(vec![Some(2), Some(3), None], column_ints(&out, 0));

        let out = left
            .join("j", out_schema.clone(), &right, JoinType::Cross, &[], combine)
            .unwrap();
        assert_eq!(9, out.len());

        left.join("j", out_schema, &right, JoinType::Equi, &[(0, 4)], combine)
            .unwrap_err();
    }

    #[test]
    fn set_operations() {
        let df = people();
        let other = frame(
            "other",
            &[("name", Format::String), ("age", Format::Integer)],
            vec![
                vec![text("b"), int(1)],
                vec![text("c"), int(3)],
            ],
        );

        assert_eq!(5, df.append(&other).unwrap().len());
        assert_eq!(4, df.union(&other).unwrap().len());
        assert_eq!(
            vec![Some("b".to_string())],
            column_strings(&df.intersection(&other).unwrap(), 0)
        );
        assert_eq!(2, df.except(&other).unwrap().len());

        let dup = df.append(&df).unwrap();
        assert_eq!(3, dup.distinct().len());
        assert_eq!(2, dup.limit(2).len());

        let mismatched = df.select_series(&[0]).unwrap();
        df.append(&mismatched).unwrap_err();
        df.union(&mismatched).unwrap_err();
        df.except(&mismatched).unwrap_err();
    }

    #[test]
    fn with_name_keeps_rows() {
        let df = people().with_name("renamed");
        assert_eq!("renamed", df.name());
        assert_eq!(3, df.len());
    }
}

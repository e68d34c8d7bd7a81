use std::collections::HashSet;

use frameql_error::{DbError, Result};

use crate::format::Format;
use crate::grouped::GroupedSeries;
use crate::join::{JoinMatch, JoinType, drive_join};
use crate::scalar::ScalarValue;
use crate::sort::SortOrder;
use crate::value::Value;

/// A named, homogeneous, ordered column of values.
///
/// Every value has the series format (nulls included). Operations never
/// modify the series they're called on.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    format: Format,
    values: Vec<Value>,
}

impl Series {
    pub fn empty(name: impl Into<String>, format: Format) -> Self {
        Series {
            name: name.into(),
            format,
            values: Vec::new(),
        }
    }

    /// Create a series from values that must already be of `format`.
    pub fn try_new(name: impl Into<String>, format: Format, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        if let Some(idx) = values.iter().position(|v| v.format() != format) {
            return Err(DbError::new("Value format does not match series format")
                .with_field("series", name)
                .with_field("index", idx)
                .with_field("expected", format)
                .with_field("got", values[idx].format()));
        }

        Ok(Series {
            name,
            format,
            values,
        })
    }

    /// Create a series from values already known to be of `format`.
    pub(crate) fn new_unchecked(name: impl Into<String>, format: Format, values: Vec<Value>) -> Self {
        Series {
            name: name.into(),
            format,
            values,
        }
    }

    /// Create a series from raw payloads, converting each into `format`.
    pub fn try_from_raw<I, T>(name: impl Into<String>, format: Format, raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<T>>,
        T: Into<ScalarValue>,
    {
        let values = raw
            .into_iter()
            .map(|v| Value::try_new(format, v.map(Into::into)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Series {
            name: name.into(),
            format,
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename in place.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    pub const fn format(&self) -> Format {
        self.format
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Build a series with the same name and format from already checked
    /// values.
    fn derive(&self, values: Vec<Value>) -> Series {
        Series {
            name: self.name.clone(),
            format: self.format,
            values,
        }
    }

    /// Transform every element.
    ///
    /// The output of `f` is converted into `format`, which becomes the format
    /// of the returned series.
    pub fn map<F>(&self, format: Format, mut f: F) -> Result<Series>
    where
        F: FnMut(&Value) -> Result<Value>,
    {
        let values = self
            .values
            .iter()
            .map(|v| f(v)?.cast(format))
            .collect::<Result<Vec<_>>>()?;

        Ok(Series {
            name: self.name.clone(),
            format,
            values,
        })
    }

    /// Keep the elements for which `predicate` returns true.
    pub fn filter<F>(&self, mut predicate: F) -> Result<Series>
    where
        F: FnMut(&Value) -> Result<bool>,
    {
        let mut values = Vec::new();
        for v in &self.values {
            if predicate(v)? {
                values.push(v.clone());
            }
        }
        Ok(self.derive(values))
    }

    /// Left fold over the elements starting with `seed`.
    pub fn reduce<F>(&self, seed: Value, mut f: F) -> Result<Value>
    where
        F: FnMut(Value, &Value) -> Result<Value>,
    {
        let mut acc = seed;
        for v in &self.values {
            acc = f(acc, v)?;
        }
        Ok(acc)
    }

    /// Number of non-null elements.
    pub fn count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nil()).count()
    }

    /// Sum of the non-null elements of an integer or double series.
    pub fn sum(&self) -> Result<Value> {
        match self.format {
            Format::Integer => self.reduce(Value::integer(0), |acc, v| {
                match (acc.as_int()?, v.as_int()?) {
                    (Some(a), Some(b)) => a
                        .checked_add(b)
                        .map(Value::integer)
                        .ok_or_else(|| DbError::new("Integer overflow in sum")),
                    _ => Ok(acc),
                }
            }),
            Format::Double => self.reduce(Value::double(0.0), |acc, v| {
                match (acc.as_double()?, v.as_double()?) {
                    (Some(a), Some(b)) => Ok(Value::double(a + b)),
                    _ => Ok(acc),
                }
            }),
            other => Err(DbError::new(format!("Cannot sum a {other} series"))),
        }
    }

    /// Smallest non-null element, or null if there is none.
    pub fn min(&self) -> Result<Value> {
        self.reduce(Value::null(self.format), |acc, v| {
            if !v.is_nil() && (acc.is_nil() || v.compare(&acc).is_lt()) {
                Ok(v.clone())
            } else {
                Ok(acc)
            }
        })
    }

    /// Largest non-null element, or null if there is none.
    pub fn max(&self) -> Result<Value> {
        self.reduce(Value::null(self.format), |acc, v| {
            if !v.is_nil() && (acc.is_nil() || v.compare(&acc).is_gt()) {
                Ok(v.clone())
            } else {
                Ok(acc)
            }
        })
    }

    /// Remove later duplicates, keeping first-seen order.
    pub fn distinct(&self) -> Series {
        let mut seen = HashSet::with_hasher(ahash::RandomState::new());
        let values = self
            .values
            .iter()
            .filter(|v| seen.insert(*v))
            .cloned()
            .collect();
        self.derive(values)
    }

    /// Stable sort of the elements.
    pub fn sort(&self, order: SortOrder) -> Series {
        let mut values = self.values.clone();
        values.sort_by(|a, b| order.apply(a.compare(b)));
        self.derive(values)
    }

    /// The first `n` elements.
    pub fn limit(&self, n: usize) -> Series {
        self.derive(self.values.iter().take(n).cloned().collect())
    }

    pub fn append(&self, other: &Series) -> Result<Series> {
        self.check_same_format(other, "append")?;
        let mut values = self.values.clone();
        values.extend(other.values.iter().cloned());
        Ok(self.derive(values))
    }

    /// Distinct elements from both series.
    pub fn union(&self, other: &Series) -> Result<Series> {
        Ok(self.append(other)?.distinct())
    }

    /// Distinct elements of this series that also appear in `other`.
    pub fn intersection(&self, other: &Series) -> Result<Series> {
        self.check_same_format(other, "intersection")?;
        let other: HashSet<_, ahash::RandomState> = other.values.iter().collect();
        let values = self
            .distinct()
            .values
            .into_iter()
            .filter(|v| other.contains(v))
            .collect();
        Ok(self.derive(values))
    }

    /// Distinct elements of this series that don't appear in `other`.
    pub fn except(&self, other: &Series) -> Result<Series> {
        self.check_same_format(other, "except")?;
        let other: HashSet<_, ahash::RandomState> = other.values.iter().collect();
        let values = self
            .distinct()
            .values
            .into_iter()
            .filter(|v| !other.contains(v))
            .collect();
        Ok(self.derive(values))
    }

    fn check_same_format(&self, other: &Series, operation: &str) -> Result<()> {
        if self.format != other.format {
            return Err(DbError::new(format!("Series format mismatch for {operation}"))
                .with_field("left", self.format)
                .with_field("right", other.format));
        }
        Ok(())
    }

    /// Join with another series.
    ///
    /// `combiner` is called for each pair selected by the join and may
    /// produce any number of values, which are converted into `format`.
    /// Null values never match under `JoinMatch::Equal`.
    pub fn join<F>(
        &self,
        format: Format,
        other: &Series,
        join_type: JoinType,
        join_match: JoinMatch,
        mut combiner: F,
    ) -> Result<Series>
    where
        F: FnMut(Option<&Value>, Option<&Value>) -> Result<Vec<Value>>,
    {
        let matcher = match join_match {
            JoinMatch::Position => None,
            JoinMatch::Equal => Some(|a: &Value, b: &Value| !a.is_nil() && a == b),
        };

        let mut values = Vec::new();
        drive_join(&self.values, &other.values, join_type, matcher, |l, r| {
            for v in combiner(l, r)? {
                values.push(v.cast(format)?);
            }
            Ok(())
        })?;

        Ok(Series {
            name: self.name.clone(),
            format,
            values,
        })
    }

    /// Group elements by value.
    pub fn group(&self) -> GroupedSeries {
        GroupedSeries::from_series(self)
    }
}

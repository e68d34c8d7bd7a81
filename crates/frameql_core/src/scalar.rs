use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use crate::format::{DEFAULT_DATETIME_LAYOUT, Format};

/// The payload of a non-null value.
///
/// There is exactly one variant per [`Format`].
#[derive(Debug, Clone)]
pub enum ScalarValue {
    Integer(i64),
    Double(f64),
    String(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl ScalarValue {
    /// The format this payload naturally belongs to.
    pub const fn format(&self) -> Format {
        match self {
            Self::Integer(_) => Format::Integer,
            Self::Double(_) => Format::Double,
            Self::String(_) => Format::String,
            Self::Bool(_) => Format::Bool,
            Self::DateTime(_) => Format::DateTime,
        }
    }

    /// Canonical string form, formatting datetimes with `layout`.
    pub fn to_string_with_layout(&self, layout: &str) -> String {
        match self {
            Self::DateTime(v) => v.format(layout).to_string(),
            other => other.to_string(),
        }
    }

    /// Compare two payloads.
    ///
    /// Payloads of the same kind use their natural order (false < true,
    /// datetimes by instant). Integer and double payloads compare
    /// numerically. NaN sorts after every other double. Payloads of
    /// unrelated kinds are ordered by kind.
    pub fn compare(&self, other: &ScalarValue) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => compare_f64(*a, *b),
            (Self::Integer(a), Self::Double(b)) => compare_f64(*a as f64, *b),
            (Self::Double(a), Self::Integer(b)) => compare_f64(*a, *b as f64),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }

    const fn kind_rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Integer(_) | Self::Double(_) => 1,
            Self::DateTime(_) => 2,
            Self::String(_) => 3,
        }
    }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Doubles compare with `==`, except that NaN equals NaN. This keeps
/// equality reflexive so values can be used as hash keys.
impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Integer(v) => v.hash(state),
            Self::Double(v) => {
                // -0.0 == 0.0 and NaN == NaN, hash them the same.
                let bits = if *v == 0.0 {
                    0.0_f64.to_bits()
                } else if v.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    v.to_bits()
                };
                bits.hash(state)
            }
            Self::String(v) => v.hash(state),
            Self::Bool(v) => v.hash(state),
            Self::DateTime(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            // Shortest representation that round trips, never in exponent
            // form.
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.format(DEFAULT_DATETIME_LAYOUT)),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Integer(value as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Double(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for ScalarValue {
    fn from(value: DateTime<Utc>) -> Self {
        ScalarValue::DateTime(value)
    }
}

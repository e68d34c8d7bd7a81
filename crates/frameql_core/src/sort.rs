use std::cmp::Ordering;
use std::fmt;

use crate::row::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub const fn is_descending(&self) -> bool {
        matches!(self, SortOrder::Descending)
    }

    /// Apply this order to an ascending comparison result.
    pub const fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "ASC"),
            Self::Descending => write!(f, "DESC"),
        }
    }
}

/// A single key in a multi-key row sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortKey {
    /// Index of the column in the row.
    pub column: usize,
    pub order: SortOrder,
}

impl SortKey {
    pub const fn asc(column: usize) -> Self {
        SortKey {
            column,
            order: SortOrder::Ascending,
        }
    }

    pub const fn desc(column: usize) -> Self {
        SortKey {
            column,
            order: SortOrder::Descending,
        }
    }
}

/// Compare two rows on the given keys.
///
/// Keys are compared left to right, returning on the first key that isn't
/// equal. Missing columns compare as equal; callers validate key indices up
/// front.
pub fn compare_rows(a: &Row, b: &Row, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = match (a.get(key.column), b.get(key.column)) {
            (Some(a), Some(b)) => key.order.apply(a.compare(b)),
            _ => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

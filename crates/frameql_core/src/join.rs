//! Join drivers shared by series and dataframe joins.
//!
//! The drivers only decide which left/right pairs are handed to the
//! combiner. What gets produced for a pair is up to the caller.
use std::fmt;
use std::str::FromStr;

use frameql_error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// Only matched pairs.
    Equi,
    /// Every left/right pair.
    Cross,
    /// Matched pairs plus every unmatched left element paired with nothing.
    Left,
    /// Matched pairs plus every unmatched right element paired with nothing.
    Right,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equi => write!(f, "equi"),
            Self::Cross => write!(f, "cross"),
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

impl FromStr for JoinType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "equi" | "inner" => JoinType::Equi,
            "cross" => JoinType::Cross,
            "left" => JoinType::Left,
            "right" => JoinType::Right,
            other => return Err(DbError::new(format!("Unknown join type '{other}'"))),
        })
    }
}

/// How elements of two series are paired for non-cross joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinMatch {
    /// Pair elements at the same index.
    Position,
    /// Pair elements whose values are equal.
    Equal,
}

/// Drive a join over two slices.
///
/// With no matcher (or a cross join) elements are paired by position or as a
/// cartesian product. With a matcher, a nested loop compares every left
/// element against every right element.
pub(crate) fn drive_join<T, M, E>(
    left: &[T],
    right: &[T],
    join_type: JoinType,
    matcher: Option<M>,
    mut emit: E,
) -> Result<()>
where
    M: Fn(&T, &T) -> bool,
    E: FnMut(Option<&T>, Option<&T>) -> Result<()>,
{
    if join_type == JoinType::Cross {
        for l in left {
            for r in right {
                emit(Some(l), Some(r))?;
            }
        }
        return Ok(());
    }

    match matcher {
        None => drive_positional(left, right, join_type, emit),
        Some(matcher) => drive_nested_loop(left, right, join_type, matcher, emit),
    }
}

fn drive_positional<T, E>(left: &[T], right: &[T], join_type: JoinType, mut emit: E) -> Result<()>
where
    E: FnMut(Option<&T>, Option<&T>) -> Result<()>,
{
    let common = left.len().min(right.len());
    for idx in 0..common {
        emit(Some(&left[idx]), Some(&right[idx]))?;
    }

    match join_type {
        JoinType::Left => {
            for l in &left[common..] {
                emit(Some(l), None)?;
            }
        }
        JoinType::Right => {
            for r in &right[common..] {
                emit(None, Some(r))?;
            }
        }
        _ => (),
    }

    Ok(())
}

fn drive_nested_loop<T, M, E>(
    left: &[T],
    right: &[T],
    join_type: JoinType,
    matcher: M,
    mut emit: E,
) -> Result<()>
where
    M: Fn(&T, &T) -> bool,
    E: FnMut(Option<&T>, Option<&T>) -> Result<()>,
{
    let mut left_matched = vec![false; left.len()];
    let mut right_matched = vec![false; right.len()];

    for (l_idx, l) in left.iter().enumerate() {
        for (r_idx, r) in right.iter().enumerate() {
            if matcher(l, r) {
                emit(Some(l), Some(r))?;
                left_matched[l_idx] = true;
                right_matched[r_idx] = true;
            }
        }
    }

    match join_type {
        JoinType::Left => {
            for (l, _) in left.iter().zip(&left_matched).filter(|(_, m)| !**m) {
                emit(Some(l), None)?;
            }
        }
        JoinType::Right => {
            for (r, _) in right.iter().zip(&right_matched).filter(|(_, m)| !**m) {
                emit(None, Some(r))?;
            }
        }
        _ => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type Pairs = Vec<(Option<i32>, Option<i32>)>;

    fn run(left: &[i32], right: &[i32], join_type: JoinType, equal: bool) -> Pairs {
        let mut out = Vec::new();
        let matcher = equal.then_some(|a: &i32, b: &i32| a == b);
        drive_join(left, right, join_type, matcher, |l, r| {
            out.push((l.copied(), r.copied()));
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn cross_product() {
        let out = run(&[1, 2, 3], &[4, 5], JoinType::Cross, true);
        assert_eq!(6, out.len());
        assert_eq!((Some(1), Some(4)), out[0]);
        assert_eq!((Some(1), Some(5)), out[1]);
        assert_eq!((Some(3), Some(5)), out[5]);
    }

    #[test]
    fn positional() {
        let out = run(&[1, 2, 3], &[4], JoinType::Equi, false);
        assert_eq!(vec![(Some(1), Some(4))], out);

        let out = run(&[1, 2, 3], &[4], JoinType::Left, false);
        assert_eq!(
            vec![(Some(1), Some(4)), (Some(2), None), (Some(3), None)],
            out
        );

        let out = run(&[1], &[4, 5], JoinType::Right, false);
        assert_eq!(vec![(Some(1), Some(4)), (None, Some(5))], out);

        // Kept side shorter than other: only kept rows are emitted.
        let out = run(&[1], &[4, 5, 6], JoinType::Left, false);
        assert_eq!(1, out.len());
    }

    #[test]
    fn unmatched_policy() {
        let out = run(&[1, 2, 3], &[2, 3, 4], JoinType::Equi, true);
        assert_eq!(vec![(Some(2), Some(2)), (Some(3), Some(3))], out);

        let out = run(&[1, 2, 3], &[2, 3, 4], JoinType::Left, true);
        assert_eq!(
            vec![(Some(2), Some(2)), (Some(3), Some(3)), (Some(1), None)],
            out
        );

        let out = run(&[1, 2, 3], &[2, 3, 4], JoinType::Right, true);
        assert_eq!(
            vec![(Some(2), Some(2)), (Some(3), Some(3)), (None, Some(4))],
            out
        );
    }

    #[test]
    fn multiple_matches_not_deduped() {
        let out = run(&[1], &[1, 1], JoinType::Equi, true);
        assert_eq!(2, out.len());
    }

    #[test]
    fn empty_inputs() {
        assert!(run(&[], &[1, 2], JoinType::Cross, true).is_empty());
        assert!(run(&[1, 2], &[], JoinType::Equi, true).is_empty());
        assert_eq!(2, run(&[1, 2], &[], JoinType::Left, true).len());
        assert_eq!(2, run(&[], &[1, 2], JoinType::Right, true).len());
        assert!(run(&[1, 2], &[], JoinType::Right, true).is_empty());
    }

    #[test]
    fn parse_join_type() {
        assert_eq!(JoinType::Equi, "INNER".parse().unwrap());
        assert_eq!(JoinType::Left, "left".parse().unwrap());
        "outer".parse::<JoinType>().unwrap_err();
    }
}

//! Index plans passed from the virtual table planner to its cursors.
//!
//! A plan is carried through SQLite as a string of the form
//! `<constraints>;<order by>`, where constraints are comma separated
//! `column:op` pairs and order by terms are comma separated
//! `column:descending` pairs. The order section and its `;` are omitted when
//! there is nothing to order by.
use std::cmp::Ordering;
use std::fmt;

use rusqlite::vtab::IndexConstraintOp;

use crate::errors::{Result, SqliteError};

/// Constraint operators the virtual table evaluates itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Match,
    Like,
    Glob,
    Regexp,
}

impl ConstraintOp {
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Match => "match",
            Self::Like => "like",
            Self::Glob => "glob",
            Self::Regexp => "regexp",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "eq" => Self::Eq,
            "gt" => Self::Gt,
            "ge" => Self::Ge,
            "lt" => Self::Lt,
            "le" => Self::Le,
            "match" => Self::Match,
            "like" => Self::Like,
            "glob" => Self::Glob,
            "regexp" => Self::Regexp,
            _ => return None,
        })
    }

    pub const fn is_comparison(&self) -> bool {
        matches!(self, Self::Eq | Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }

    /// Whether a comparison with the given outcome satisfies the operator.
    /// An unordered outcome (a NULL operand) never does.
    pub fn holds(&self, ord: Option<Ordering>) -> bool {
        let Some(ord) = ord else {
            return false;
        };
        match self {
            Self::Eq => ord.is_eq(),
            Self::Gt => ord.is_gt(),
            Self::Ge => ord.is_ge(),
            Self::Lt => ord.is_lt(),
            Self::Le => ord.is_le(),
            _ => false,
        }
    }

    /// Map a planner operator, `None` for operators left to SQLite.
    pub fn from_sqlite(op: IndexConstraintOp) -> Option<Self> {
        Some(match op {
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ => Self::Eq,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GT => Self::Gt,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GE => Self::Ge,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LT => Self::Lt,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LE => Self::Le,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_MATCH => Self::Match,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LIKE => Self::Like,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GLOB => Self::Glob,
            IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_REGEXP => Self::Regexp,
            _ => return None,
        })
    }
}

impl fmt::Display for ConstraintOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanConstraint {
    pub column: usize,
    pub op: ConstraintOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanOrder {
    pub column: usize,
    pub descending: bool,
}

/// Constraints and ordering consumed by the virtual table.
///
/// Constraint arguments are handed to the cursor in the order of
/// `constraints`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexPlan {
    pub constraints: Vec<PlanConstraint>,
    pub order_by: Vec<PlanOrder>,
}

impl IndexPlan {
    pub fn is_full_scan(&self) -> bool {
        self.constraints.is_empty() && self.order_by.is_empty()
    }

    pub fn encode(&self) -> String {
        let mut s = self
            .constraints
            .iter()
            .map(|c| format!("{}:{}", c.column, c.op))
            .collect::<Vec<_>>()
            .join(",");

        if !self.order_by.is_empty() {
            s.push(';');
            s.push_str(
                &self
                    .order_by
                    .iter()
                    .map(|o| format!("{}:{}", o.column, o.descending))
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }

        s
    }

    pub fn decode(plan: &str) -> Result<Self> {
        let (constraints, order_by) = match plan.split_once(';') {
            Some((constraints, order_by)) => (constraints, Some(order_by)),
            None => (plan, None),
        };

        let constraints = split_terms(constraints)
            .map(|term| {
                let (column, op) = split_term(plan, term)?;
                let op = ConstraintOp::from_token(op)
                    .ok_or_else(|| invalid(plan, format!("unknown operator '{op}'")))?;
                Ok(PlanConstraint { column, op })
            })
            .collect::<Result<Vec<_>>>()?;

        let order_by = split_terms(order_by.unwrap_or(""))
            .map(|term| {
                let (column, desc) = split_term(plan, term)?;
                let descending = desc
                    .parse::<bool>()
                    .map_err(|_| invalid(plan, format!("invalid direction '{desc}'")))?;
                Ok(PlanOrder { column, descending })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(IndexPlan {
            constraints,
            order_by,
        })
    }
}

fn split_terms(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').filter(|t| !t.is_empty())
}

fn split_term<'a>(plan: &str, term: &'a str) -> Result<(usize, &'a str)> {
    let (column, rest) = term
        .split_once(':')
        .ok_or_else(|| invalid(plan, format!("malformed term '{term}'")))?;
    let column = column
        .parse::<usize>()
        .map_err(|_| invalid(plan, format!("invalid column '{column}'")))?;
    Ok((column, rest))
}

fn invalid(plan: &str, reason: String) -> SqliteError {
    SqliteError::InvalidPlan {
        plan: plan.to_string(),
        reason,
    }
}

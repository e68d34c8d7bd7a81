//! Virtual table exposing registered frames to SQLite without copying.
//!
//! Constraints and orderings SQLite hands to the planner are encoded into an
//! [`IndexPlan`] and evaluated by the cursor against the frame, so the
//! filtered and sorted rows are produced by the frame engine.
use std::collections::HashMap;
use std::os::raw::c_int;
use std::sync::Arc;

use frameql_core::dataframe::DataFrame;
use frameql_core::format::Format;
use frameql_core::row::Row;
use frameql_core::scalar::ScalarValue;
use frameql_core::sort::{SortKey, SortOrder};
use frameql_error::{DbError, Result};
use parking_lot::RwLock;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::vtab::{
    Context,
    CreateVTab,
    IndexInfo,
    VTab,
    VTabConnection,
    VTabCursor,
    VTabKind,
    Values,
    sqlite3_vtab,
    sqlite3_vtab_cursor,
};
use tracing::trace;

use crate::affinity::{Affinity, compare, sql_text};
use crate::config::DEFAULT_SQL_DATETIME_LAYOUT;
use crate::convert::value_to_sql;
use crate::errors::SqliteError;
use crate::functions::{glob_regex, like_regex};
use crate::materialize::create_table_sql;
use crate::plan::{ConstraintOp, IndexPlan, PlanConstraint, PlanOrder};

/// Name of the module virtual tables are created with.
pub const MODULE_NAME: &str = "frame";

/// Frames registered with a pushdown engine, keyed by lowercase name.
#[derive(Debug)]
pub struct FrameCatalog {
    frames: RwLock<HashMap<String, Arc<DataFrame>>>,
    layout: Arc<str>,
}

impl FrameCatalog {
    pub fn new(layout: &str) -> Self {
        FrameCatalog {
            frames: RwLock::new(HashMap::new()),
            layout: layout.into(),
        }
    }

    pub fn insert(&self, frame: Arc<DataFrame>) -> Result<(), SqliteError> {
        let key = frame.name().to_lowercase();
        let mut frames = self.frames.write();
        if frames.contains_key(&key) {
            return Err(SqliteError::DuplicateTable(frame.name().to_string()));
        }
        frames.insert(key, frame);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<DataFrame>> {
        self.frames.write().remove(&name.to_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<Arc<DataFrame>> {
        self.frames.read().get(&name.to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.frames.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.read().is_empty()
    }
}

/// Strip SQL quoting from an identifier passed as a module argument.
fn dequote(s: &str) -> String {
    let s = s.trim();
    let quoted = |open: char, close: char| {
        s.len() >= 2 && s.starts_with(open) && s.ends_with(close)
    };
    if quoted('"', '"') {
        s[1..s.len() - 1].replace("\"\"", "\"")
    } else if quoted('\'', '\'') || quoted('`', '`') || quoted('[', ']') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Whether sorting `column` in the frame engine gives SQLite's order.
///
/// Datetimes sort as text in SQLite, which only agrees with chronological
/// order for the default layout. NaN is NULL to SQLite and sorts first.
fn order_is_exact(frame: &DataFrame, column: usize, layout: &str) -> bool {
    match frame.schema().field(column).map(|f| f.format) {
        Some(Format::DateTime) => layout == DEFAULT_SQL_DATETIME_LAYOUT,
        Some(Format::Double) => !frame.iter().any(|row| {
            matches!(
                row.get(column).and_then(|v| v.raw()),
                Some(ScalarValue::Double(v)) if v.is_nan()
            )
        }),
        Some(_) => true,
        None => false,
    }
}

/// Build the plan for the constraints and ordering offered by SQLite.
///
/// Only usable constraints with a supported operator and the binary
/// collation on a real column are taken. Each taken constraint is returned
/// with its index and whether SQLite may skip re-checking it. Comparisons
/// on text columns are re-checked since the other operand may be a numeric
/// column. Ordering is taken only if every term is on a real column whose
/// order the frame engine reproduces.
pub(crate) fn plan_index(
    info: &IndexInfo,
    frame: &DataFrame,
    layout: &str,
) -> (IndexPlan, Vec<(usize, bool)>) {
    let num_columns = frame.num_columns();
    let real_column = |col: c_int| usize::try_from(col).ok().filter(|c| *c < num_columns);

    let mut plan = IndexPlan::default();
    let mut consumed = Vec::new();

    for (idx, constraint) in info.constraints().enumerate() {
        if !constraint.is_usable() {
            continue;
        }
        let (Some(column), Some(op)) = (
            real_column(constraint.column()),
            ConstraintOp::from_sqlite(constraint.operator()),
        ) else {
            continue;
        };
        let binary = info
            .collation(idx)
            .is_ok_and(|c| c.eq_ignore_ascii_case("BINARY"));
        if !binary {
            continue;
        }

        let text_column = frame.schema().field(column).map(|f| f.format) == Some(Format::String);
        let omit = !(op.is_comparison() && text_column);
        plan.constraints.push(PlanConstraint { column, op });
        consumed.push((idx, omit));
    }

    let order_by = info
        .order_bys()
        .map(|o| {
            real_column(o.column())
                .filter(|column| order_is_exact(frame, *column, layout))
                .map(|column| PlanOrder {
                    column,
                    descending: o.is_order_by_desc(),
                })
        })
        .collect::<Option<Vec<_>>>();
    if let Some(order_by) = order_by {
        plan.order_by = order_by;
    }

    (plan, consumed)
}

#[repr(C)]
pub struct FrameTable {
    /// Base class. Must be first.
    base: sqlite3_vtab,
    frame: Arc<DataFrame>,
    layout: Arc<str>,
}

unsafe impl<'vtab> VTab<'vtab> for FrameTable {
    type Aux = Arc<FrameCatalog>;
    type Cursor = FrameCursor;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let catalog = aux.ok_or_else(|| {
            rusqlite::Error::ModuleError("Frame module registered without a catalog".to_string())
        })?;

        // args[0] is the module name, args[1] the database, args[2] the table.
        let name = args
            .get(2)
            .map(|arg| dequote(&String::from_utf8_lossy(arg)))
            .ok_or_else(|| rusqlite::Error::ModuleError("Missing table name".to_string()))?;
        let frame = catalog
            .get(&name)
            .ok_or(SqliteError::MissingTable(name))?;

        trace!(table = %frame.name(), rows = frame.len(), "connecting virtual table");

        let schema = create_table_sql("x", frame.schema());
        let table = FrameTable {
            base: sqlite3_vtab::default(),
            frame,
            layout: catalog.layout.clone(),
        };

        Ok((schema, table))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let (plan, consumed) = plan_index(info, &self.frame, &self.layout);

        for (argv_idx, (constraint_idx, omit)) in consumed.iter().enumerate() {
            let mut usage = info.constraint_usage(*constraint_idx);
            usage.set_argv_index(argv_idx as c_int + 1);
            usage.set_omit(*omit);
        }
        if !plan.order_by.is_empty() {
            info.set_order_by_consumed(true);
        }

        let rows = self.frame.len().max(1) as f64;
        info.set_estimated_cost(rows / (1.0 + plan.constraints.len() as f64));

        let encoded = plan.encode();
        trace!(table = %self.frame.name(), plan = %encoded, "planned virtual table scan");
        info.set_idx_str(&encoded);

        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<FrameCursor> {
        Ok(FrameCursor {
            base: sqlite3_vtab_cursor::default(),
            source: self.frame.clone(),
            snapshot: self.frame.clone(),
            layout: self.layout.clone(),
            pos: 0,
            patterns: HashMap::new(),
        })
    }
}

impl CreateVTab<'_> for FrameTable {
    const KIND: VTabKind = VTabKind::Default;
}

#[repr(C)]
pub struct FrameCursor {
    /// Base class. Must be first.
    base: sqlite3_vtab_cursor,
    /// Frame as registered.
    source: Arc<DataFrame>,
    /// Rows produced by the last filter call.
    snapshot: Arc<DataFrame>,
    layout: Arc<str>,
    pos: usize,
    /// Compiled LIKE/GLOB/REGEXP patterns.
    patterns: HashMap<(ConstraintOp, String), Regex>,
}

impl FrameCursor {
    fn pattern(&mut self, op: ConstraintOp, pattern: &str) -> Result<Regex> {
        if let Some(re) = self.patterns.get(&(op, pattern.to_string())) {
            return Ok(re.clone());
        }

        let re = match op {
            ConstraintOp::Like => like_regex(pattern),
            ConstraintOp::Glob => glob_regex(pattern),
            _ => Regex::new(pattern),
        }
        .map_err(|e| {
            DbError::with_source("Invalid pattern", Box::new(e))
                .with_field("op", op)
                .with_field("pattern", pattern)
        })?;

        self.patterns
            .insert((op, pattern.to_string()), re.clone());
        Ok(re)
    }

    /// Build the test for one constraint, evaluated the way SQLite would
    /// evaluate it against a native table with the same column types.
    fn predicate(&mut self, constraint: PlanConstraint, arg: &SqlValue) -> Result<Predicate> {
        let format = self
            .source
            .schema()
            .field(constraint.column)
            .map(|f| f.format)
            .ok_or_else(|| {
                DbError::new("Constraint column out of range").with_field("column", constraint.column)
            })?;
        let affinity = Affinity::for_format(format);

        if matches!(arg, SqlValue::Null) {
            return Ok(Predicate::Never);
        }

        let test = match constraint.op {
            op if op.is_comparison() => {
                if affinity.is_numeric() {
                    Test::Compare {
                        op,
                        arg: Affinity::Numeric.apply(arg),
                        numeric: None,
                    }
                } else {
                    // The argument may come from a numeric column, in which
                    // case the cell is converted instead.
                    Test::Compare {
                        op,
                        arg: affinity.apply(arg),
                        numeric: Some(arg.clone()),
                    }
                }
            }
            ConstraintOp::Match => Test::Contains(sql_text(arg).unwrap_or_default()),
            op => Test::Pattern(self.pattern(op, &sql_text(arg).unwrap_or_default())?),
        };

        Ok(Predicate::Test {
            column: constraint.column,
            affinity,
            test,
        })
    }

    /// Produce the rows selected by `plan`.
    fn execute(&mut self, plan: &IndexPlan, args: &[SqlValue]) -> Result<Arc<DataFrame>> {
        if plan.is_full_scan() {
            return Ok(self.source.clone());
        }

        if args.len() != plan.constraints.len() {
            return Err(SqliteError::InvalidPlan {
                plan: plan.encode(),
                reason: format!(
                    "expected {} arguments, got {}",
                    plan.constraints.len(),
                    args.len()
                ),
            }
            .into());
        }

        let predicates = plan
            .constraints
            .iter()
            .zip(args)
            .map(|(c, arg)| self.predicate(*c, arg))
            .collect::<Result<Vec<_>>>()?;

        let mut frame = self.source.clone();
        if !predicates.is_empty() {
            let layout = self.layout.clone();
            let filtered =
                frame.filter_rows(|row| Ok(predicates.iter().all(|p| p.matches(row, &layout))))?;
            frame = Arc::new(filtered);
        }

        if !plan.order_by.is_empty() {
            let keys = plan
                .order_by
                .iter()
                .map(|o| SortKey {
                    column: o.column,
                    order: if o.descending {
                        SortOrder::Descending
                    } else {
                        SortOrder::Ascending
                    },
                })
                .collect::<Vec<_>>();
            frame = Arc::new(frame.sort(&keys)?);
        }

        Ok(frame)
    }
}

unsafe impl VTabCursor for FrameCursor {
    fn filter(
        &mut self,
        _idx_num: c_int,
        idx_str: Option<&str>,
        args: &Values<'_>,
    ) -> rusqlite::Result<()> {
        let plan = IndexPlan::decode(idx_str.unwrap_or(""))?;
        let args = (0..args.len())
            .map(|idx| args.get::<SqlValue>(idx))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let snapshot = self
            .execute(&plan, &args)
            .map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;

        trace!(
            table = %self.source.name(),
            plan = %idx_str.unwrap_or(""),
            rows = snapshot.len(),
            "filtered virtual table"
        );

        self.snapshot = snapshot;
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.snapshot.len()
    }

    fn column(&self, ctx: &mut Context, col: c_int) -> rusqlite::Result<()> {
        let value = usize::try_from(col)
            .ok()
            .and_then(|col| self.snapshot.row(self.pos)?.get(col))
            .ok_or_else(|| {
                rusqlite::Error::ModuleError(format!(
                    "Column {col} out of range for row {}",
                    self.pos
                ))
            })?;
        let affinity = Affinity::for_format(value.format());
        ctx.set_result(&affinity.apply(&value_to_sql(value, &self.layout)))
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.pos as i64)
    }
}

enum Test {
    /// Compare the cell with the argument. If `numeric` is set, the cell
    /// also matches when it compares true against it under numeric affinity.
    Compare {
        op: ConstraintOp,
        arg: SqlValue,
        numeric: Option<SqlValue>,
    },
    Contains(String),
    Pattern(Regex),
}

enum Predicate {
    /// A null argument never matches.
    Never,
    Test {
        column: usize,
        affinity: Affinity,
        test: Test,
    },
}

impl Predicate {
    fn matches(&self, row: &Row, layout: &str) -> bool {
        let (column, affinity, test) = match self {
            Predicate::Never => return false,
            Predicate::Test {
                column,
                affinity,
                test,
            } => (*column, affinity, test),
        };

        let cell = match row.get(column) {
            Some(cell) => affinity.apply(&value_to_sql(cell, layout)),
            None => return false,
        };
        if matches!(cell, SqlValue::Null) {
            return false;
        }

        match test {
            Test::Compare { op, arg, numeric } => {
                op.holds(compare(&cell, arg))
                    || numeric.as_ref().is_some_and(|numeric| {
                        op.holds(compare(&Affinity::Numeric.apply(&cell), numeric))
                    })
            }
            Test::Contains(needle) => sql_text(&cell).is_some_and(|t| t.contains(needle)),
            Test::Pattern(re) => sql_text(&cell).is_some_and(|t| re.is_match(&t)),
        }
    }
}

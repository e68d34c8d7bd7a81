//! SQL over frames, backed by an embedded SQLite.
//!
//! Frames are either copied into native tables (`memory` and `file` storage
//! modes) or exposed through a virtual table that pushes filters and
//! ordering down into the frame engine (`pushdown`).
pub mod affinity;
pub mod config;
pub mod convert;
pub mod engine;
pub mod errors;
pub mod functions;
pub mod materialize;
pub mod plan;
pub mod runtime;
pub mod vtab;

use std::sync::Arc;

use config::QueryConfig;
use frameql_core::dataframe::DataFrame;
use frameql_error::Result;
use runtime::SqliteRuntime;

/// Run `sql` against `frames` with a runtime built from `config`.
///
/// Callers running many queries should build a [`SqliteRuntime`] once and
/// use [`SqliteRuntime::run_query`] instead.
pub fn run_query(sql: &str, frames: &[Arc<DataFrame>], config: &QueryConfig) -> Result<DataFrame> {
    SqliteRuntime::try_new(config.clone())?.run_query(sql, frames)
}

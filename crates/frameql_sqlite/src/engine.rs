//! Query engines binding registered frames to a SQLite connection.
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use frameql_core::dataframe::DataFrame;
use frameql_error::{DbError, Result};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::StorageMode;
use crate::convert::{ResultColumn, frame_from_sql};
use crate::errors::SqliteError;
use crate::materialize::{TableLoad, quote_identifier};
use crate::runtime::SqliteRuntime;
use crate::vtab::{FrameCatalog, FrameTable, MODULE_NAME};

/// A SQLite connection with frames registered as tables.
pub trait QueryEngine: Debug + Send + Sync {
    fn runtime(&self) -> &Arc<SqliteRuntime>;

    /// Make a frame queryable under its own name.
    fn register(&self, frame: Arc<DataFrame>) -> Result<()>;

    /// Register several frames, in parallel when there's more than one.
    ///
    /// Every frame is attempted. The first error is returned and no
    /// registrations are rolled back.
    fn register_all(&self, frames: &[Arc<DataFrame>]) -> Result<()> {
        if frames.len() <= 1 {
            for frame in frames {
                self.register(frame.clone())?;
            }
            return Ok(());
        }
        self.runtime()
            .register_parallel(frames, |frame| self.register(frame))
    }

    /// Run a query and collect its result as a frame.
    fn query(&self, sql: &str) -> Result<DataFrame>;

    /// Release the connection and any backing storage.
    ///
    /// Closing twice is a no-op.
    fn close(&self) -> Result<()>;
}

fn with_connection<T>(
    conn: &Mutex<Option<Connection>>,
    f: impl FnOnce(&mut Connection) -> Result<T>,
) -> Result<T> {
    let mut guard = conn.lock();
    let conn = guard.as_mut().ok_or(SqliteError::Closed)?;
    f(conn)
}

fn open_connection(runtime: &SqliteRuntime, path: Option<&NamedTempFile>) -> Result<Connection> {
    let conn = match path {
        Some(file) => {
            let conn = Connection::open(file.path()).map_err(SqliteError::from)?;
            let _mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "OFF", |row| row.get(0))
                .map_err(SqliteError::from)?;
            conn.pragma_update(None, "synchronous", "OFF")
                .map_err(SqliteError::from)?;
            conn
        }
        None => Connection::open_in_memory().map_err(SqliteError::from)?,
    };

    runtime
        .functions()
        .install(&conn)
        .map_err(SqliteError::from)?;

    Ok(conn)
}

fn run_statement(conn: &Connection, sql: &str, runtime: &SqliteRuntime) -> Result<DataFrame> {
    let config = runtime.config();

    let collect = || -> Result<(Vec<ResultColumn>, Vec<Vec<SqlValue>>), SqliteError> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<_> = stmt
            .columns()
            .into_iter()
            .map(|col| ResultColumn {
                name: col.name().to_string(),
                decl_type: col.decl_type().map(str::to_string),
            })
            .collect();

        let num_columns = columns.len();
        let rows = stmt
            .query_map([], |row| {
                (0..num_columns)
                    .map(|idx| row.get::<_, SqlValue>(idx))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((columns, rows))
    };

    let (columns, rows) = collect().map_err(|e| DbError::from(e).with_field("sql", sql))?;
    debug!(rows = rows.len(), columns = columns.len(), "query returned");

    frame_from_sql(&config.result_name, &columns, rows, &config.datetime_layout)
}

fn close_connection(conn: &Mutex<Option<Connection>>) -> Result<bool> {
    match conn.lock().take() {
        Some(conn) => {
            conn.close().map_err(|(_, e)| SqliteError::from(e))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Engine that copies every frame into a native table.
///
/// Backed by an in-memory database, or a temporary file in `file` mode.
#[derive(Debug)]
pub struct MaterializedEngine {
    runtime: Arc<SqliteRuntime>,
    conn: Mutex<Option<Connection>>,
    /// Lowercased names of registered tables.
    tables: Mutex<HashSet<String>>,
    file: Mutex<Option<NamedTempFile>>,
}

impl MaterializedEngine {
    pub fn try_new(runtime: Arc<SqliteRuntime>) -> Result<Self> {
        let mode = runtime.config().storage_mode;
        let file = match mode {
            StorageMode::File => Some(NamedTempFile::new().map_err(SqliteError::from)?),
            _ => None,
        };
        let conn = open_connection(&runtime, file.as_ref())?;

        info!(
            %mode,
            path = ?file.as_ref().map(|f| f.path().to_path_buf()),
            "opened materialized engine"
        );

        Ok(MaterializedEngine {
            runtime,
            conn: Mutex::new(Some(conn)),
            tables: Mutex::new(HashSet::new()),
            file: Mutex::new(file),
        })
    }

    fn load(&self, load: &TableLoad) -> Result<()> {
        with_connection(&self.conn, |conn| {
            let tx = conn.transaction().map_err(SqliteError::from)?;
            tx.execute(&load.create, []).map_err(SqliteError::from)?;
            for batch in &load.batches {
                let mut stmt = tx.prepare_cached(&batch.sql).map_err(SqliteError::from)?;
                stmt.execute(params_from_iter(batch.params.iter()))
                    .map_err(SqliteError::from)?;
            }
            tx.commit().map_err(SqliteError::from)?;
            Ok(())
        })
    }
}

impl QueryEngine for MaterializedEngine {
    fn runtime(&self) -> &Arc<SqliteRuntime> {
        &self.runtime
    }

    fn register(&self, frame: Arc<DataFrame>) -> Result<()> {
        let key = frame.name().to_lowercase();
        if !self.tables.lock().insert(key.clone()) {
            return Err(SqliteError::DuplicateTable(frame.name().to_string()).into());
        }

        let config = self.runtime.config();
        let result = TableLoad::try_new(&frame, config.insert_batch_size, &config.datetime_layout)
            .and_then(|load| self.load(&load));

        if let Err(e) = result {
            self.tables.lock().remove(&key);
            return Err(e.with_field("table", frame.name()));
        }

        debug!(
            table = %frame.name(),
            rows = frame.len(),
            mode = %config.storage_mode,
            "registered frame"
        );

        Ok(())
    }

    fn query(&self, sql: &str) -> Result<DataFrame> {
        with_connection(&self.conn, |conn| run_statement(conn, sql, &self.runtime))
    }

    fn close(&self) -> Result<()> {
        let closed = close_connection(&self.conn);
        // Deletes the file, if any.
        let file = self.file.lock().take();
        if closed? {
            info!(
                tables = self.tables.lock().len(),
                had_file = file.is_some(),
                "closed materialized engine"
            );
        }
        Ok(())
    }
}

/// Engine that exposes frames through the virtual table module.
///
/// Frames are shared with the connection, not copied. Filters and ordering
/// SQLite can push into the table are evaluated on the frame itself.
#[derive(Debug)]
pub struct PushdownEngine {
    runtime: Arc<SqliteRuntime>,
    conn: Mutex<Option<Connection>>,
    catalog: Arc<FrameCatalog>,
}

impl PushdownEngine {
    pub fn try_new(runtime: Arc<SqliteRuntime>) -> Result<Self> {
        let conn = open_connection(&runtime, None)?;
        let catalog = Arc::new(FrameCatalog::new(&runtime.config().datetime_layout));

        conn.create_module(
            MODULE_NAME,
            rusqlite::vtab::read_only_module::<FrameTable>(),
            Some(catalog.clone()),
        )
        .map_err(SqliteError::from)?;

        info!(mode = %StorageMode::Pushdown, "opened pushdown engine");

        Ok(PushdownEngine {
            runtime,
            conn: Mutex::new(Some(conn)),
            catalog,
        })
    }

    pub fn catalog(&self) -> &Arc<FrameCatalog> {
        &self.catalog
    }
}

impl QueryEngine for PushdownEngine {
    fn runtime(&self) -> &Arc<SqliteRuntime> {
        &self.runtime
    }

    fn register(&self, frame: Arc<DataFrame>) -> Result<()> {
        if frame.num_columns() == 0 {
            return Err(DbError::new("Cannot register a frame with no columns")
                .with_field("table", frame.name()));
        }

        let name = frame.name().to_string();
        let rows = frame.len();
        self.catalog.insert(frame)?;

        let sql = format!(
            "CREATE VIRTUAL TABLE {} USING {MODULE_NAME}",
            quote_identifier(&name)
        );
        let result = with_connection(&self.conn, |conn| {
            conn.execute(&sql, []).map_err(SqliteError::from)?;
            Ok(())
        });
        if let Err(e) = result {
            self.catalog.remove(&name);
            return Err(e.with_field("table", name));
        }

        debug!(table = %name, rows, mode = %StorageMode::Pushdown, "registered frame");

        Ok(())
    }

    fn query(&self, sql: &str) -> Result<DataFrame> {
        with_connection(&self.conn, |conn| run_statement(conn, sql, &self.runtime))
    }

    fn close(&self) -> Result<()> {
        if close_connection(&self.conn)? {
            info!(tables = self.catalog.len(), "closed pushdown engine");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use frameql_core::format::Format;
    use frameql_core::testutil::{column_ints, column_strings, frame, int, text};

    use super::*;
    use crate::config::QueryConfig;

    fn engine(mode: StorageMode) -> Box<dyn QueryEngine> {
        let runtime = SqliteRuntime::try_new(QueryConfig::default().with_storage_mode(mode)).unwrap();
        runtime.open_engine().unwrap()
    }

    fn people() -> Arc<DataFrame> {
        Arc::new(frame(
            "people",
            &[("name", Format::String), ("age", Format::Integer)],
            vec![
                vec![text("ann"), int(31)],
                vec![text("bob"), int(25)],
                vec![text("cat"), None],
            ],
        ))
    }

    const MODES: [StorageMode; 3] = [StorageMode::Memory, StorageMode::File, StorageMode::Pushdown];

    #[test]
    fn register_and_query_each_mode() {
        for mode in MODES {
            let engine = engine(mode);
            engine.register(people()).unwrap();

            let out = engine
                .query("SELECT name FROM people WHERE age > 26")
                .unwrap();
            assert_eq!("result", out.name(), "mode: {mode}");
            assert_eq!(1, out.len(), "mode: {mode}");
            assert_eq!(vec![Some("ann".to_string())], column_strings(&out, 0), "mode: {mode}");

            engine.close().unwrap();
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        for mode in MODES {
            let engine = engine(mode);
            engine.register(people()).unwrap();
            engine.register(people()).unwrap_err();
            // Original table still usable.
            let out = engine.query("SELECT count(*) FROM people").unwrap();
            assert_eq!(vec![Some(3)], column_ints(&out, 0), "mode: {mode}");
        }
    }

    #[test]
    fn closed_engine_errors() {
        for mode in MODES {
            let engine = engine(mode);
            engine.close().unwrap();
            engine.close().unwrap();
            engine.query("SELECT 1").unwrap_err();
            engine.register(people()).unwrap_err();
        }
    }

    #[test]
    fn invalid_sql_reports_statement() {
        let engine = engine(StorageMode::Memory);
        let err = engine.query("SELEC nope").unwrap_err();
        assert_eq!(Some("\"SELEC nope\""), err.field("sql"));
    }

    #[test]
    fn empty_frame_registers() {
        for mode in MODES {
            let engine = engine(mode);
            let empty = Arc::new(frame("e", &[("a", Format::Integer)], Vec::new()));
            engine.register(empty).unwrap();
            let out = engine.query("SELECT a FROM e").unwrap();
            assert!(out.is_empty());
            assert_eq!(Format::Integer, out.schema().field(0).unwrap().format);
        }
    }
}

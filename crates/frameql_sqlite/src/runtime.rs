use std::fmt;
use std::sync::Arc;

use crossbeam::channel;
use frameql_core::dataframe::DataFrame;
use frameql_error::{DbError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::config::{QueryConfig, StorageMode};
use crate::engine::{MaterializedEngine, PushdownEngine, QueryEngine};
use crate::functions::FunctionSet;

/// Shared state for running queries.
///
/// Holds the worker pool used for parallel registration, the config, and
/// the SQL functions installed on every connection. Build once and share
/// with `Arc`.
pub struct SqliteRuntime {
    pool: ThreadPool,
    config: QueryConfig,
    functions: FunctionSet,
}

impl fmt::Debug for SqliteRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteRuntime")
            .field("num_threads", &self.pool.current_num_threads())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteRuntime {
    pub fn try_new(config: QueryConfig) -> Result<Arc<Self>> {
        Self::try_new_with_functions(config, FunctionSet::default())
    }

    pub fn try_new_with_functions(config: QueryConfig, functions: FunctionSet) -> Result<Arc<Self>> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.registration_workers)
            .thread_name(|idx| format!("frameql-register-{idx}"))
            .build()
            .map_err(|e| DbError::with_source("Failed to build thread pool", Box::new(e)))?;

        info!(
            workers = config.registration_workers,
            storage_mode = %config.storage_mode,
            "created sqlite runtime"
        );

        Ok(Arc::new(SqliteRuntime {
            pool,
            config,
            functions,
        }))
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn functions(&self) -> &FunctionSet {
        &self.functions
    }

    /// Open an engine for the configured storage mode.
    pub fn open_engine(self: &Arc<Self>) -> Result<Box<dyn QueryEngine>> {
        Ok(match self.config.storage_mode {
            StorageMode::Memory | StorageMode::File => {
                Box::new(MaterializedEngine::try_new(self.clone())?)
            }
            StorageMode::Pushdown => Box::new(PushdownEngine::try_new(self.clone())?),
        })
    }

    /// Register `frames` with a fresh engine, run `sql`, and close the
    /// engine.
    ///
    /// The engine is closed on every path. The first error wins.
    pub fn run_query(self: &Arc<Self>, sql: &str, frames: &[Arc<DataFrame>]) -> Result<DataFrame> {
        let engine = self.open_engine()?;

        let result = engine
            .register_all(frames)
            .and_then(|_| engine.query(sql));
        let closed = engine.close();

        let frame = result?;
        closed?;
        Ok(frame)
    }

    /// Run `register` for every frame on the worker pool.
    ///
    /// Frames are queued up front and drained by the workers. Every frame is
    /// attempted; the first error encountered is returned.
    pub(crate) fn register_parallel<F>(&self, frames: &[Arc<DataFrame>], register: F) -> Result<()>
    where
        F: Fn(Arc<DataFrame>) -> Result<()> + Sync,
    {
        if frames.is_empty() {
            return Ok(());
        }

        let workers = self.config.registration_workers.min(frames.len());
        debug!(frames = frames.len(), workers, "registering frames in parallel");

        let (work_tx, work_rx) = channel::bounded::<Arc<DataFrame>>(frames.len());
        let (result_tx, result_rx) = channel::unbounded::<Result<()>>();

        for frame in frames {
            work_tx
                .send(frame.clone())
                .map_err(|_| DbError::new("Registration queue closed"))?;
        }
        drop(work_tx);

        let register = &register;
        self.pool.scope(|s| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move |_| {
                    for frame in work_rx.iter() {
                        let table = frame.name().to_string();
                        let result = register(frame).map_err(|e| e.with_field("table", table));
                        // Receiver outlives the scope.
                        let _ = result_tx.send(result);
                    }
                });
            }
        });
        drop(result_tx);

        result_rx
            .iter()
            .find_map(|r| r.err())
            .map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use frameql_core::format::Format;
    use frameql_core::testutil::{frame, int};

    use super::*;

    fn frames(n: usize) -> Vec<Arc<DataFrame>> {
        (0..n)
            .map(|i| {
                Arc::new(frame(
                    &format!("t{i}"),
                    &[("a", Format::Integer)],
                    vec![vec![int(i as i64)]],
                ))
            })
            .collect()
    }

    fn runtime(workers: usize) -> Arc<SqliteRuntime> {
        let config = QueryConfig {
            registration_workers: workers,
            ..Default::default()
        };
        SqliteRuntime::try_new(config).unwrap()
    }

    #[test]
    fn parallel_runs_every_frame() {
        let rt = runtime(3);
        let count = AtomicUsize::new(0);
        rt.register_parallel(&frames(10), |_| {
            count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(10, count.load(Ordering::Relaxed));
    }

    #[test]
    fn parallel_single_worker() {
        let rt = runtime(1);
        let count = AtomicUsize::new(0);
        rt.register_parallel(&frames(4), |_| {
            count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(4, count.load(Ordering::Relaxed));
    }

    #[test]
    fn parallel_returns_error_after_attempting_all() {
        let rt = runtime(2);
        let count = AtomicUsize::new(0);
        let err = rt
            .register_parallel(&frames(5), |frame| {
                count.fetch_add(1, Ordering::Relaxed);
                if frame.name() == "t3" {
                    return Err(DbError::new("boom"));
                }
                Ok(())
            })
            .unwrap_err();

        assert_eq!("boom", err.message());
        assert_eq!(Some("\"t3\""), err.field("table"));
        assert_eq!(5, count.load(Ordering::Relaxed));
    }

    #[test]
    fn invalid_config_rejected() {
        let config = QueryConfig {
            registration_workers: 0,
            ..Default::default()
        };
        SqliteRuntime::try_new(config).unwrap_err();
    }
}

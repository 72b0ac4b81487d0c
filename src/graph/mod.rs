//! Typed access layer over the property graph.
//!
//! Nodes live in one table per label, relationships in a single
//! `relationships` table. All calls go through [`GraphStore`], which owns the
//! pooled SQLite handle, bounds every call with a timeout and retries
//! infrastructure failures at most once.

pub mod migrations;
pub mod record;
pub mod relationship;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use crate::config::DatabaseConfig;

pub use record::{query_all, query_opt, FromRecord};
pub use relationship::{Label, Rel};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Query failed: {0}")]
    Query(rusqlite::Error),

    #[error("Store task aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    /// Whether a fresh attempt could succeed without duplicating side effects.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unreachable(_) | StoreError::Timeout(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::InvalidColumnIndex(_)
            | rusqlite::Error::InvalidColumnName(_)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => StoreError::Malformed(err.to_string()),
            rusqlite::Error::SqliteFailure(code, _) => match code.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::SystemIoFailure => StoreError::Unreachable(err.to_string()),
                ErrorCode::ConstraintViolation
                    if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    StoreError::Duplicate(err.to_string())
                }
                _ => StoreError::Query(err),
            },
            _ => StoreError::Query(err),
        }
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Unreachable(err.to_string())
    }
}

/// Outcome of one write attempt, split on whether the transaction had begun.
enum WriteFailure<E> {
    NotStarted(StoreError),
    Failed(E),
}

struct Inner {
    pool: DbPool,
    timeout: Duration,
    closed: AtomicBool,
}

impl Inner {
    fn checkout(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unreachable("store handle is closed".into()));
        }
        Ok(self.pool.get()?)
    }
}

/// Shared handle to the graph. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<Inner>,
}

impl GraphStore {
    /// Open (or create) the store at `path` and bring the schema up to date.
    pub fn open(path: &Path, config: &DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }

        let budget = config.checkout_budget();
        if budget.as_millis() < u128::from(config.busy_timeout_ms) {
            tracing::warn!(
                "busy_timeout_ms {} leaves no room for a retry within {}ms; using {}ms",
                config.busy_timeout_ms,
                config.query_timeout_ms,
                budget.as_millis()
            );
        }
        let busy_timeout_ms = budget.as_millis();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = {busy_timeout_ms};"
            ))
        });
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(budget)
            .build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            migrations::run(&conn)?;
        }

        tracing::info!("Graph store opened at {}", path.display());
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                timeout: config.query_timeout(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Close the handle. Every later call fails with `Unreachable`; pooled
    /// connections are released once the last clone is dropped.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Graph store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Run a read-only unit of work. Retried once on infrastructure failure.
    pub async fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: Fn(&Connection) -> Result<T, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        match self.read_once(f.clone()).await {
            Err(ReadFailure::Store(err)) if err.is_retryable() => {
                tracing::warn!("Retrying read after store error: {}", err);
                self.read_once(f).await.map_err(ReadFailure::into_inner)
            }
            other => other.map_err(ReadFailure::into_inner),
        }
    }

    /// Run a unit of work inside one immediate transaction. The whole unit
    /// commits or none of it does. Retried once only when the failure happened
    /// before the transaction began; a timeout is never retried.
    pub async fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: Fn(&Transaction<'_>) -> Result<T, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        match self.write_once(f.clone()).await {
            Err(WriteFailure::NotStarted(err)) if err.is_retryable() => {
                tracing::warn!("Retrying write that never started: {}", err);
                self.write_once(f).await.map_err(|failure| match failure {
                    WriteFailure::NotStarted(err) => E::from(err),
                    WriteFailure::Failed(err) => err,
                })
            }
            Err(WriteFailure::NotStarted(err)) => Err(E::from(err)),
            Err(WriteFailure::Failed(err)) => Err(err),
            Ok(value) => Ok(value),
        }
    }

    async fn read_once<T, E, F>(&self, f: Arc<F>) -> Result<T, ReadFailure<E>>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: Fn(&Connection) -> Result<T, E> + Send + Sync + 'static,
    {
        let inner = self.inner.clone();
        let outcome = self
            .bounded(move || -> Result<T, ReadFailure<E>> {
                let conn = inner.checkout().map_err(ReadFailure::Store)?;
                f(&conn).map_err(ReadFailure::Domain)
            })
            .await
            .map_err(ReadFailure::Store)?;
        outcome
    }

    async fn write_once<T, E, F>(&self, f: Arc<F>) -> Result<T, WriteFailure<E>>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: Fn(&Transaction<'_>) -> Result<T, E> + Send + Sync + 'static,
    {
        let inner = self.inner.clone();
        let outcome = self
            .bounded(move || -> Result<T, WriteFailure<E>> {
                let mut conn = inner.checkout().map_err(WriteFailure::NotStarted)?;
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(|e| WriteFailure::NotStarted(e.into()))?;
                let value = f(&tx).map_err(WriteFailure::Failed)?;
                tx.commit()
                    .map_err(|e| WriteFailure::Failed(E::from(StoreError::from(e))))?;
                Ok(value)
            })
            .await
            .map_err(|err| WriteFailure::Failed(E::from(err)))?;
        outcome
    }

    /// Run blocking work on the blocking pool, bounded by the store timeout.
    async fn bounded<R, J>(&self, job: J) -> Result<R, StoreError>
    where
        R: Send + 'static,
        J: FnOnce() -> R + Send + 'static,
    {
        let timeout = self.inner.timeout;
        match tokio::time::timeout(timeout, tokio::task::spawn_blocking(job)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(join_err)) => Err(StoreError::Aborted(join_err.to_string())),
            Err(_) => Err(StoreError::Timeout(timeout)),
        }
    }
}

enum ReadFailure<E> {
    Store(StoreError),
    Domain(E),
}

impl<E: From<StoreError>> ReadFailure<E> {
    fn into_inner(self) -> E {
        match self {
            ReadFailure::Store(err) => E::from(err),
            ReadFailure::Domain(err) => err,
        }
    }
}

//! SQL Adapter
//!
//! [`SqlStore`] keeps every entry as a row of one shared table, isolated by
//! a `namespace` column, and sweeps expired rows with the GC scheduler.
//!
//! ```text
//!   ┌──────────┬───────────┬──────────────┬─────────────────┐
//!   │ key      │ namespace │ value        │ expiry          │
//!   │ VARCHAR  │ VARCHAR   │ BLOB / BYTEA │ BIGINT (unix ms)│
//!   ├──────────┴───────────┴──────────────┴─────────────────┤
//!   │ PRIMARY KEY (key, namespace), INDEX (expiry)          │
//!   └───────────────────────────────────────────────────────┘
//!
//!   get     SELECT value, expiry ... WHERE key = ? AND namespace = ?
//!   set     upsert (ON CONFLICT / ON DUPLICATE KEY)
//!   delete  DELETE ... WHERE namespace = ? AND key IN (?, ?, ...)
//!   reset   DELETE ... WHERE namespace = ?
//!   gc      DELETE ... WHERE namespace = ? AND expiry <= ? AND expiry != 0
//! ```
//!
//! The engine behind the store is anything implementing [`SqlEngine`]:
//! SQLite through `rusqlite`, PostgreSQL and MySQL through `diesel-async`
//! connection pools.

pub mod dialect;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "postgres", feature = "mysql"))]
mod diesel_support;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use dialect::Dialect;

#[cfg(feature = "mysql")]
pub use mysql::{MysqlConfig, MysqlEngine};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresEngine};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteEngine};

use crate::error::Result;
use crate::storage::expiry::unix_millis_now;
use crate::storage::{
    codec, validate_key, validate_keys, Expiry, GcScheduler, Lookup, Namespace, Storage, Sweep,
    Value, DEFAULT_GC_INTERVAL,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keys bound per `DELETE ... IN (...)` statement, below every engine's
/// bind parameter limit.
const DELETE_BATCH: usize = 999;

/// A bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Blob(Vec<u8>),
    BigInt(i64),
}

/// The `value` and `expiry` columns of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub value: Vec<u8>,
    pub expiry: i64,
}

/// A relational engine the store can run statements on.
///
/// Statements use the placeholders of [`SqlEngine::dialect`].
#[async_trait]
pub trait SqlEngine: Send + Sync + 'static {
    fn dialect(&self) -> Dialect;

    /// Verifies the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: Vec<SqlParam>) -> Result<u64>;

    /// Fetches the `(value, expiry)` row a query selects, if any.
    async fn fetch_row(&self, sql: &str, params: Vec<SqlParam>) -> Result<Option<StoredRow>>;

    /// Fetches a single integer column named `n`.
    async fn fetch_i64(&self, sql: &str, params: Vec<SqlParam>) -> Result<i64>;

    /// Fetches a single text column named `t`, if a row matches.
    async fn fetch_text(&self, sql: &str, params: Vec<SqlParam>) -> Result<Option<String>>;

    /// Releases the engine's connections.
    async fn close(&self) -> Result<()>;
}

/// Store level settings shared by every engine.
#[derive(Debug, Clone)]
pub struct SqlConfig {
    /// Table name (default: kvport_storage)
    pub table: String,

    /// Value of the namespace column for this store (default: empty)
    pub namespace: String,

    /// Clear this namespace's rows when the store is opened
    pub reset: bool,

    /// Time between expired-row sweeps (default: 10s)
    pub gc_interval: Duration,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            table: "kvport_storage".to_string(),
            namespace: String::new(),
            reset: false,
            gc_interval: DEFAULT_GC_INTERVAL,
        }
    }
}

/// Statements prepared once per store.
#[derive(Debug)]
struct Statements {
    table: String,
    select: String,
    upsert: String,
    reset: String,
    gc: String,
    count: String,
}

impl Statements {
    fn new(dialect: Dialect, table: &str) -> Self {
        let t = dialect.quote(table);
        let key = dialect.quote("key");
        let ns = dialect.quote("namespace");
        let value = dialect.quote("value");
        let expiry = dialect.quote("expiry");
        let p = |n| dialect.placeholder(n);

        Self {
            table: t.clone(),
            select: format!(
                "SELECT {value}, {expiry} FROM {t} WHERE {key} = {} AND {ns} = {}",
                p(1),
                p(2)
            ),
            upsert: dialect.upsert(table),
            reset: format!("DELETE FROM {t} WHERE {ns} = {}", p(1)),
            gc: format!(
                "DELETE FROM {t} WHERE {ns} = {} AND {expiry} <= {} AND {expiry} != 0",
                p(1),
                p(2)
            ),
            count: format!("SELECT COUNT(*) AS n FROM {t} WHERE {ns} = {}", p(1)),
        }
    }

    /// `DELETE` for `keys` keys in one namespace. Callers keep `keys` at
    /// or below [`DELETE_BATCH`].
    fn delete(&self, dialect: Dialect, keys: usize) -> String {
        let placeholders: Vec<String> = (2..keys + 2).map(|n| dialect.placeholder(n)).collect();
        format!(
            "DELETE FROM {} WHERE {} = {} AND {} IN ({})",
            self.table,
            dialect.quote("namespace"),
            dialect.placeholder(1),
            dialect.quote("key"),
            placeholders.join(", ")
        )
    }
}

/// State shared between the store and its GC task.
#[derive(Debug)]
struct Shared<E> {
    engine: E,
    namespace: Namespace,
    statements: Statements,
}

impl<E: SqlEngine> Shared<E> {
    fn namespace_param(&self) -> SqlParam {
        SqlParam::Text(self.namespace.column().to_string())
    }
}

#[async_trait]
impl<E: SqlEngine> Sweep for Shared<E> {
    async fn sweep(&self, now: i64) -> Result<u64> {
        self.engine
            .execute(
                &self.statements.gc,
                vec![self.namespace_param(), SqlParam::BigInt(now)],
            )
            .await
    }
}

/// A [`Storage`] adapter over a relational table.
#[derive(Debug)]
pub struct SqlStore<E: SqlEngine> {
    shared: Arc<Shared<E>>,
    gc: GcScheduler,
}

impl<E: SqlEngine> SqlStore<E> {
    /// Opens a store: pings the engine, creates the table and index if
    /// missing, checks the `value` column type, clears the namespace when
    /// `reset` is set and starts the GC task.
    pub async fn with_engine(engine: E, config: SqlConfig) -> Result<Self> {
        let dialect = engine.dialect();
        engine.ping().await?;

        for statement in dialect.create_statements(&config.table) {
            engine.execute(&statement, Vec::new()).await?;
        }

        let column_type = engine
            .fetch_text(
                &dialect.column_type_query(),
                vec![SqlParam::Text(config.table.clone())],
            )
            .await?;
        match column_type {
            Some(reported) if !dialect.is_binary_type(&reported) => warn!(
                table = %config.table,
                found = %reported,
                expected = dialect.binary_type(),
                "The value column is not binary; migrate the table before storing values"
            ),
            _ => {}
        }

        let shared = Arc::new(Shared {
            statements: Statements::new(dialect, &config.table),
            namespace: Namespace::new(&config.namespace),
            engine,
        });

        if config.reset {
            shared
                .engine
                .execute(&shared.statements.reset, vec![shared.namespace_param()])
                .await?;
        }

        info!(
            engine = dialect.name(),
            table = %config.table,
            namespace = %shared.namespace,
            "SQL store opened"
        );

        Ok(Self {
            gc: GcScheduler::start(Arc::clone(&shared), config.gc_interval),
            shared,
        })
    }

    /// Returns the engine.
    pub fn conn(&self) -> &E {
        &self.shared.engine
    }

    /// Number of rows in this namespace, including expired rows the GC has
    /// not removed yet.
    pub async fn row_count(&self) -> Result<u64> {
        let n = self
            .shared
            .engine
            .fetch_i64(&self.shared.statements.count, vec![self.shared.namespace_param()])
            .await?;
        Ok(n.max(0) as u64)
    }

    /// The GC scheduler.
    pub fn gc(&self) -> &GcScheduler {
        &self.gc
    }
}

#[async_trait]
impl<E: SqlEngine> Storage for SqlStore<E> {
    async fn get(&self, key: &str) -> Result<Lookup> {
        validate_key(key)?;
        let row = self
            .shared
            .engine
            .fetch_row(
                &self.shared.statements.select,
                vec![SqlParam::Text(key.to_string()), self.shared.namespace_param()],
            )
            .await?;

        match row {
            Some(row) if !Expiry::from_millis(row.expiry).is_expired_at(unix_millis_now()) => {
                Ok(Lookup::hit(codec::decode(&row.value)?))
            }
            _ => Ok(Lookup::miss()),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        validate_key(key)?;
        let params = vec![
            SqlParam::Text(key.to_string()),
            self.shared.namespace_param(),
            SqlParam::Blob(codec::encode(&value)?),
            SqlParam::BigInt(Expiry::after(ttl).as_millis()),
        ];

        self.shared
            .engine
            .execute(&self.shared.statements.upsert, params)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<()> {
        validate_keys(keys)?;
        let dialect = self.shared.engine.dialect();

        for batch in keys.chunks(DELETE_BATCH) {
            let sql = self.shared.statements.delete(dialect, batch.len());
            let params = std::iter::once(self.shared.namespace_param())
                .chain(batch.iter().map(|key| SqlParam::Text(key.to_string())))
                .collect();
            self.shared.engine.execute(&sql, params).await?;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let removed = self
            .shared
            .engine
            .execute(&self.shared.statements.reset, vec![self.shared.namespace_param()])
            .await?;
        debug!(namespace = %self.shared.namespace, removed, "SQL namespace reset");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.gc.stop().await;
        self.shared.engine.close().await?;
        info!("SQL store closed");
        Ok(())
    }
}

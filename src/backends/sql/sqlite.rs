//! SQLite engine.
//!
//! One `rusqlite` connection behind a mutex; every statement runs on the
//! blocking thread pool.

use super::{Dialect, SqlEngine, SqlParam, StoredRow};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use rusqlite::types::Value as SqliteValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "sqlite";

/// Connection settings for [`SqliteEngine`].
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file, or `:memory:` (default: ./kvport.sqlite3)
    pub path: PathBuf,

    /// How long a statement waits on a locked database (default: 5s)
    pub busy_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kvport.sqlite3"),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteConfig {
    /// A private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            ..Default::default()
        }
    }
}

/// A SQLite database. Clones share the same connection.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteEngine {
    /// Opens (or creates) the database.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let conn = Connection::open(&config.path).map_err(|e| StorageError::backend(BACKEND, e))?;
        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| StorageError::backend(BACKEND, e))?;

        debug!(path = %config.path.display(), "SQLite database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Runs `f` on the connection from the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap();
            let conn = guard.as_ref().ok_or(StorageError::Closed)?;
            f(conn).map_err(|e| StorageError::backend(BACKEND, e))
        })
        .await
        .map_err(|e| StorageError::backend(BACKEND, e))?
    }
}

fn to_sqlite(params: Vec<SqlParam>) -> Vec<SqliteValue> {
    params
        .into_iter()
        .map(|param| match param {
            SqlParam::Text(s) => SqliteValue::Text(s),
            SqlParam::Blob(b) => SqliteValue::Blob(b),
            SqlParam::BigInt(n) => SqliteValue::Integer(n),
        })
        .collect()
}

#[async_trait]
impl SqlEngine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
    }

    async fn execute(&self, sql: &str, params: Vec<SqlParam>) -> Result<u64> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(to_sqlite(params)))
                .map(|n| n as u64)
        })
        .await
    }

    async fn fetch_row(&self, sql: &str, params: Vec<SqlParam>) -> Result<Option<StoredRow>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.query_row(params_from_iter(to_sqlite(params)), |row| {
                Ok(StoredRow {
                    value: row.get(0)?,
                    expiry: row.get(1)?,
                })
            })
            .optional()
        })
        .await
    }

    async fn fetch_i64(&self, sql: &str, params: Vec<SqlParam>) -> Result<i64> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.query_row(params_from_iter(to_sqlite(params)), |row| row.get(0))
        })
        .await
    }

    async fn fetch_text(&self, sql: &str, params: Vec<SqlParam>) -> Result<Option<String>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.query_row(params_from_iter(to_sqlite(params)), |row| row.get(0))
                .optional()
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let taken = self.conn.lock().unwrap().take();
        if let Some(conn) = taken {
            tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| e))
                .await
                .map_err(|e| StorageError::backend(BACKEND, e))?
                .map_err(|e| StorageError::backend(BACKEND, e))?;
        }
        Ok(())
    }
}

//! Redis Adapter
//!
//! [`RedisStore`] stores codec-encoded values under prefixed keys and
//! leaves expiry to the server (`SET key value PX ttl`).
//!
//! ```text
//!   set("42", v, 2s)   ──►  SET sessions:42 <codec bytes> PX 2000
//!   get("42")          ──►  GET sessions:42      ($-1 => miss)
//!   delete(["a","b"])  ──►  DEL sessions:a sessions:b
//!   reset()            ──►  SCAN 0 MATCH sessions:* COUNT 100 ... + DEL
//!                           (FLUSHDB for the global namespace)
//! ```

pub mod client;
pub mod config;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{RedisDialer, RespConnection};
pub use config::{Endpoint, RedisConfig};

use crate::connection::ConnectionPool;
use crate::error::{Result, StorageError};
use crate::protocol::RespValue;
use crate::storage::expiry::ceil_millis;
use crate::storage::{codec, validate_key, validate_keys, Lookup, Namespace, Storage, Value};
use async_trait::async_trait;
use bytes::Bytes;
use client::unexpected;
use std::time::Duration;
use tracing::{debug, info};

/// Keys requested per SCAN round trip during a namespaced reset.
const SCAN_COUNT: usize = 100;

/// Largest `PX` sent. Redis rejects values whose deadline overflows an i64.
const MAX_PX: u64 = i64::MAX as u64 / 2;

/// A [`Storage`] adapter over a Redis server.
#[derive(Debug)]
pub struct RedisStore {
    pool: ConnectionPool<RedisDialer>,
    namespace: Namespace,
}

impl RedisStore {
    /// Connects, verifies the server with `PING`, and clears the namespace
    /// when `reset` is set.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let dialer = RedisDialer::new(endpoint, config.timeout);
        let pool_size = config.pool_size.max(1);

        let store = Self {
            pool: ConnectionPool::new(dialer, pool_size, Some(pool_size)),
            namespace: Namespace::new(&config.namespace),
        };

        store.call(RespValue::command(["PING"])).await?;
        if config.reset {
            store.reset().await?;
        }

        info!(
            addr = %store.pool.dialer().endpoint().addr,
            namespace = %store.namespace,
            "Redis store opened"
        );
        Ok(store)
    }

    /// Returns the connection pool.
    pub fn conn(&self) -> &ConnectionPool<RedisDialer> {
        &self.pool
    }

    /// Runs one command on a pooled connection.
    ///
    /// Connections that failed at the transport level are discarded.
    async fn call(&self, command: RespValue) -> Result<RespValue> {
        let mut conn = self.pool.acquire().await?;
        match conn.call(command).await {
            Ok(reply) => Ok(reply),
            Err(e @ StorageError::Backend { .. }) => Err(e),
            Err(e) => {
                conn.discard();
                Err(e)
            }
        }
    }

    /// Collects every key in this namespace with SCAN.
    async fn scan_namespace(&self) -> Result<Vec<Bytes>> {
        let pattern = self.namespace.pattern();
        let mut cursor = "0".to_string();
        let mut keys = Vec::new();

        loop {
            let reply = self
                .call(RespValue::command([
                    "SCAN".to_string(),
                    cursor,
                    "MATCH".to_string(),
                    pattern.clone(),
                    "COUNT".to_string(),
                    SCAN_COUNT.to_string(),
                ]))
                .await?;

            let (next, page) = match reply.into_array().as_deref() {
                Some([next, RespValue::Array(page)]) => (
                    next.as_str().map(str::to_string).ok_or_else(|| unexpected(next))?,
                    page.clone(),
                ),
                _ => return Err(StorageError::Protocol("malformed SCAN reply".to_string())),
            };

            keys.extend(page.into_iter().filter_map(RespValue::into_bytes));
            if next == "0" {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl Storage for RedisStore {
    async fn get(&self, key: &str) -> Result<Lookup> {
        validate_key(key)?;
        let reply = self
            .call(RespValue::command(["GET".to_string(), self.namespace.prefixed(key)]))
            .await?;

        match reply {
            RespValue::Null => Ok(Lookup::miss()),
            RespValue::BulkString(data) => Ok(Lookup::hit(codec::decode(&data)?)),
            other => Err(unexpected(&other)),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        validate_key(key)?;
        let mut args = vec![
            Bytes::from_static(b"SET"),
            Bytes::from(self.namespace.prefixed(key)),
            Bytes::from(codec::encode(&value)?),
        ];
        if !ttl.is_zero() {
            args.push(Bytes::from_static(b"PX"));
            args.push(Bytes::from(ceil_millis(ttl).min(MAX_PX).to_string()));
        }

        self.call(RespValue::command(args)).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<()> {
        validate_keys(keys)?;
        let command = std::iter::once("DEL".to_string())
            .chain(keys.iter().map(|key| self.namespace.prefixed(key)));

        self.call(RespValue::command(command)).await?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        if self.namespace.is_global() {
            self.call(RespValue::command(["FLUSHDB"])).await?;
            return Ok(());
        }

        let keys = self.scan_namespace().await?;
        for batch in keys.chunks(SCAN_COUNT) {
            let command = std::iter::once(Bytes::from_static(b"DEL")).chain(batch.iter().cloned());
            self.call(RespValue::command(command)).await?;
        }
        debug!(namespace = %self.namespace, removed = keys.len(), "Redis namespace reset");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        info!("Redis store closed");
        Ok(())
    }
}

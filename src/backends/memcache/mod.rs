//! Memcached Adapter
//!
//! [`MemcacheStore`] speaks the memcached text protocol. Values are
//! wrapped in a small envelope that carries the millisecond deadline, so
//! sub-second TTLs are honored even though memcached itself only counts
//! whole seconds.
//!
//! ```text
//!   ┌────────────────────┬──────────────────────────┐
//!   │ deadline (i64 BE)  │ codec bytes              │
//!   │ unix ms, 0 = never │                          │
//!   └────────────────────┴──────────────────────────┘
//!
//!   set("42", v, 1500ms)  ──►  set sessions:42 0 2 <len>   (exptime rounded up)
//!   get("42")             ──►  get sessions:42  + deadline check
//!   reset()               ──►  lru_crawler metadump all + delete per key
//!                              (flush_all for the global namespace)
//! ```

pub mod client;
pub mod config;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{check_key, Item, MemcacheConnection, MemcacheDialer, MAX_KEY_LENGTH};
pub use config::MemcacheConfig;

use crate::connection::{ConnectionPool, Pooled};
use crate::error::{Result, StorageError};
use crate::storage::expiry::unix_millis_now;
use crate::storage::{
    codec, validate_key, validate_keys, Expiry, Lookup, Namespace, ScratchPool, Storage, Value,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Envelope header length.
const DEADLINE_LEN: usize = 8;

/// Relative expiration times above 30 days must be sent as unix timestamps.
const RELATIVE_LIMIT: u64 = 60 * 60 * 24 * 30;

/// A [`Storage`] adapter over one memcached server.
#[derive(Debug)]
pub struct MemcacheStore {
    pool: ConnectionPool<MemcacheDialer>,
    namespace: Namespace,
    items: ScratchPool<Item>,
}

impl MemcacheStore {
    /// Connects, verifies the server with `version`, and clears the
    /// namespace when `reset` is set.
    pub async fn new(config: MemcacheConfig) -> Result<Self> {
        let server = config.server()?;
        let dialer = MemcacheDialer::new(server, config.timeout);

        let store = Self {
            pool: ConnectionPool::new(dialer, config.max_idle_conns, None),
            namespace: Namespace::new(&config.namespace),
            items: ScratchPool::new(config.item_pool),
        };

        let version = store.pool.acquire().await?.version().await?;
        if config.reset {
            store.reset().await?;
        }

        info!(
            server = %store.pool.dialer().addr(),
            version = %version,
            namespace = %store.namespace,
            "Memcached store opened"
        );
        Ok(store)
    }

    /// Returns the connection pool.
    pub fn conn(&self) -> &ConnectionPool<MemcacheDialer> {
        &self.pool
    }

    /// Prefixes and checks a caller key.
    fn physical(&self, key: &str) -> Result<String> {
        let key = self.namespace.prefixed(key);
        check_key(&key)?;
        Ok(key)
    }

    /// Keeps the connection unless the failure left it in an unknown state.
    fn keep_or_discard<T>(
        conn: Pooled<'_, MemcacheDialer>,
        result: Result<T>,
    ) -> Result<T> {
        if let Err(e) = &result {
            if !matches!(e, StorageError::Backend { .. }) {
                conn.discard();
            }
        }
        result
    }
}

/// Memcached exptime for `ttl`: whole seconds rounded up, or an absolute
/// unix time past the 30 day limit.
fn exptime(ttl: Duration, now_millis: i64) -> u32 {
    if ttl.is_zero() {
        return 0;
    }
    let mut secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    if secs > RELATIVE_LIMIT {
        secs = secs.saturating_add((now_millis / 1000).max(0) as u64);
    }
    u32::try_from(secs).unwrap_or(u32::MAX)
}

fn seal(value: &Value, expiry: Expiry, out: &mut Vec<u8>) -> Result<()> {
    out.extend_from_slice(&expiry.as_millis().to_be_bytes());
    out.extend_from_slice(&codec::encode(value)?);
    Ok(())
}

fn open(data: &[u8], now: i64) -> Result<Option<Value>> {
    let Some((header, body)) = data.split_first_chunk::<DEADLINE_LEN>() else {
        return Err(StorageError::Protocol(format!(
            "memcached value too short for envelope: {} bytes",
            data.len()
        )));
    };
    if Expiry::from_millis(i64::from_be_bytes(*header)).is_expired_at(now) {
        return Ok(None);
    }
    codec::decode(body).map(Some)
}

#[async_trait]
impl Storage for MemcacheStore {
    async fn get(&self, key: &str) -> Result<Lookup> {
        validate_key(key)?;
        let key = self.physical(key)?;

        let mut conn = self.pool.acquire().await?;
        let result = conn.get(&key).await;
        let Some(data) = Self::keep_or_discard(conn, result)? else {
            return Ok(Lookup::miss());
        };
        Ok(open(&data, unix_millis_now())?.into())
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        validate_key(key)?;
        let now = unix_millis_now();

        let mut item = self.items.acquire();
        item.key = self.physical(key)?;
        item.expiration = exptime(ttl, now);
        seal(&value, Expiry::after_from(ttl, now), &mut item.value)?;

        let mut conn = self.pool.acquire().await?;
        let result = conn.set(&item).await;
        Self::keep_or_discard(conn, result)
    }

    async fn delete(&self, keys: &[&str]) -> Result<()> {
        validate_keys(keys)?;
        let physical = keys
            .iter()
            .map(|key| self.physical(key))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.pool.acquire().await?;
        let mut result = Ok(());
        for key in &physical {
            // A missing key is not an error
            if let Err(e) = conn.delete(key).await {
                result = Err(e);
                break;
            }
        }
        Self::keep_or_discard(conn, result)
    }

    async fn reset(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        if self.namespace.is_global() {
            let result = conn.flush_all().await;
            return Self::keep_or_discard(conn, result);
        }

        let dumped = conn.metadump_keys().await;
        let keys = Self::keep_or_discard(conn, dumped)?;
        let owned: Vec<&str> = keys
            .iter()
            .filter(|key| self.namespace.strip(key).is_some())
            .map(String::as_str)
            .collect();

        let mut conn = self.pool.acquire().await?;
        let mut result = Ok(());
        for key in &owned {
            if let Err(e) = conn.delete(key).await {
                result = Err(e);
                break;
            }
        }
        Self::keep_or_discard(conn, result)?;

        debug!(namespace = %self.namespace, removed = owned.len(), "Memcached namespace reset");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        info!("Memcached store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeMemcache;
    use super::*;

    async fn open_store(server: &FakeMemcache, namespace: &str) -> MemcacheStore {
        MemcacheStore::new(MemcacheConfig {
            namespace: namespace.to_string(),
            timeout: Duration::from_secs(1),
            ..MemcacheConfig::with_servers(server.server())
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_exptime() {
        let now = 1_700_000_000_000;
        assert_eq!(exptime(Duration::ZERO, now), 0);
        assert_eq!(exptime(Duration::from_millis(1), now), 1);
        assert_eq!(exptime(Duration::from_millis(1500), now), 2);
        assert_eq!(exptime(Duration::from_secs(60), now), 60);

        let long = Duration::from_secs(RELATIVE_LIMIT + 1);
        assert_eq!(
            exptime(long, now) as u64,
            1_700_000_000 + RELATIVE_LIMIT + 1
        );
        assert_eq!(exptime(Duration::MAX, now), u32::MAX);
    }

    #[test]
    fn test_envelope() {
        let mut data = Vec::new();
        seal(&Value::I64(7), Expiry::from_millis(2_000), &mut data).unwrap();

        assert_eq!(open(&data, 1_999).unwrap(), Some(Value::I64(7)));
        assert_eq!(open(&data, 2_000).unwrap(), None);
        assert!(matches!(open(b"short", 0), Err(StorageError::Protocol(_))));

        let mut never = Vec::new();
        seal(&Value::Nil, Expiry::NEVER, &mut never).unwrap();
        assert_eq!(open(&never, i64::MAX).unwrap(), Some(Value::Nil));
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let server = FakeMemcache::start(true).await;
        let store = open_store(&server, "").await;

        store.set("john", "doe".into(), Duration::ZERO).await.unwrap();
        assert_eq!(
            store.get("john").await.unwrap().string().unwrap(),
            Some("doe".to_string())
        );

        store.delete(&["john", "missing"]).await.unwrap();
        assert!(store.get("john").await.unwrap().is_miss());
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sub_second_ttl() {
        let server = FakeMemcache::start(true).await;
        let store = open_store(&server, "").await;

        store
            .set("short", 1i64.into(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(store.get("short").await.unwrap().is_hit());

        tokio::time::sleep(Duration::from_millis(80)).await;
        // Still held by the server (1s exptime) but expired by the envelope
        assert!(server.engine.exists("short"));
        assert!(store.get("short").await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn test_items_are_recycled_clean() {
        let server = FakeMemcache::start(true).await;
        let store = open_store(&server, "").await;

        store.set("a", "x".repeat(100).into(), Duration::ZERO).await.unwrap();
        assert_eq!(store.items.idle(), 1);

        {
            let item = store.items.acquire();
            assert!(item.key.is_empty());
            assert!(item.value.is_empty());
            assert_eq!(item.expiration, 0);
        }
        store.set("b", Value::Nil, Duration::ZERO).await.unwrap();
        assert_eq!(store.get("b").await.unwrap().value(), Some(&Value::Nil));
    }

    #[tokio::test]
    async fn test_malformed_key_is_backend_error() {
        let server = FakeMemcache::start(true).await;
        let store = open_store(&server, "").await;

        let result = store.set("has space", Value::Nil, Duration::ZERO).await;
        assert!(matches!(result, Err(StorageError::Backend { backend: "memcache", .. })));
        assert!(matches!(store.get("").await, Err(StorageError::EmptyKey)));
        assert!(matches!(store.delete(&[]).await, Err(StorageError::NoKeys)));
    }

    #[tokio::test]
    async fn test_namespace_reset() {
        let server = FakeMemcache::start(true).await;
        let sessions = open_store(&server, "sessions").await;
        let cache = open_store(&server, "cache").await;

        for i in 0..10 {
            sessions
                .set(&format!("user {}", i).replace(' ', "-"), Value::I64(i), Duration::ZERO)
                .await
                .unwrap();
        }
        cache.set("home", "page".into(), Duration::ZERO).await.unwrap();
        assert!(server.engine.exists("sessions:user-3"));

        sessions.reset().await.unwrap();
        assert!(sessions.get("user-3").await.unwrap().is_miss());
        assert_eq!(server.engine.len(), 1);
        assert!(cache.get("home").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn test_global_reset_flushes() {
        let server = FakeMemcache::start(true).await;
        let store = open_store(&server, "").await;
        store.set("a", Value::Nil, Duration::ZERO).await.unwrap();

        store.reset().await.unwrap();
        assert!(server.engine.is_empty());
    }

    #[tokio::test]
    async fn test_reset_without_crawler_fails() {
        let server = FakeMemcache::start(false).await;
        let store = open_store(&server, "app").await;

        let result = store.reset().await;
        assert!(matches!(result, Err(StorageError::Backend { .. })));
        // The connection is still usable after a backend error
        store.set("k", Value::Nil, Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_construction() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = MemcacheStore::new(MemcacheConfig {
            timeout: Duration::from_millis(500),
            ..MemcacheConfig::with_servers(addr.to_string())
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let server = FakeMemcache::start(true).await;
        let store = open_store(&server, "").await;

        store.close().await.unwrap();
        assert!(matches!(store.get("k").await, Err(StorageError::Closed)));
    }
}

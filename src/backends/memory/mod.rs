//! In-Memory Adapter
//!
//! [`MemoryStore`] keeps values natively in a sharded [`MemoryEngine`].
//! Several stores can share one engine through [`MemoryStore::with_engine`],
//! each isolated by the prefix namespace strategy:
//!
//! ```text
//!   MemoryStore("sessions") ──┐
//!                             ├──► Arc<MemoryEngine>  { "sessions:42", "cache:home", ... }
//!   MemoryStore("cache")    ──┘
//! ```
//!
//! Deadlines are enforced lazily by the engine on read. A GC scheduler
//! removes the store's expired keys in the background.

pub mod engine;

pub use engine::{Entry, MemoryEngine};

use crate::error::Result;
use crate::storage::{
    validate_key, validate_keys, GcScheduler, Lookup, Namespace, Storage, Sweep, Value,
    DEFAULT_GC_INTERVAL,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Configuration for [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Namespace label (default: global)
    pub namespace: String,

    /// Interval between GC sweeps (default: 10s)
    pub gc_interval: Duration,

    /// Clear the namespace when the store is opened
    pub reset: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            gc_interval: DEFAULT_GC_INTERVAL,
            reset: false,
        }
    }
}

/// Sweeps one namespace of a shared engine.
struct NamespaceSweeper {
    engine: Arc<MemoryEngine>,
    pattern: String,
}

#[async_trait]
impl Sweep for NamespaceSweeper {
    async fn sweep(&self, _now: i64) -> Result<u64> {
        Ok(self.engine.cleanup_expired_matching(&self.pattern))
    }
}

/// A [`Storage`] adapter over the in-memory engine.
#[derive(Debug)]
pub struct MemoryStore {
    engine: Arc<MemoryEngine>,
    namespace: Namespace,
    gc: GcScheduler,
}

impl MemoryStore {
    /// Opens a store over a fresh engine.
    pub fn new(config: MemoryConfig) -> Self {
        Self::with_engine(Arc::new(MemoryEngine::new()), config)
    }

    /// Opens a store over a shared engine.
    ///
    /// Must be called within a tokio runtime: the GC task is spawned here.
    pub fn with_engine(engine: Arc<MemoryEngine>, config: MemoryConfig) -> Self {
        let namespace = Namespace::new(&config.namespace);

        let store = Self {
            gc: GcScheduler::start(
                Arc::new(NamespaceSweeper {
                    engine: Arc::clone(&engine),
                    pattern: namespace.pattern(),
                }),
                config.gc_interval,
            ),
            engine,
            namespace,
        };

        if config.reset {
            store.clear();
        }

        info!(namespace = %store.namespace, "Memory store opened");
        store
    }

    /// Returns the underlying engine.
    pub fn conn(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }

    /// The store's namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn clear(&self) {
        if self.namespace.is_global() {
            self.engine.flush();
        } else {
            self.engine.delete_matching(&self.namespace.pattern());
        }
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get(&self, key: &str) -> Result<Lookup> {
        validate_key(key)?;
        Ok(self.engine.get(&self.namespace.prefixed(key)).into())
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        validate_key(key)?;
        self.engine
            .set(self.namespace.prefixed(key), value, Some(ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<()> {
        validate_keys(keys)?;
        for key in keys {
            self.engine.delete(&self.namespace.prefixed(key));
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.gc.stop().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::GcState;

    fn config(namespace: &str) -> MemoryConfig {
        MemoryConfig {
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new(MemoryConfig::default());

        store.set("john", "doe".into(), Duration::ZERO).await.unwrap();
        let lookup = store.get("john").await.unwrap();
        assert_eq!(lookup.string().unwrap(), Some("doe".to_string()));

        store.delete(&["john"]).await.unwrap();
        assert!(store.get("john").await.unwrap().is_miss());

        // Deleting again is fine
        store.delete(&["john"]).await.unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_validation() {
        let store = MemoryStore::new(MemoryConfig::default());
        store.set("a", 1i64.into(), Duration::ZERO).await.unwrap();

        assert!(matches!(store.get("").await, Err(StorageError::EmptyKey)));
        assert!(store.set("", Value::Nil, Duration::ZERO).await.is_err());
        assert!(matches!(store.delete(&[]).await, Err(StorageError::NoKeys)));

        // Nothing is deleted when any key is invalid
        assert!(store.delete(&["a", ""]).await.is_err());
        assert!(store.get("a").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryStore::new(MemoryConfig::default());
        store
            .set("k", true.into(), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().bool().unwrap(), Some(true));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get("k").await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let store = MemoryStore::new(MemoryConfig::default());
        store.set("k", Value::Nil, Duration::MAX).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().value(), Some(&Value::Nil));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let engine = Arc::new(MemoryEngine::new());
        let sessions = MemoryStore::with_engine(Arc::clone(&engine), config("sessions"));
        let cache = MemoryStore::with_engine(Arc::clone(&engine), config("cache:"));

        sessions.set("42", 1i64.into(), Duration::ZERO).await.unwrap();
        cache.set("42", 2i64.into(), Duration::ZERO).await.unwrap();
        assert!(engine.exists("sessions:42"));
        assert!(engine.exists("cache:42"));

        assert_eq!(sessions.get("42").await.unwrap().i64().unwrap(), Some(1));
        assert_eq!(cache.get("42").await.unwrap().i64().unwrap(), Some(2));

        sessions.reset().await.unwrap();
        assert!(sessions.get("42").await.unwrap().is_miss());
        assert!(cache.get("42").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn test_global_reset_flushes() {
        let store = MemoryStore::new(MemoryConfig::default());
        store.set("a", Value::Nil, Duration::ZERO).await.unwrap();
        store.set("b", Value::Nil, Duration::ZERO).await.unwrap();

        store.reset().await.unwrap();
        assert!(store.conn().is_empty());
    }

    #[tokio::test]
    async fn test_reset_on_open() {
        let engine = Arc::new(MemoryEngine::new());
        engine.set("app:stale", Value::Nil, None);
        engine.set("other:kept", Value::Nil, None);

        let _store = MemoryStore::with_engine(
            Arc::clone(&engine),
            MemoryConfig {
                namespace: "app".to_string(),
                reset: true,
                ..Default::default()
            },
        );
        assert!(!engine.exists("app:stale"));
        assert!(engine.exists("other:kept"));
    }

    #[tokio::test]
    async fn test_gc_removes_expired_keys() {
        let engine = Arc::new(MemoryEngine::new());
        let store = MemoryStore::with_engine(
            Arc::clone(&engine),
            MemoryConfig {
                namespace: "gc".to_string(),
                gc_interval: Duration::from_millis(20),
                reset: false,
            },
        );
        engine.set("other:short", Value::Nil, Some(Duration::from_millis(10)));

        for i in 0..10 {
            store
                .set(&format!("k{}", i), Value::Nil, Duration::from_millis(10))
                .await
                .unwrap();
        }
        store.set("kept", Value::Nil, Duration::ZERO).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Only this namespace is swept
        assert_eq!(engine.len(), 2);
        assert!(engine.exists("gc:kept"));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_stops_gc() {
        let store = MemoryStore::new(MemoryConfig::default());
        store.close().await.unwrap();
        assert_eq!(store.gc.state(), GcState::Stopped);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_session_scenario() {
        let store = MemoryStore::new(MemoryConfig::default());
        let session = Value::map([("uid", 7i64)]);

        store
            .set("session:42", session.clone(), Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(store.get("session:42").await.unwrap().value(), Some(&session));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(store.get("session:42").await.unwrap().is_miss());
        store.delete(&["session:42"]).await.unwrap();
    }
}

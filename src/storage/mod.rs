//! Storage Contract
//!
//! This module defines the [`Storage`] trait every adapter implements and
//! the helper components adapters share.
//!
//! ## Architecture
//!
//! ```text
//!                 caller
//!                   │  get / set / delete / reset / close
//!                   ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     dyn Storage                             │
//! │  ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────────┐  │
//! │  │ Memory   │ │ Redis    │ │ Memcache  │ │ Sql<Engine>  │  │
//! │  └──────────┘ └──────────┘ └───────────┘ └──────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!        │ uses
//!        ▼
//!  Namespace · Expiry · codec · ScratchPool · GcScheduler
//! ```
//!
//! ## Guarantees
//!
//! - A `get` is exactly one of: an error, a miss, or a hit.
//! - An entry past its deadline is never returned, even if it is still
//!   physically present.
//! - `reset` only touches the adapter's own namespace.
//! - Key validation happens before the engine is contacted.
//!
//! ## Example
//!
//! ```
//! use kvport::backends::memory::{MemoryConfig, MemoryStore};
//! use kvport::storage::Storage;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> kvport::Result<()> {
//! let store = MemoryStore::new(MemoryConfig::default());
//!
//! store.set("visits", 41i64.into(), Duration::ZERO).await?;
//! let visits = store.get("visits").await?;
//! assert_eq!(visits.i64()?, Some(41));
//!
//! assert!(store.get("missing").await?.is_miss());
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod coerce;
pub mod expiry;
pub mod gc;
pub mod namespace;
pub mod scratch;
pub mod value;

// Re-export commonly used types
pub use coerce::{FromValue, Lookup};
pub use expiry::{unix_millis_now, Expiry};
pub use gc::{GcScheduler, GcState, Sweep, DEFAULT_GC_INTERVAL};
pub use namespace::Namespace;
pub use scratch::{Scratch, ScratchGuard, ScratchPool};
pub use value::{Kind, Value};

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use std::time::Duration;

/// The uniform key-value contract.
///
/// Implementations are safe to share between tasks.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Looks up a key.
    ///
    /// A missing or expired key is a miss, not an error.
    async fn get(&self, key: &str) -> Result<Lookup>;

    /// Stores a value, overwriting any previous one.
    ///
    /// A zero `ttl` means the entry never expires.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Deletes one or more keys. Absent keys are ignored.
    async fn delete(&self, keys: &[&str]) -> Result<()>;

    /// Removes every entry in this instance's namespace.
    async fn reset(&self) -> Result<()>;

    /// Stops background work and releases the engine connection.
    async fn close(&self) -> Result<()>;
}

/// Rejects zero-length keys.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::EmptyKey);
    }
    Ok(())
}

/// Validates every key of a multi-key delete before any is removed.
pub fn validate_keys(keys: &[&str]) -> Result<()> {
    if keys.is_empty() {
        return Err(StorageError::NoKeys);
    }
    keys.iter().try_for_each(|key| validate_key(key))
}

//! # kvport - One Key-Value Contract, Many Backends
//!
//! kvport stores typed values under string keys, with optional expiry and
//! namespace isolation, behind a single async [`Storage`] trait. The same
//! calls work against an in-process sharded map, Redis, memcached, SQLite,
//! PostgreSQL or MySQL.
//!
//! ## Features
//!
//! - **Uniform contract**: `get`, `set`, `delete` (one or many keys),
//!   `reset` and `close` behave identically on every backend
//! - **Typed reads**: a [`Lookup`] converts the stored [`Value`] to any
//!   primitive, a homogeneous vector of one, or a `serde` type
//! - **Expiry**: per-entry TTLs, enforced on read and swept in the background
//!   where the engine has no native TTL
//! - **Namespaces**: several stores can share one engine without seeing each
//!   other's keys
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              kvport                                     │
//! │                                                                         │
//! │   caller ──► dyn Storage ──► Namespace ──► Expiry ──► codec             │
//! │                   │                                                     │
//! │    ┌──────────────┼───────────────┬──────────────────┐                  │
//! │    ▼              ▼               ▼                  ▼                  │
//! │ ┌────────┐  ┌────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │ │ Memory │  │   Redis    │  │  Memcached   │  │ SqlStore<E>          │  │
//! │ │ Engine │  │ RESP + pool│  │ text + pool  │  │ SQLite / PG / MySQL  │  │
//! │ │64 shard│  └────────────┘  │ + item pool  │  └──────────────────────┘  │
//! │ └────────┘                  └──────────────┘                            │
//! │     ▲                                                  ▲                │
//! │     └──────────────── GcScheduler (tokio task) ────────┘                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use kvport::backends::{MemoryConfig, MemoryStore};
//! use kvport::{Storage, Value};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> kvport::Result<()> {
//! let store = MemoryStore::new(MemoryConfig {
//!     namespace: "sessions".to_string(),
//!     ..Default::default()
//! });
//!
//! store
//!     .set("42", Value::map([("uid", 7i64)]), Duration::from_secs(2))
//!     .await?;
//!
//! let session = store.get("42").await?;
//! assert!(session.is_hit());
//!
//! store.delete(&["42"]).await?;
//! store.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the contract, values, coercion, namespaces, expiry and GC
//! - [`backends`]: the adapters
//! - [`protocol`]: RESP types and parser used by the Redis adapter
//! - [`connection`]: framed TCP streams and the connection pool
//! - [`error`]: error types

pub mod backends;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use error::{ConversionError, Result, StorageError};
pub use storage::{FromValue, Lookup, Storage, Value};

/// Version of kvport
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Backend Adapters
//!
//! Each adapter implements [`Storage`](crate::storage::Storage) over one
//! engine and exposes it through an inherent `conn()` method.
//!
//! | Adapter           | Namespace | Expiry                     | GC task |
//! |-------------------|-----------|----------------------------|---------|
//! | [`MemoryStore`]   | prefix    | engine deadline (`Instant`)| yes     |
//! | [`RedisStore`]    | prefix    | `SET ... PX`               | no      |
//! | [`MemcacheStore`] | prefix    | exptime + envelope         | no      |
//! | [`SqlStore`]      | column    | `expiry` column (unix ms)  | yes     |

pub mod memcache;
pub mod memory;
pub mod redis;
pub mod sql;

pub use memcache::{MemcacheConfig, MemcacheStore};
pub use memory::{MemoryConfig, MemoryStore};
pub use redis::{RedisConfig, RedisStore};
pub use sql::{SqlConfig, SqlEngine, SqlStore};

//! Connection Layer
//!
//! Shared plumbing for the network adapters (Redis and memcached).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ConnectionPool<Dialer>                     │
//! │   idle: [conn, conn]          dial() on demand              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ acquire()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   protocol connection (RESP or memcached text)              │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ send cmd    │───>│ read bytes  │───>│ parse reply │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                    FramedStream                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod framed;
pub mod pool;

pub use framed::{FramedStream, DEFAULT_MAX_BUFFER};
pub use pool::{ConnectionPool, Dial, Pooled};

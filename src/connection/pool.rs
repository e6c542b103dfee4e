//! Connection Pool
//!
//! Network adapters keep a small pool of open connections so concurrent
//! operations neither serialize on one socket nor pay a TCP handshake
//! each time.
//!
//! ```text
//!   acquire() ──► idle connection? ──yes──► Pooled guard
//!                      │ no
//!                      ▼
//!                 Dial::dial() ───────────► Pooled guard
//!
//!   drop(guard)      ──► back to idle (up to max_idle)
//!   guard.discard()  ──► connection closed, never reused
//! ```
//!
//! A connection that failed mid-request may hold half a reply in its
//! buffer, so callers discard it instead of returning it.

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Opens new connections for a pool.
#[async_trait]
pub trait Dial: Send + Sync + 'static {
    type Conn: Send + 'static;

    /// Opens and initializes one connection.
    async fn dial(&self) -> Result<Self::Conn>;
}

/// A pool of reusable connections.
pub struct ConnectionPool<D: Dial> {
    dialer: D,

    /// Connections ready for reuse
    idle: Mutex<Vec<D::Conn>>,

    /// Maximum number of idle connections kept
    max_idle: usize,

    /// Bounds the number of open connections, if set
    limit: Option<Arc<Semaphore>>,

    closed: AtomicBool,
}

impl<D: Dial> std::fmt::Debug for ConnectionPool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("idle", &self.idle.lock().unwrap().len())
            .field("max_idle", &self.max_idle)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl<D: Dial> ConnectionPool<D> {
    /// Creates an empty pool.
    ///
    /// `max_open` bounds the number of connections handed out at once;
    /// `None` leaves it unbounded.
    pub fn new(dialer: D, max_idle: usize, max_open: Option<usize>) -> Self {
        Self {
            dialer,
            idle: Mutex::new(Vec::new()),
            max_idle,
            limit: max_open.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            closed: AtomicBool::new(false),
        }
    }

    /// The dialer, for its configuration.
    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Returns an idle connection or dials a new one.
    pub async fn acquire(&self) -> Result<Pooled<'_, D>> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }

        let permit = match &self.limit {
            Some(limit) => Some(
                Arc::clone(limit)
                    .acquire_owned()
                    .await
                    .map_err(|_| StorageError::Closed)?,
            ),
            None => None,
        };

        let reused = self.idle.lock().unwrap().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => self.dialer.dial().await?,
        };

        Ok(Pooled {
            pool: self,
            conn: Some(conn),
            _permit: permit,
        })
    }

    /// Number of idle connections.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drops idle connections and rejects further acquisitions.
    ///
    /// Connections currently handed out are dropped when returned.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(limit) = &self.limit {
            limit.close();
        }
        let dropped = std::mem::take(&mut *self.idle.lock().unwrap());
        debug!(connections = dropped.len(), "Connection pool closed");
    }

    fn release(&self, conn: D::Conn) {
        if self.is_closed() {
            return;
        }
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

/// A connection borrowed from a [`ConnectionPool`].
pub struct Pooled<'a, D: Dial> {
    pool: &'a ConnectionPool<D>,
    conn: Option<D::Conn>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<D: Dial> Pooled<'_, D> {
    /// Closes the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl<D: Dial> Deref for Pooled<'_, D> {
    type Target = D::Conn;

    fn deref(&self) -> &D::Conn {
        // Only `discard` and `drop` take the connection.
        self.conn.as_ref().unwrap()
    }
}

impl<D: Dial> DerefMut for Pooled<'_, D> {
    fn deref_mut(&mut self) -> &mut D::Conn {
        self.conn.as_mut().unwrap()
    }
}

impl<D: Dial> Drop for Pooled<'_, D> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

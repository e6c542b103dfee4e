//! Error Types
//!
//! Two error families are used across the crate:
//!
//! - [`StorageError`] is returned by every [`Storage`](crate::storage::Storage)
//!   operation and by adapter construction.
//! - [`ConversionError`] is returned only by the coercion accessors on
//!   [`Lookup`](crate::storage::Lookup). It converts into `StorageError`
//!   so both can be propagated with `?` from the same function.
//!
//! A miss is never an error: it is the `Ok` side of a lookup with no value.

use crate::storage::Kind;
use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors returned by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A zero-length key was passed to `get`, `set` or `delete`
    #[error("storage keys cannot be zero length")]
    EmptyKey,

    /// `delete` was called without any key
    #[error("at least one key is required for delete")]
    NoKeys,

    /// The engine rejected or failed an operation
    #[error("{backend} error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    /// I/O error on a network connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine did not answer within the configured timeout
    #[error("{backend} operation timed out")]
    Timeout { backend: &'static str },

    /// The engine sent a reply we could not understand
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Encoding a value on `set` or decoding it on `get` failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A coercion accessor failed (never produced by `get` itself)
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Invalid adapter configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The adapter or its connection pool has been closed
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Creates a backend error from anything displayable.
    pub fn backend(backend: &'static str, err: impl std::fmt::Display) -> Self {
        StorageError::Backend {
            backend,
            message: err.to_string(),
        }
    }

    /// Returns true for key validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::EmptyKey | StorageError::NoKeys)
    }
}

impl From<crate::protocol::ParseError> for StorageError {
    fn from(err: crate::protocol::ParseError) -> Self {
        StorageError::Protocol(err.to_string())
    }
}

/// Errors returned when a stored value cannot be converted to the
/// requested shape.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    /// The stored value is nil
    #[error("{target} values may not be nil")]
    Nil { target: &'static str },

    /// No conversion exists between the stored kind and the target
    #[error("cannot convert {source_kind} to {target}")]
    Unsupported {
        source_kind: Kind,
        target: &'static str,
    },

    /// Text could not be parsed with the target's grammar
    #[error("invalid {target} value (from {source_kind}): {input:?}")]
    Malformed {
        source_kind: Kind,
        target: &'static str,
        input: String,
    },

    /// A sequence mixes element kinds
    #[error("{target} sequence elements must share one kind (found {first} and {other})")]
    Heterogeneous {
        target: &'static str,
        first: Kind,
        other: Kind,
    },

    /// Deserializing into a caller-provided type failed
    #[error("cannot deserialize value: {0}")]
    Deserialize(String),
}

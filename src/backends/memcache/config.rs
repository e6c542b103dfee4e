//! Memcached adapter configuration.

use crate::error::{Result, StorageError};
use std::time::Duration;

/// Configuration for [`MemcacheStore`](super::MemcacheStore).
#[derive(Debug, Clone)]
pub struct MemcacheConfig {
    /// Comma separated `host:port` list; the first entry is used
    /// (default: 127.0.0.1:11211)
    pub servers: String,

    /// Key prefix isolating this store (default: global)
    pub namespace: String,

    /// Clear the namespace when the store is opened
    pub reset: bool,

    /// Idle connections kept open (default: 2)
    pub max_idle_conns: usize,

    /// Bound on connecting and on each request (default: 100ms)
    pub timeout: Duration,

    /// Idle request items kept for reuse (default: 64)
    pub item_pool: usize,
}

impl Default for MemcacheConfig {
    fn default() -> Self {
        Self {
            servers: "127.0.0.1:11211".to_string(),
            namespace: String::new(),
            reset: false,
            max_idle_conns: 2,
            timeout: Duration::from_millis(100),
            item_pool: 64,
        }
    }
}

impl MemcacheConfig {
    /// Creates a configuration for the given server list.
    pub fn with_servers(servers: impl Into<String>) -> Self {
        Self {
            servers: servers.into(),
            ..Default::default()
        }
    }

    /// Returns the server the store connects to.
    pub fn server(&self) -> Result<String> {
        self.servers
            .split(',')
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StorageError::Config("no memcached server configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MemcacheConfig::default();
        assert_eq!(config.server().unwrap(), "127.0.0.1:11211");
        assert_eq!(config.max_idle_conns, 2);
        assert_eq!(config.timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_first_server_is_used() {
        let config = MemcacheConfig::with_servers(" 10.0.0.1:11211 , 10.0.0.2:11211");
        assert_eq!(config.server().unwrap(), "10.0.0.1:11211");

        assert!(MemcacheConfig::with_servers(" , ").server().is_err());
    }
}

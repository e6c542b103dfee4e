//! Sharded In-Memory Engine
//!
//! A thread-safe, concurrent map from string keys to [`Value`]s with
//! optional deadlines.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: keys are spread over 64 shards, each behind its
//!    own `RwLock`, so tasks touching different keys rarely contend.
//! 2. **Lazy Expiry**: an expired entry is never returned; the read that
//!    discovers it removes it.
//! 3. **Native Values**: entries hold the `Value` itself, so no codec is
//!    involved on this path.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MemoryEngine                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::storage::Value;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Number of shards for the engine.
const NUM_SHARDS: usize = 64;

/// A stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored value
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry. A `None` or zero TTL never expires, and neither
    /// does a TTL too large to represent as an `Instant`.
    pub fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl
                .filter(|ttl| !ttl.is_zero())
                .and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    /// Checks if this entry has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<String, Entry>>,
}

/// The shared in-memory engine.
///
/// Wrap it in an `Arc` to share it between several namespaced
/// [`MemoryStore`](super::MemoryStore)s.
///
/// # Example
///
/// ```
/// use kvport::backends::memory::MemoryEngine;
/// use kvport::storage::Value;
/// use std::time::Duration;
///
/// let engine = MemoryEngine::new();
///
/// engine.set("name", Value::from("Ariz"), None);
/// assert_eq!(engine.get("name"), Some(Value::from("Ariz")));
///
/// engine.set("session", Value::from("abc123"), Some(Duration::from_secs(60)));
/// assert_eq!(engine.len(), 2);
/// ```
pub struct MemoryEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Statistics: total number of keys (approximate)
    key_count: AtomicU64,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            key_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Stores a value, replacing any previous entry and its deadline.
    ///
    /// Returns `true` if a new key was created.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) -> bool {
        let key = key.into();
        let mut data = self.shard(&key).data.write().unwrap();
        let is_new = data.insert(key, Entry::new(value, ttl)).is_none();
        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. Expired
    /// entries are removed on the way out.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Gets the full entry for a key, including its deadline.
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        let shard = self.shard(key);

        // Fast path under the read lock
        {
            let data = shard.data.read().unwrap();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut data = shard.data.write().unwrap();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                None
            }
            // Another writer replaced the entry in between
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Deletes a key. Returns `true` if it existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut data = self.shard(key).data.write().unwrap();
        if data.remove(key).is_some() {
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Deletes several keys, returning how many existed.
    pub fn delete_many<S: AsRef<str>>(&self, keys: &[S]) -> u64 {
        keys.iter().filter(|key| self.delete(key.as_ref())).count() as u64
    }

    /// Checks if a key exists and is not expired.
    pub fn exists(&self, key: &str) -> bool {
        let data = self.shard(key).data.read().unwrap();
        data.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Returns all live keys matching a glob pattern.
    ///
    /// - `*` matches any run of characters
    /// - `?` matches one character
    /// - `[ae]`, `[a-z]`, `[^a]` match character classes
    /// - `\x` matches `x` literally
    ///
    /// This scans every shard.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let pattern = GlobPattern::new(pattern);
        let mut result = Vec::new();

        for shard in &self.shards {
            let data = shard.data.read().unwrap();
            result.extend(
                data.iter()
                    .filter(|(key, entry)| !entry.is_expired() && pattern.matches(key))
                    .map(|(key, _)| key.clone()),
            );
        }

        result
    }

    /// Deletes every key matching a glob pattern, expired or not.
    ///
    /// Returns the number of keys removed.
    pub fn delete_matching(&self, pattern: &str) -> u64 {
        self.retain(pattern, |_| false)
    }

    /// Removes expired entries whose keys match a glob pattern.
    ///
    /// Returns the number of keys removed.
    pub fn cleanup_expired_matching(&self, pattern: &str) -> u64 {
        let now = Instant::now();
        self.retain(pattern, |entry| !entry.is_expired_at(now))
    }

    /// Keeps matching entries for which `keep` returns true.
    fn retain(&self, pattern: &str, keep: impl Fn(&Entry) -> bool) -> u64 {
        let pattern = GlobPattern::new(pattern);
        let mut removed = 0u64;

        for shard in &self.shards {
            let mut data = shard.data.write().unwrap();
            let before = data.len();
            data.retain(|key, entry| !pattern.matches(key) || keep(entry));
            removed += (before - data.len()) as u64;
        }

        if removed > 0 {
            self.key_count.fetch_sub(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Clears all data.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.data.write().unwrap().clear();
        }
        self.key_count.store(0, Ordering::Relaxed);
    }

    /// Returns the number of stored keys, expired ones included.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Glob matcher used for namespace walks.
pub(crate) struct GlobPattern {
    pattern: Vec<u8>,
}

impl GlobPattern {
    pub(crate) fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.as_bytes().to_vec(),
        }
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        Self::matches_recursive(&self.pattern, text.as_bytes())
    }

    fn matches_recursive(pattern: &[u8], text: &[u8]) -> bool {
        let Some(&first) = pattern.first() else {
            return text.is_empty();
        };

        match first {
            b'*' => (0..=text.len()).any(|i| Self::matches_recursive(&pattern[1..], &text[i..])),
            b'?' => !text.is_empty() && Self::matches_recursive(&pattern[1..], &text[1..]),
            b'[' => {
                if text.is_empty() {
                    return false;
                }

                let mut i = 1;
                let mut matched = false;
                let negate = pattern.get(1) == Some(&b'^');
                if negate {
                    i += 1;
                }

                while i < pattern.len() && pattern[i] != b']' {
                    if pattern[i] == text[0] {
                        matched = true;
                    }
                    // Ranges like [a-z]
                    if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
                        if text[0] >= pattern[i] && text[0] <= pattern[i + 2] {
                            matched = true;
                        }
                        i += 2;
                    }
                    i += 1;
                }

                if negate {
                    matched = !matched;
                }

                i < pattern.len() && matched && Self::matches_recursive(&pattern[i + 1..], &text[1..])
            }
            b'\\' => {
                pattern.len() > 1
                    && !text.is_empty()
                    && pattern[1] == text[0]
                    && Self::matches_recursive(&pattern[2..], &text[1..])
            }
            c => !text.is_empty() && c == text[0] && Self::matches_recursive(&pattern[1..], &text[1..]),
        }
    }
}

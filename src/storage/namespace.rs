//! Namespace Key Scheme
//!
//! A namespace isolates the entries of one adapter instance from every
//! other instance sharing the same engine. Two strategies exist:
//!
//! ```text
//!   prefix strategy (memory, Redis, memcached)
//!       namespace "sessions/"  +  key "42"  =>  "sessions:42"
//!
//!   column strategy (SQL)
//!       | key  | namespace | value | expiry |
//!       | "42" | "sessions"| ...   | ...    |
//! ```
//!
//! Trailing separator characters (`/ \ space : _ -`) are trimmed from the
//! label, so `"sessions"`, `"sessions:"` and `"sessions/ "` all address the
//! same entries. An empty label means the global namespace.

use std::fmt;

/// Characters trimmed from the end of a namespace label.
const SEPARATORS: &[char] = &['/', '\\', ' ', ':', '_', '-'];

/// Placed between the label and the key in the prefix strategy.
pub const DELIMITER: char = ':';

/// A normalized namespace label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Namespace {
    label: String,
}

impl Namespace {
    /// Creates a namespace, trimming trailing separators.
    pub fn new(label: impl AsRef<str>) -> Self {
        Self {
            label: label.as_ref().trim_end_matches(SEPARATORS).to_string(),
        }
    }

    /// The global namespace.
    pub fn global() -> Self {
        Self::default()
    }

    /// Returns true when no prefix applies.
    pub fn is_global(&self) -> bool {
        self.label.is_empty()
    }

    /// The trimmed label, as stored in a namespace column.
    pub fn column(&self) -> &str {
        &self.label
    }

    /// Returns the physical key for `key` under the prefix strategy.
    pub fn prefixed(&self, key: &str) -> String {
        if self.is_global() {
            return key.to_string();
        }

        let mut physical = String::with_capacity(self.label.len() + 1 + key.len());
        physical.push_str(&self.label);
        physical.push(DELIMITER);
        physical.push_str(key);
        physical
    }

    /// Strips this namespace's prefix from a physical key.
    ///
    /// Returns `None` if the key does not belong to the namespace.
    pub fn strip<'a>(&self, physical: &'a str) -> Option<&'a str> {
        if self.is_global() {
            return Some(physical);
        }
        physical
            .strip_prefix(self.label.as_str())?
            .strip_prefix(DELIMITER)
    }

    /// Returns the glob pattern matching every physical key in this
    /// namespace. Glob metacharacters in the label are escaped.
    pub fn pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.label.len() + 2);
        for c in self.label.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        if !self.is_global() {
            pattern.push(DELIMITER);
        }
        pattern.push('*');
        pattern
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl From<&str> for Namespace {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Namespace {
    fn from(label: String) -> Self {
        Self::new(label)
    }
}

//! Expiry Policy
//!
//! Adapters that store their own deadlines (SQL tables, the memcached
//! envelope) record them as unix **milliseconds**, with `0` meaning the
//! entry never expires.
//!
//! ```text
//!   set(key, value, 1500ms) at t=10_000   =>  expiry = 11_500
//!   get(key)                at t=11_499   =>  hit
//!   get(key)                at t=11_500   =>  miss (lazy expiry)
//! ```
//!
//! Engines with native TTL support (the memory engine, Redis) enforce
//! expiry themselves and never see an [`Expiry`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current unix time in milliseconds.
pub fn unix_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Rounds a duration up to whole milliseconds, saturating at `u64::MAX`.
pub fn ceil_millis(ttl: Duration) -> u64 {
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    if ttl.subsec_nanos() % 1_000_000 != 0 {
        millis.saturating_add(1)
    } else {
        millis
    }
}

/// An absolute expiry deadline in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Expiry(i64);

impl Expiry {
    /// An entry that never expires.
    pub const NEVER: Expiry = Expiry(0);

    /// Computes the deadline for `ttl` from now. A zero TTL never expires.
    pub fn after(ttl: Duration) -> Self {
        Self::after_from(ttl, unix_millis_now())
    }

    /// Computes the deadline for `ttl` from `now` (unix ms).
    pub fn after_from(ttl: Duration, now: i64) -> Self {
        if ttl.is_zero() {
            return Self::NEVER;
        }
        let millis = i64::try_from(ceil_millis(ttl)).unwrap_or(i64::MAX);
        Expiry(now.saturating_add(millis))
    }

    /// Wraps a stored deadline.
    pub fn from_millis(millis: i64) -> Self {
        Expiry(millis)
    }

    /// The stored representation.
    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns true if the entry never expires.
    pub fn is_never(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the deadline has passed at `now` (unix ms).
    pub fn is_expired_at(self, now: i64) -> bool {
        self.0 != 0 && self.0 <= now
    }

    /// Returns true if the deadline has passed.
    pub fn is_expired(self) -> bool {
        self.is_expired_at(unix_millis_now())
    }

    /// Time left before the deadline, or `None` for entries that never expire.
    pub fn remaining_at(self, now: i64) -> Option<Duration> {
        if self.is_never() {
            return None;
        }
        Some(Duration::from_millis(self.0.saturating_sub(now).max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_never_expires() {
        let expiry = Expiry::after_from(Duration::ZERO, 10_000);
        assert!(expiry.is_never());
        assert!(!expiry.is_expired_at(i64::MAX));
        assert_eq!(expiry.remaining_at(10_000), None);
    }

    #[test]
    fn test_deadline() {
        let expiry = Expiry::after_from(Duration::from_millis(1500), 10_000);
        assert_eq!(expiry.as_millis(), 11_500);
        assert!(!expiry.is_expired_at(11_499));
        assert!(expiry.is_expired_at(11_500));
        assert_eq!(
            expiry.remaining_at(11_000),
            Some(Duration::from_millis(500))
        );
        assert_eq!(expiry.remaining_at(12_000), Some(Duration::ZERO));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        assert_eq!(ceil_millis(Duration::MAX), u64::MAX);
        assert_eq!(ceil_millis(Duration::from_secs(u64::MAX / 1000 + 1)), u64::MAX);

        let expiry = Expiry::after_from(Duration::MAX, 10_000);
        assert_eq!(expiry.as_millis(), i64::MAX);
        assert!(!expiry.is_expired_at(unix_millis_now()));
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        assert_eq!(ceil_millis(Duration::from_micros(1)), 1);
        assert_eq!(ceil_millis(Duration::from_micros(1_001)), 2);
        assert_eq!(ceil_millis(Duration::from_secs(2)), 2_000);

        let expiry = Expiry::after_from(Duration::from_nanos(1), 0);
        assert_eq!(expiry.as_millis(), 1);
    }

    #[test]
    fn test_now_is_sane() {
        // 2020-01-01 in unix ms.
        assert!(unix_millis_now() > 1_577_836_800_000);
        assert!(!Expiry::after(Duration::from_secs(60)).is_expired());
    }
}

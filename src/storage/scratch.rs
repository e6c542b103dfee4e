//! Scratch Object Pool
//!
//! Adapters that build a request object per operation (the memcached
//! `Item`) reuse them through a [`ScratchPool`]. A borrowed object is
//! cleared when its guard is dropped, so no key or value ever leaks into
//! the next operation that acquires it.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

/// An object that can be reset to its empty state.
pub trait Scratch: Default + Send {
    /// Clears every field.
    fn clear(&mut self);
}

/// A bounded pool of reusable scratch objects.
#[derive(Debug)]
pub struct ScratchPool<T> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Scratch> ScratchPool<T> {
    /// Creates a pool keeping at most `capacity` idle objects.
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Takes an idle object, or creates a fresh one.
    pub fn acquire(&self) -> ScratchGuard<'_, T> {
        let item = self.idle.lock().unwrap().pop().unwrap_or_default();
        ScratchGuard {
            pool: self,
            item: Some(item),
        }
    }

    /// Number of idle objects.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    fn release(&self, mut item: T) {
        item.clear();
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.capacity {
            idle.push(item);
        }
    }
}

/// A borrowed scratch object, returned to its pool on drop.
pub struct ScratchGuard<'a, T: Scratch> {
    pool: &'a ScratchPool<T>,
    item: Option<T>,
}

impl<T: Scratch> Deref for ScratchGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the item.
        self.item.as_ref().unwrap()
    }
}

impl<T: Scratch> DerefMut for ScratchGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap()
    }
}

impl<T: Scratch> Drop for ScratchGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug)]
    struct Buf {
        key: String,
        data: Vec<u8>,
    }

    impl Scratch for Buf {
        fn clear(&mut self) {
            self.key.clear();
            self.data.clear();
        }
    }

    #[test]
    fn test_released_objects_are_cleared() {
        let pool = ScratchPool::<Buf>::new(4);
        {
            let mut buf = pool.acquire();
            buf.key.push_str("john");
            buf.data.extend_from_slice(b"doe");
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.acquire();
        assert!(buf.key.is_empty());
        assert!(buf.data.is_empty());
        // Reused, so the allocation survives
        assert!(buf.key.capacity() >= 4);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let pool = ScratchPool::<Buf>::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }
}

//! Bounded, frequency-decaying cache (spec §4.G), grounded on
//! `gaenari::common::cache.hpp`.
//!
//! Keys accumulate a hit count on every `get`. Once the map reaches
//! `capacity`, the next miss triggers a "survive run": counts are sorted
//! descending, and only the keys whose counts fit within a cumulative
//! `survive_size` budget are kept — their count reset to zero — everything
//! else is evicted.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use crate::error::{Error, Result};

struct Entry<V> {
    value: V,
    count: u64,
}

struct Inner<K, V> {
    items: HashMap<K, Entry<V>>,
}

/// `K`: key type, `V`: value type. Values are cloned out on `get`.
pub struct Cache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    survive_size: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> Cache<K, V> {
    pub fn new(capacity: usize, survive_size: usize) -> Result<Self> {
        if survive_size >= capacity || capacity < 4 {
            return Err(Error::internal("cache requires survive_size < capacity and capacity >= 4"));
        }
        Ok(Self { inner: Mutex::new(Inner { items: HashMap::new() }), capacity, survive_size })
    }

    /// Returns a clone of the cached value for `key`, computing and storing
    /// it via `load` on a miss. `load` may fail (e.g. a storage read); the
    /// error propagates without caching anything.
    pub fn get(&self, key: K, load: impl FnOnce() -> Result<V>) -> Result<V> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if let Some(entry) = inner.items.get_mut(&key) {
            entry.count += 1;
            return Ok(entry.value.clone());
        }

        let value = load()?;

        if inner.items.len() < self.capacity {
            inner.items.insert(key, Entry { value: value.clone(), count: 1 });
            return Ok(value);
        }

        self.survive_run(&mut inner);
        inner.items.insert(key, Entry { value: value.clone(), count: 1 });
        Ok(value)
    }

    fn survive_run(&self, inner: &mut Inner<K, V>) {
        let mut counts: Vec<u64> = inner.items.values().map(|e| e.count).collect();
        counts.sort_unstable_by(|a, b| b.cmp(a));

        let mut survive_threshold = 0u64;
        let mut acc = 0u64;
        for count in counts {
            if acc + count <= self.survive_size as u64 {
                survive_threshold = count;
                acc += count;
                continue;
            }
            break;
        }

        inner.items.retain(|_, entry| {
            if entry.count >= survive_threshold {
                entry.count = 0;
                true
            } else {
                false
            }
        });

        log::warn!("cache refreshed");
    }

    /// Snapshot of currently cached keys, for diagnostics (SPEC_FULL.md §9.3
    /// cache/store verification helpers) — not used by any hot path.
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().expect("cache mutex poisoned").items.keys().cloned().collect()
    }

    pub fn erase(&self, key: &K) {
        self.inner.lock().expect("cache mutex poisoned").items.remove(key);
    }

    pub fn clear(&self) {
        self.inner.lock().expect("cache mutex poisoned").items.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_capacity() {
        assert!(Cache::<i32, i32>::new(3, 1).is_err());
        assert!(Cache::<i32, i32>::new(4, 4).is_err());
    }

    #[test]
    fn hit_increments_count_without_reloading() {
        let c: Cache<String, String> = Cache::new(4, 2).unwrap();
        let mut calls = 0;
        for _ in 0..3 {
            c.get("a".into(), || {
                calls += 1;
                Ok("1".into())
            })
            .unwrap();
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn survive_run_evicts_low_count_entries() {
        let c: Cache<&str, &str> = Cache::new(4, 2).unwrap();
        c.get("a", || Ok("1")).unwrap();
        c.get("a", || Ok("1")).unwrap();
        c.get("a", || Ok("1")).unwrap(); // count 3
        c.get("b", || Ok("2")).unwrap(); // count 1
        c.get("c", || Ok("3")).unwrap(); // count 1, fills capacity 4... wait only 3 keys so far
        c.get("d", || Ok("4")).unwrap(); // now at capacity 4
        // triggers survive run: counts sorted desc [3,1,1,1], survive_size=2 keeps only the '3'
        c.get("e", || Ok("5")).unwrap();
        assert!(c.len() <= 4);
    }

    #[test]
    fn erase_and_clear() {
        let c: Cache<&str, &str> = Cache::new(4, 2).unwrap();
        c.get("a", || Ok("1")).unwrap();
        c.erase(&"a");
        assert_eq!(c.len(), 0);
        c.get("a", || Ok("1")).unwrap();
        c.clear();
        assert_eq!(c.len(), 0);
    }
}

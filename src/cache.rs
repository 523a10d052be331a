//! Bounded TTL cache with insertion-order eviction
//!
//! Used for prices, token metadata, overview data, and wallet balances.
//! Eviction at capacity removes the oldest *insertion*, not the least
//! recently read; reads never reorder entries. Overwriting a key counts as
//! a fresh insertion.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    /// Sequence number of the insertion that produced this entry. Order
    /// queue entries with a stale stamp are skipped at eviction.
    stamp: u64,
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    order: VecDeque<(u64, String)>,
    next_stamp: u64,
}

/// Key -> {value, inserted_at} map with a capacity and TTL.
pub struct BoundedCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(capacity: usize, ttl_seconds: i64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                next_stamp: 0,
            }),
            capacity: capacity.max(1),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Get a value if present and not expired. An expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.map.get(key) {
            Some(entry) => Utc::now() - entry.inserted_at >= self.ttl,
            None => return None,
        };
        if expired {
            inner.map.remove(key);
            return None;
        }
        inner.map.get(key).map(|e| e.value.clone())
    }

    /// Insert a value, evicting the oldest insertion at capacity.
    pub fn insert(&self, key: &str, value: V) {
        let mut inner = self.inner.lock();

        if !inner.map.contains_key(key) {
            while inner.map.len() >= self.capacity {
                let Some((stamp, oldest)) = inner.order.pop_front() else {
                    break;
                };
                // Skip entries superseded by a later insertion of the key.
                let live = inner.map.get(&oldest).map(|e| e.stamp) == Some(stamp);
                if live {
                    inner.map.remove(&oldest);
                }
            }
        }

        inner.next_stamp += 1;
        let stamp = inner.next_stamp;
        inner.map.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Utc::now(),
                stamp,
            },
        );
        inner.order.push_back((stamp, key.to_string()));
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.lock().map.remove(key).map(|e| e.value)
    }

    /// Sweep expired entries and compact the order queue.
    pub fn prune(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let ttl = self.ttl;
        let before = inner.map.len();
        inner.map.retain(|_, e| now - e.inserted_at < ttl);
        let map = &inner.map;
        let live: VecDeque<(u64, String)> = inner
            .order
            .iter()
            .filter(|(stamp, key)| map.get(key).map(|e| e.stamp) == Some(*stamp))
            .cloned()
            .collect();
        inner.order = live;
        before - inner.map.len()
    }

    /// Drop entries beyond `cap`, oldest first. Used by the scheduler to hard
    /// cap the token metadata cache.
    pub fn cap_to(&self, cap: usize) -> usize {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        while inner.map.len() > cap {
            let Some((stamp, oldest)) = inner.order.pop_front() else {
                break;
            };
            let live = inner.map.get(&oldest).map(|e| e.stamp) == Some(stamp);
            if live && inner.map.remove(&oldest).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache: BoundedCache<u64> = BoundedCache::new(10, 60);
        cache.insert("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_expired_read_is_miss_and_removes() {
        let cache: BoundedCache<u64> = BoundedCache::new(10, 0);
        cache.insert("a", 1);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_evicts_oldest_insertion_not_least_read() {
        let cache: BoundedCache<u64> = BoundedCache::new(2, 60);
        cache.insert("first", 1);
        cache.insert("second", 2);
        // Reading "first" must not protect it from eviction.
        assert_eq!(cache.get("first"), Some(1));
        cache.insert("third", 3);
        assert_eq!(cache.get("first"), None);
        assert_eq!(cache.get("second"), Some(2));
        assert_eq!(cache.get("third"), Some(3));
    }

    #[test]
    fn test_overwrite_counts_as_fresh_insertion() {
        let cache: BoundedCache<u64> = BoundedCache::new(2, 60);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Overwriting "a" makes "b" the oldest insertion.
        cache.insert("a", 3);
        cache.insert("c", 4);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(3));
        assert_eq!(cache.get("c"), Some(4));
    }

    #[test]
    fn test_overwrite_does_not_grow() {
        let cache: BoundedCache<u64> = BoundedCache::new(2, 60);
        cache.insert("a", 1);
        cache.insert("a", 2);
        cache.insert("b", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_prune_removes_expired() {
        let cache: BoundedCache<u64> = BoundedCache::new(10, 0);
        cache.insert("a", 1);
        cache.insert("b", 2);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(cache.prune(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cap_to_drops_oldest() {
        let cache: BoundedCache<u64> = BoundedCache::new(10, 60);
        for i in 0..5 {
            cache.insert(&format!("k{}", i), i);
        }
        let removed = cache.cap_to(2);
        assert_eq!(removed, 3);
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.get("k4"), Some(4));
    }
}

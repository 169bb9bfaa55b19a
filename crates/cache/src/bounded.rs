use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

/// Result of a [`BoundedCache`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// Younger than the freshness threshold.
    Fresh(V),
    /// Still usable, but due for a refresh.
    Stale(V),
    Miss,
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Capacity-limited LRU map with a time-to-live and a freshness threshold.
///
/// Entries older than `ttl` are dropped on lookup. Entries older than
/// `fresh_for` are returned as [`Lookup::Stale`].
pub struct BoundedCache<K, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
    fresh_for: Duration,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration, fresh_for: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            fresh_for: fresh_for.min(ttl),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &K) -> Lookup<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Lookup<V> {
        let mut entries = self.lock();
        let Some(entry) = entries.get(key) else {
            return Lookup::Miss;
        };
        let age = now.saturating_duration_since(entry.stored_at);
        if age >= self.ttl {
            entries.pop(key);
            Lookup::Miss
        } else if age >= self.fresh_for {
            Lookup::Stale(entry.value.clone())
        } else {
            Lookup::Fresh(entry.value.clone())
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        self.lock().put(key, Entry { value, stored_at: now });
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().pop(key).map(|entry| entry.value)
    }

    /// Keep only the entries whose key satisfies `keep`. Returns how many
    /// were dropped.
    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) -> usize
    where
        K: Clone,
    {
        let mut entries = self.lock();
        let doomed: Vec<K> = entries.iter().filter(|(key, _)| !keep(key)).map(|(key, _)| key.clone()).collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> BoundedCache<&'static str, u32> {
        BoundedCache::new(NonZeroUsize::new(capacity).unwrap(), Duration::from_secs(60), Duration::from_secs(10))
    }

    #[test]
    fn ages_through_fresh_stale_and_expired() {
        let cache = cache(4);
        let start = Instant::now();
        cache.insert_at("k", 1, start);
        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(5)), Lookup::Fresh(1));
        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(30)), Lookup::Stale(1));
        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(60)), Lookup::Miss);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = cache(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Lookup::Fresh(1));
        cache.insert("c", 3);
        assert_eq!(cache.get(&"b"), Lookup::Miss);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn retains_by_key() {
        let cache = cache(8);
        for key in ["old:1", "old:2", "new:1"] {
            cache.insert(key, 0);
        }
        assert_eq!(cache.retain(|key| key.starts_with("new")), 2);
        assert_eq!(cache.get(&"new:1"), Lookup::Fresh(0));
        assert_eq!(cache.remove(&"new:1"), Some(0));
        cache.insert("x", 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}

//! LRU cache for object-stream containers
//!
//! Decoded containers are expensive to rebuild, so the object store keeps the
//! most recently used ones. An evicted container is simply decoded again the
//! next time one of its objects is needed.

use crate::parser::object_stream::ObjectStream;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Generic LRU (Least Recently Used) cache
pub struct LruCache<K: Clone + Eq + std::hash::Hash, V> {
    capacity: usize,
    map: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Clone + Eq + std::hash::Hash, V> LruCache<K, V> {
    /// Create a new LRU cache with specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Get a value from the cache
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            // Move to front (most recently used)
            self.order.retain(|k| k != key);
            self.order.push_front(key.clone());
            self.map.get(key)
        } else {
            None
        }
    }

    /// Put a value into the cache, returning the entry evicted to make room.
    /// A zero-capacity cache stores nothing.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.capacity == 0 {
            return None;
        }

        let mut evicted = None;
        if self.map.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.map.len() >= self.capacity {
            if let Some(lru_key) = self.order.pop_back() {
                evicted = self.map.remove(&lru_key).map(|v| (lru_key, v));
            }
        }

        self.map.insert(key.clone(), value);
        self.order.push_front(key);
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.order.retain(|k| k != key);
        self.map.remove(key)
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    /// Get the current number of items in the cache
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Thread-safe cache of decoded object streams, keyed by container number.
///
/// It has its own lock so container churn never blocks the main reference map.
pub struct ContainerCache {
    cache: Mutex<LruCache<u32, Arc<ObjectStream>>>,
    stats: Mutex<CacheStats>,
}

impl ContainerCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats {
                capacity,
                ..CacheStats::default()
            }),
        }
    }

    pub fn get(&self, container: u32) -> Option<Arc<ObjectStream>> {
        let found = match self.cache.lock() {
            Ok(mut cache) => cache.get(&container).cloned(),
            Err(_) => None,
        };
        if let Ok(mut stats) = self.stats.lock() {
            match found {
                Some(_) => stats.hits += 1,
                None => stats.misses += 1,
            }
        }
        found
    }

    pub fn put(&self, container: u32, stream: Arc<ObjectStream>) {
        let evicted = match self.cache.lock() {
            Ok(mut cache) => cache.put(container, stream),
            Err(_) => None,
        };
        if let Some((number, _)) = evicted {
            trace!("Evicted object stream {} from the container cache", number);
            if let Ok(mut stats) = self.stats.lock() {
                stats.evictions += 1;
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let size = self.cache.lock().map(|c| c.len()).unwrap_or(0);
        self.stats
            .lock()
            .map(|s| CacheStats { size, ..s.clone() })
            .unwrap_or_default()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Current number of cached items
    pub size: usize,
    /// Maximum capacity
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Dictionary, ObjectId};
    use crate::parser::ParseOptions;

    #[test]
    fn test_lru_cache_basic() {
        let mut cache = LruCache::new(3);

        cache.put(1, "one");
        cache.put(2, "two");
        cache.put(3, "three");

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&1), Some(&"one"));
        assert_eq!(cache.get(&2), Some(&"two"));
        assert_eq!(cache.get(&3), Some(&"three"));
    }

    #[test]
    fn test_lru_cache_eviction() {
        let mut cache = LruCache::new(3);

        cache.put(1, "one");
        cache.put(2, "two");
        cache.put(3, "three");

        // This should evict the least recently used (1)
        assert_eq!(cache.put(4, "four"), Some((1, "one")));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&4), Some(&"four"));
    }

    #[test]
    fn test_lru_cache_access_order() {
        let mut cache = LruCache::new(3);

        cache.put(1, "one");
        cache.put(2, "two");
        cache.put(3, "three");

        // Access 1, making it recently used
        assert_eq!(cache.get(&1), Some(&"one"));

        // Add 4, should evict 2 (least recently used)
        cache.put(4, "four");

        assert_eq!(cache.get(&1), Some(&"one"));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), Some(&"three"));
    }

    #[test]
    fn test_lru_cache_update_and_remove() {
        let mut cache = LruCache::new(3);

        cache.put(1, "one");
        cache.put(2, "two");
        assert_eq!(cache.put(2, "two-updated"), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&2), Some(&"two-updated"));

        assert_eq!(cache.remove(&1), Some("one"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = LruCache::new(0);
        assert_eq!(cache.put(1, "one"), None);
        assert!(cache.is_empty());
    }

    fn container(number: u32) -> Arc<ObjectStream> {
        Arc::new(ObjectStream::new(
            ObjectId::new(number, 0),
            &Dictionary::new(),
            Arc::new(Vec::new()),
            &ParseOptions::lenient(),
        ))
    }

    #[test]
    fn test_container_cache_stats() {
        let cache = ContainerCache::new(1);
        assert!(cache.get(5).is_none());

        cache.put(5, container(5));
        assert_eq!(cache.get(5).map(|c| c.id()), Some(ObjectId::new(5, 0)));

        cache.put(6, container(6));
        assert!(cache.get(5).is_none());

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 1);
    }
}

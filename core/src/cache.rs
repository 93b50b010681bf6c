//! In-process keyed cache with optional TTL.
//!
//! Layered on read paths ("current policy", reference lookups).
//! Writers invalidate synchronously before returning.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value:     V,
    cached_at: Instant,
}

pub struct KeyedCache<K, V> {
    ttl:     Option<Duration>,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K: Eq + Hash, V: Clone> KeyedCache<K, V> {
    /// `ttl = None` keeps entries until invalidated.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A disabled cache never stores anything.
    pub fn disabled() -> Self {
        Self::new(Some(Duration::ZERO))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) => self.is_expired(entry),
            None => return None,
        };
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        if self.ttl == Some(Duration::ZERO) {
            return;
        }
        self.lock().insert(
            key,
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.lock().remove(key);
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        match self.ttl {
            Some(ttl) => entry.cached_at.elapsed() >= ttl,
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        // Entries are plain values; a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_invalidate() {
        let cache: KeyedCache<&str, u32> = KeyedCache::new(None);
        cache.insert("current", 7);
        assert_eq!(cache.get(&"current"), Some(7));
        cache.invalidate(&"current");
        assert_eq!(cache.get(&"current"), None);
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache: KeyedCache<u8, u8> = KeyedCache::disabled();
        cache.insert(1, 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache: KeyedCache<u8, u8> = KeyedCache::new(Some(Duration::from_millis(1)));
        cache.insert(1, 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }
}

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::{CoreResult, read_lock_poisoned, write_lock_poisoned};

/// One cached value plus the bookkeeping the Cache Manager needs: an ETag
/// for conditional writes (spec §4.3) and the instant it goes stale.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub etag: String,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            etag: Uuid::new_v4().to_string(),
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }

    /// Replaces the value and mints a fresh ETag, resetting the TTL clock.
    /// Used on write-through after a repository write succeeds.
    pub fn refresh(&mut self, value: V, ttl: Duration) {
        self.value = value;
        self.etag = Uuid::new_v4().to_string();
        self.inserted_at = Instant::now();
        self.ttl = ttl;
    }
}

/// A single-domain cache shard: one `RwLock<HashMap<K, CacheEntry<V>>>`,
/// following the locking discipline the teacher applies to its own
/// `tenant_pools` map (`PgPoolManager`). Read-heavy lookups take a shared
/// read lock; inserts, refreshes, and purges take the exclusive write lock.
#[derive(Debug)]
pub struct TtlMap<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for TtlMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> TtlMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn get(&self, key: &K) -> CoreResult<Option<(V, String)>> {
        let guard = self.entries.read().map_err(read_lock_poisoned)?;
        match guard.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some((entry.value.clone(), entry.etag.clone()))),
            _ => Ok(None),
        }
    }

    pub fn etag(&self, key: &K) -> CoreResult<Option<String>> {
        let guard = self.entries.read().map_err(read_lock_poisoned)?;
        Ok(guard
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.etag.clone()))
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) -> CoreResult<String> {
        let mut guard = self.entries.write().map_err(write_lock_poisoned)?;
        let etag = match guard.get_mut(&key) {
            Some(existing) => {
                existing.refresh(value, ttl);
                existing.etag.clone()
            }
            None => {
                let entry = CacheEntry::new(value, ttl);
                let etag = entry.etag.clone();
                guard.insert(key, entry);
                etag
            }
        };
        Ok(etag)
    }

    pub fn invalidate(&self, key: &K) -> CoreResult<bool> {
        let mut guard = self.entries.write().map_err(write_lock_poisoned)?;
        Ok(guard.remove(key).is_some())
    }

    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) -> CoreResult<usize> {
        let mut guard = self.entries.write().map_err(write_lock_poisoned)?;
        let before = guard.len();
        guard.retain(|k, _| !predicate(k));
        Ok(before - guard.len())
    }

    /// Removes every entry idle past its TTL. Returns the count purged, for
    /// the Cleanup Worker's structured report.
    pub fn purge_expired(&self) -> CoreResult<usize> {
        Ok(self.purge_expired_keys()?.len())
    }

    /// Removes every entry idle past its TTL, returning the removed keys so
    /// a caller can cascade the removal into a dependent index (the
    /// Cleanup Worker unlinking purged sessions from the fingerprint
    /// index, spec §4.6).
    pub fn purge_expired_keys(&self) -> CoreResult<Vec<K>> {
        let mut guard = self.entries.write().map_err(write_lock_poisoned)?;
        let expired: Vec<K> = guard
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            guard.remove(key);
        }
        Ok(expired)
    }

    /// Drops every entry regardless of TTL, for whole-domain invalidation
    /// (e.g. a content delete invalidating the entire tenant's content
    /// cache, spec §4.5).
    pub fn clear(&self) -> CoreResult<()> {
        let mut guard = self.entries.write().map_err(write_lock_poisoned)?;
        guard.clear();
        Ok(())
    }

    pub fn len(&self) -> CoreResult<usize> {
        let guard = self.entries.read().map_err(read_lock_poisoned)?;
        Ok(guard.len())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn keys(&self) -> CoreResult<Vec<K>> {
        let guard = self.entries.read().map_err(read_lock_poisoned)?;
        Ok(guard.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_and_mints_etag() {
        let map: TtlMap<&str, i32> = TtlMap::default();
        let etag = map.set("a", 1, Duration::from_secs(60)).unwrap();
        let (value, got_etag) = map.get(&"a").unwrap().unwrap();
        assert_eq!(value, 1);
        assert_eq!(etag, got_etag);
    }

    #[test]
    fn expired_entries_are_invisible_to_get() {
        let map: TtlMap<&str, i32> = TtlMap::default();
        map.set("a", 1, Duration::from_millis(0)).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert!(map.get(&"a").unwrap().is_none());
    }

    #[test]
    fn purge_expired_removes_only_stale_entries() {
        let map: TtlMap<&str, i32> = TtlMap::default();
        map.set("stale", 1, Duration::from_millis(0)).unwrap();
        map.set("fresh", 2, Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let purged = map.purge_expired().unwrap();
        assert_eq!(purged, 1);
        assert_eq!(map.len().unwrap(), 1);
        assert!(map.get(&"fresh").unwrap().is_some());
    }

    #[test]
    fn refresh_mints_a_new_etag() {
        let map: TtlMap<&str, i32> = TtlMap::default();
        let first = map.set("a", 1, Duration::from_secs(60)).unwrap();
        let second = map.set("a", 2, Duration::from_secs(60)).unwrap();
        assert_ne!(first, second);
    }
}

//! Keyed transient storage
//!
//! In-memory key/value store with per-entry TTL and prefix invalidation.
//! Report results live here under their namespace, next to whatever else
//! the process chooses to keep in it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};

/// A stored value with its expiry bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Unix seconds when the entry was written
    pub stored_at: i64,
    pub ttl_seconds: u64,
}

impl<V> CacheEntry<V> {
    /// Visible until `now >= stored_at + ttl_seconds`
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.stored_at.saturating_add(self.ttl_seconds as i64)
    }

    /// Seconds left before expiry
    pub fn remaining_ttl_secs(&self, now: i64) -> u64 {
        let expires_at = self.stored_at.saturating_add(self.ttl_seconds as i64);
        expires_at.saturating_sub(now).max(0) as u64
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Concurrent TTL store. Operations are atomic per key only.
pub struct TransientStore<V> {
    entries: DashMap<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TransientStore<V> {
    /// Create a store on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store on an injected clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a live value. Expired entries are dropped on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_secs();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache hit");
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = key, "Cache miss");
        None
    }

    /// Store a value, replacing any previous entry under the key
    pub fn set(&self, key: &str, value: V, ttl_seconds: u64) {
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now_secs(),
            ttl_seconds,
        };
        debug!(key = key, ttl_secs = ttl_seconds, "Cache set");
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Whether a key is present, expired or not
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remaining TTL of a live entry
    pub fn remaining_ttl(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_secs();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.remaining_ttl_secs(now))
    }

    /// Invalidate entries matching a pattern (prefix match)
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let keys_to_remove: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(pattern))
            .map(|entry| entry.key().clone())
            .collect();

        let mut count = 0;
        for key in keys_to_remove {
            if self.entries.remove(&key).is_some() {
                count += 1;
            }
        }

        if count > 0 {
            debug!(pattern = pattern, count = count, "Invalidated cache entries");
        }
        count
    }

    /// Remove expired entries
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_secs();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let count = before.saturating_sub(self.entries.len());

        if count > 0 {
            debug!(count = count, "Cleaned up expired cache entries");
        }
        count
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for TransientStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task to periodically drop expired entries
pub fn spawn_cleanup_task<V>(store: Arc<TransientStore<V>>, interval: Duration)
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = store.cleanup();
            let stats = store.stats();
            debug!(
                removed = removed,
                entries = stats.entries,
                hit_rate = format!("{:.1}%", stats.hit_rate()),
                "Cache cleanup completed"
            );
        }
    });

    info!(interval_secs = interval.as_secs(), "Cache cleanup task started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;

    fn store_at(start: i64) -> (TransientStore<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (TransientStore::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_get_set() {
        let (store, _clock) = store_at(0);

        assert!(store.get("a").is_none());
        store.set("a", "one".to_string(), 60);
        assert_eq!(store.get("a").as_deref(), Some("one"));

        let stats = store.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[test]
    fn test_expiry_boundary() {
        let (store, clock) = store_at(1_000);
        store.set("k", "v".to_string(), 10);

        clock.advance(9);
        assert!(store.get("k").is_some());
        assert_eq!(store.remaining_ttl("k"), Some(1));

        clock.advance(1);
        assert!(store.get("k").is_none());
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let (store, clock) = store_at(0);
        store.set("k", "old".to_string(), 5);
        clock.advance(4);
        store.set("k", "new".to_string(), 5);
        clock.advance(4);
        assert_eq!(store.get("k").as_deref(), Some("new"));
    }

    #[test]
    fn test_invalidate_pattern() {
        let (store, _clock) = store_at(0);
        store.set("ns:a", "1".to_string(), 300);
        store.set("ns:b", "2".to_string(), 300);
        store.set("other:c", "3".to_string(), 300);

        assert_eq!(store.invalidate_pattern("ns:"), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains_key("other:c"));
        assert_eq!(store.invalidate_pattern("ns:"), 0);
    }

    #[test]
    fn test_cleanup_drops_expired_only() {
        let (store, clock) = store_at(0);
        store.set("short", "1".to_string(), 5);
        store.set("long", "2".to_string(), 500);
        clock.advance(10);

        assert_eq!(store.cleanup(), 1);
        assert!(store.contains_key("long"));
        assert!(!store.contains_key("short"));
    }
}

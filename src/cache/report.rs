//! Namespaced report cache

use std::sync::Arc;
use tracing::info;

use super::keys::CacheKey;
use super::store::{CacheStats, TransientStore};
use super::CacheConfig;
use crate::types::ReportValue;

/// Report results keyed by [`CacheKey`], stored under a namespace prefix in
/// a shared host store
#[derive(Clone)]
pub struct ReportCache {
    store: Arc<TransientStore<ReportValue>>,
    namespace: String,
}

impl ReportCache {
    pub fn new(store: Arc<TransientStore<ReportValue>>, config: &CacheConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
        }
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.namespace, key.as_str())
    }

    /// Cached value for a key. A stored empty list, zero, or null scalar is
    /// still a hit.
    pub fn get(&self, key: &CacheKey) -> Option<ReportValue> {
        self.store.get(&self.storage_key(key))
    }

    /// Store a value. A zero TTL stores nothing.
    pub fn put(&self, key: &CacheKey, value: ReportValue, ttl_seconds: u64) {
        if ttl_seconds == 0 {
            return;
        }
        self.store.set(&self.storage_key(key), value, ttl_seconds);
    }

    /// Drop every report entry, returning how many were removed
    pub fn clear_all(&self) -> usize {
        let removed = self.store.invalidate_pattern(&self.namespace);
        info!(removed = removed, namespace = %self.namespace, "Report cache cleared");
        removed
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Statistics of the host store
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn host_store(&self) -> &Arc<TransientStore<ReportValue>> {
        &self.store
    }
}

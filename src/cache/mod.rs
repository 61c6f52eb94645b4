//! Caching layer for report results
//!
//! Every report statement is fronted by a [`ReportCache`], a namespaced view
//! over a host [`TransientStore`]. The host store may hold unrelated keys;
//! clearing the report cache only touches keys under its namespace.
//!
//! Expiry is driven by an injectable [`Clock`] so TTL behavior can be tested
//! without sleeping.

pub mod clock;
pub mod keys;
pub mod report;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use keys::{statement_digest, CacheKey, DEV_SUFFIX};
pub use report::ReportCache;
pub use store::{spawn_cleanup_task, CacheEntry, CacheStats, TransientStore};

use std::time::Duration;

/// Namespace prefix for report entries in the host store
pub const DEFAULT_NAMESPACE: &str = "stats:";

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix applied to every report key in the host store
    pub namespace: String,
    /// Interval of the expired-entry purge task
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn with_cleanup_interval(mut self, secs: u64) -> Self {
        self.cleanup_interval = Duration::from_secs(secs.max(1));
        self
    }
}

//! Cached execution of report statements
//!
//! Every report goes through [`ReportQueryEngine::run_cached`]. Results are
//! cached raw; shaping happens afterwards, in the catalog.
//!
//! Concurrent misses on the same key each execute the statement and each
//! write the result; the last write wins. Execution is blocking, so async
//! callers run it on `spawn_blocking`.

use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheKey, ReportCache};
use crate::settings::AdminSettings;
use crate::source::{DataSourceSelector, ResolvedSource};
use crate::types::{ReportValue, Result, ResultKind};

/// One fully rendered report statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub key: CacheKey,
    pub statement: String,
    pub kind: ResultKind,
}

impl ReportQuery {
    /// Key derived from a seed and the rendered statement
    pub fn hashed(seed: &str, statement: String, kind: ResultKind) -> Self {
        Self {
            key: CacheKey::hashed(seed, &statement),
            statement,
            kind,
        }
    }

    /// Key supplied whole by the caller
    pub fn literal(key: impl Into<String>, statement: String, kind: ResultKind) -> Self {
        Self {
            key: CacheKey::literal(key),
            statement,
            kind,
        }
    }
}

/// Cache-fronted executor for report statements
pub struct ReportQueryEngine {
    selector: Arc<DataSourceSelector>,
    cache: ReportCache,
    settings: Arc<AdminSettings>,
}

impl ReportQueryEngine {
    pub fn new(
        selector: Arc<DataSourceSelector>,
        cache: ReportCache,
        settings: Arc<AdminSettings>,
    ) -> Self {
        Self {
            selector,
            cache,
            settings,
        }
    }

    /// Serve a statement from cache, or execute and cache it, against the
    /// data source resolved now.
    pub fn run_cached(&self, query: &ReportQuery, ttl_override: Option<u64>) -> Result<ReportValue> {
        self.run_cached_on(&self.selector.resolve(), query, ttl_override)
    }

    /// Serve a statement from cache, or execute and cache it, against an
    /// already resolved data source.
    ///
    /// The TTL is `ttl_override` when given, otherwise the configured cache
    /// duration read fresh on every call. A TTL of zero neither reads nor
    /// writes the cache. Execution errors propagate and nothing is cached.
    pub fn run_cached_on(
        &self,
        source: &ResolvedSource,
        query: &ReportQuery,
        ttl_override: Option<u64>,
    ) -> Result<ReportValue> {
        let ttl = ttl_override.unwrap_or_else(|| self.settings.cache_duration());

        let key = if source.dev_mode {
            query.key.for_dev_mode()
        } else {
            query.key.clone()
        };

        if ttl > 0 {
            if let Some(value) = self.cache.get(&key) {
                return Ok(value);
            }
        }

        debug!(key = %key, store = source.store.label(), kind = ?query.kind, "Executing report statement");
        let value = source.store.execute(&query.statement, query.kind)?;

        if ttl > 0 {
            self.cache.put(&key, value.clone(), ttl);
        }

        Ok(value)
    }

    /// Data source for the statements of one report call
    pub fn resolve_source(&self) -> ResolvedSource {
        self.selector.resolve()
    }

    /// Drop every cached report result
    pub fn clear_cache(&self) -> usize {
        self.cache.clear_all()
    }

    pub fn selector(&self) -> &Arc<DataSourceSelector> {
        &self.selector
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    pub fn settings(&self) -> &Arc<AdminSettings> {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, ManualClock, TransientStore};
    use crate::source::{DevConfig, DevConfigSource, ReportStore, StaticDevConfig, StoreConnector};
    use crate::types::{Row, StatsError};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ReportStore for Counting {
        fn label(&self) -> &str {
            "counting"
        }
        fn query_rows(&self, _sql: &str) -> Result<Vec<Row>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StatsError::Query("no such table".into()));
            }
            Ok(Vec::new())
        }
        fn query_scalar(&self, _sql: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(0))
        }
        fn query_column(&self, _sql: &str) -> Result<Vec<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
        fn ping(&self) -> Result<()> {
            Ok(())
        }
        fn table_exists(&self, _table: &str) -> Result<bool> {
            Ok(true)
        }
    }

    struct Refuse;

    impl StoreConnector for Refuse {
        fn connect(&self, _config: &DevConfig) -> Result<Arc<dyn ReportStore>> {
            Err(StatsError::Database("refused".into()))
        }
    }

    fn engine(store: Arc<Counting>, duration: u64) -> (ReportQueryEngine, Arc<StaticDevConfig>) {
        let dev = Arc::new(StaticDevConfig::disabled());
        let selector = Arc::new(DataSourceSelector::new(store, "", dev.clone(), Arc::new(Refuse)));
        let host = Arc::new(TransientStore::with_clock(Arc::new(ManualClock::new(0))));
        let cache = ReportCache::new(host, &CacheConfig::default());
        let settings = Arc::new(AdminSettings::new(duration, Default::default()));
        (ReportQueryEngine::new(selector, cache, settings), dev)
    }

    fn query() -> ReportQuery {
        ReportQuery::hashed("t_", "SELECT 1".to_string(), ResultKind::Rows)
    }

    #[test]
    fn test_empty_result_is_cached() {
        let store = Arc::new(Counting::default());
        let (engine, _dev) = engine(store.clone(), 60);

        assert_eq!(engine.run_cached(&query(), None).unwrap(), ReportValue::Rows(vec![]));
        assert_eq!(engine.run_cached(&query(), None).unwrap(), ReportValue::Rows(vec![]));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_override_beats_settings() {
        let store = Arc::new(Counting::default());
        let (engine, _dev) = engine(store.clone(), 0);

        engine.run_cached(&query(), None).unwrap();
        engine.run_cached(&query(), None).unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);

        engine.run_cached(&query(), Some(30)).unwrap();
        engine.run_cached(&query(), Some(30)).unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_errors_propagate_and_are_not_cached() {
        let store = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let (engine, _dev) = engine(store.clone(), 60);

        assert!(matches!(engine.run_cached(&query(), None), Err(StatsError::Query(_))));
        assert!(engine.run_cached(&query(), None).is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.cache().stats().entries, 0);
    }

    #[test]
    fn test_dev_mode_uses_separate_key() {
        let store = Arc::new(Counting::default());
        let (engine, dev) = engine(store.clone(), 60);

        engine.run_cached(&query(), None).unwrap();
        dev.set_dev_mode(true);
        engine.run_cached(&query(), None).unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.clear_cache(), 2);
    }

    struct Mirror;

    impl ReportStore for Mirror {
        fn label(&self) -> &str {
            "mirror"
        }
        fn query_rows(&self, _sql: &str) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
        fn query_scalar(&self, _sql: &str) -> Result<Value> {
            Ok(json!("mirror"))
        }
        fn query_column(&self, _sql: &str) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
        fn ping(&self) -> Result<()> {
            Ok(())
        }
        fn table_exists(&self, _table: &str) -> Result<bool> {
            Ok(true)
        }
    }

    struct AttachMirror;

    impl StoreConnector for AttachMirror {
        fn connect(&self, _config: &DevConfig) -> Result<Arc<dyn ReportStore>> {
            Ok(Arc::new(Mirror))
        }
    }

    /// Dev mode toggles on every read, off first
    #[derive(Default)]
    struct Flipping {
        loads: AtomicUsize,
    }

    impl DevConfigSource for Flipping {
        fn load(&self) -> Option<DevConfig> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            Some(DevConfig {
                dev_mode: n % 2 == 1,
                ..DevConfig::default()
            })
        }
    }

    #[test]
    fn test_mode_read_once_per_call() {
        let dev = Arc::new(Flipping::default());
        let selector = Arc::new(DataSourceSelector::new(
            Arc::new(Counting::default()),
            "",
            dev.clone(),
            Arc::new(AttachMirror),
        ));
        let host = Arc::new(TransientStore::with_clock(Arc::new(ManualClock::new(0))));
        let cache = ReportCache::new(host, &CacheConfig::default());
        let settings = Arc::new(AdminSettings::new(60, Default::default()));
        let engine = ReportQueryEngine::new(selector, cache, settings);

        let scalar = ReportQuery::literal("k", "SELECT 1".to_string(), ResultKind::Scalar);
        assert_eq!(engine.run_cached(&scalar, None).unwrap(), ReportValue::Scalar(json!(0)));
        assert_eq!(
            engine.run_cached(&scalar, None).unwrap(),
            ReportValue::Scalar(json!("mirror"))
        );
        assert_eq!(dev.loads.load(Ordering::SeqCst), 2);

        let prod = CacheKey::literal("k");
        assert_eq!(engine.cache().get(&prod), Some(ReportValue::Scalar(json!(0))));
        assert_eq!(
            engine.cache().get(&prod.for_dev_mode()),
            Some(ReportValue::Scalar(json!("mirror")))
        );

        // back in production mode the primary result is served from cache
        assert_eq!(engine.run_cached(&scalar, None).unwrap(), ReportValue::Scalar(json!(0)));
    }
}

//! Data sources for report queries
//!
//! Reports run against one of two stores:
//!
//! - the **primary** store, always available
//! - the **mirror** store, used while the developer config enables dev
//!   mode. It is connected lazily on first use and kept for the life of the
//!   process. If connecting fails, the primary store takes its place for good.
//!
//! Callers never see which one they got, and never see connection errors.

pub mod dev_config;
pub mod schema;
pub mod sqlite;

pub use dev_config::{DevConfig, DevConfigSource, FileDevConfig, StaticDevConfig};
pub use sqlite::{SqliteConnector, SqliteStore};

use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::types::{ReportValue, Result, ResultKind, Row};

/// A store report statements can run against
pub trait ReportStore: Send + Sync {
    /// Short name for logs
    fn label(&self) -> &str;

    /// Every row as a column-name map
    fn query_rows(&self, sql: &str) -> Result<Vec<Row>>;

    /// First column of the first row, `Null` when there are no rows
    fn query_scalar(&self, sql: &str) -> Result<Value>;

    /// First column of every row
    fn query_column(&self, sql: &str) -> Result<Vec<Value>>;

    /// Cheap liveness check
    fn ping(&self) -> Result<()>;

    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Run a statement, collecting the result by kind
    fn execute(&self, sql: &str, kind: ResultKind) -> Result<ReportValue> {
        Ok(match kind {
            ResultKind::Rows => ReportValue::Rows(self.query_rows(sql)?),
            ResultKind::Scalar => ReportValue::Scalar(self.query_scalar(sql)?),
            ResultKind::Column => ReportValue::Column(self.query_column(sql)?),
        })
    }
}

/// Creates the mirror store from developer config
pub trait StoreConnector: Send + Sync {
    fn connect(&self, config: &DevConfig) -> Result<Arc<dyn ReportStore>>;
}

/// The data source one report call runs against. Statement rendering,
/// cache key and execution all come from the same snapshot.
#[derive(Clone)]
pub struct ResolvedSource {
    pub store: Arc<dyn ReportStore>,
    pub prefix: String,
    pub dev_mode: bool,
}

/// Picks the store for each report call
pub struct DataSourceSelector {
    primary: Arc<dyn ReportStore>,
    primary_prefix: String,
    dev_config: Arc<dyn DevConfigSource>,
    connector: Arc<dyn StoreConnector>,
    mirror: OnceLock<Arc<dyn ReportStore>>,
}

impl DataSourceSelector {
    pub fn new(
        primary: Arc<dyn ReportStore>,
        primary_prefix: impl Into<String>,
        dev_config: Arc<dyn DevConfigSource>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        Self {
            primary,
            primary_prefix: primary_prefix.into(),
            dev_config,
            connector,
            mirror: OnceLock::new(),
        }
    }

    /// True iff a developer config exists and turns dev mode on.
    /// Re-read on every call.
    pub fn is_dev_mode_enabled(&self) -> bool {
        self.dev_config
            .load()
            .map(|config| config.dev_mode)
            .unwrap_or(false)
    }

    /// Store for the current call
    pub fn connection(&self) -> Arc<dyn ReportStore> {
        self.resolve().store
    }

    /// Table prefix for the current call
    pub fn table_prefix(&self) -> String {
        self.resolve().prefix
    }

    /// Store, prefix and mode from a single read of the developer config
    pub fn resolve(&self) -> ResolvedSource {
        match self.dev_config.load() {
            Some(config) if config.dev_mode => ResolvedSource {
                store: self.mirror(&config),
                prefix: config
                    .prefix()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.primary_prefix.clone()),
                dev_mode: true,
            },
            _ => ResolvedSource {
                store: self.primary.clone(),
                prefix: self.primary_prefix.clone(),
                dev_mode: false,
            },
        }
    }

    /// The primary store, regardless of mode
    pub fn primary(&self) -> &Arc<dyn ReportStore> {
        &self.primary
    }

    pub fn primary_prefix(&self) -> &str {
        &self.primary_prefix
    }

    /// Whether the mirror slot has been filled, by a real mirror or by the
    /// primary fallback
    pub fn mirror_established(&self) -> bool {
        self.mirror.get().is_some()
    }

    fn mirror(&self, config: &DevConfig) -> Arc<dyn ReportStore> {
        self.mirror
            .get_or_init(|| match self.connector.connect(config) {
                Ok(store) => {
                    info!(store = store.label(), ?config, "Connected to mirror store");
                    store
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Failed to connect to mirror store, falling back to primary store"
                    );
                    self.primary.clone()
                }
            })
            .clone()
    }
}

//! Health check endpoint
//!
//! Open to unauthenticated callers. Always probes the primary store, even
//! while dev mode routes reports to the mirror.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::json_response;
use crate::source::ReportStore;

#[derive(Debug, Serialize, PartialEq)]
pub struct HealthResponse {
    pub success: bool,
    pub plugin: &'static str,
    pub version: &'static str,
    /// `connected` or `disconnected`
    pub database: &'static str,
    /// Whether the shop's order table is installed
    pub edd_active: bool,
    pub tables_exist: TablesExist,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct TablesExist {
    pub edd_customers: bool,
    pub edd_orders: bool,
    pub edd_subscriptions: bool,
}

impl TablesExist {
    pub fn all(&self) -> bool {
        self.edd_customers && self.edd_orders && self.edd_subscriptions
    }
}

/// Check a store. Errors count as missing tables.
pub fn build_health_response(store: &dyn ReportStore, prefix: &str) -> HealthResponse {
    let connected = match store.ping() {
        Ok(()) => true,
        Err(e) => {
            warn!(store = store.label(), "Health ping failed: {}", e);
            false
        }
    };

    let exists = |table: &str| {
        connected
            && store
                .table_exists(&format!("{}{}", prefix, table))
                .unwrap_or(false)
    };

    let tables_exist = TablesExist {
        edd_customers: exists("edd_customers"),
        edd_orders: exists("edd_orders"),
        edd_subscriptions: exists("edd_subscriptions"),
    };

    let edd_active = tables_exist.edd_orders;
    HealthResponse {
        success: connected && edd_active && tables_exist.all(),
        plugin: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        database: if connected { "connected" } else { "disconnected" },
        edd_active,
        tables_exist,
    }
}

/// Handle GET /health
pub async fn health_check(store: Arc<dyn ReportStore>, prefix: String) -> Response<Full<Bytes>> {
    let outcome = tokio::task::spawn_blocking(move || build_health_response(store.as_ref(), &prefix)).await;

    match outcome {
        Ok(health) => json_response(StatusCode::OK, &health),
        Err(e) => {
            warn!("Health check task failed: {}", e);
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &HealthResponse {
                    success: false,
                    plugin: env!("CARGO_PKG_NAME"),
                    version: env!("CARGO_PKG_VERSION"),
                    database: "disconnected",
                    edd_active: false,
                    tables_exist: TablesExist::default(),
                },
            )
        }
    }
}

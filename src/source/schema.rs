//! Store schema
//!
//! Reports only read. These tables mirror the shop schema the reports are
//! written against and are created for fixtures and local development.
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text.

use rusqlite::Connection;
use tracing::info;

use crate::types::{Result, StatsError};

/// Core shop tables: customers, orders and their line items, subscriptions, posts
const CORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS {p}edd_customers (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    date_created TEXT
);
CREATE INDEX IF NOT EXISTS {p}idx_customers_created ON {p}edd_customers(date_created);

CREATE TABLE IF NOT EXISTS {p}edd_orders (
    id INTEGER PRIMARY KEY,
    parent INTEGER NOT NULL DEFAULT 0,
    customer_id INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    type TEXT NOT NULL DEFAULT 'sale',
    total REAL NOT NULL DEFAULT 0,
    gateway TEXT NOT NULL DEFAULT '',
    date_created TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS {p}idx_orders_customer ON {p}edd_orders(customer_id);
CREATE INDEX IF NOT EXISTS {p}idx_orders_created ON {p}edd_orders(date_created);

CREATE TABLE IF NOT EXISTS {p}edd_order_items (
    id INTEGER PRIMARY KEY,
    order_id INTEGER NOT NULL,
    product_id INTEGER NOT NULL DEFAULT 0,
    quantity INTEGER NOT NULL DEFAULT 1,
    total REAL NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS {p}idx_order_items_order ON {p}edd_order_items(order_id);
CREATE INDEX IF NOT EXISTS {p}idx_order_items_product ON {p}edd_order_items(product_id);

CREATE TABLE IF NOT EXISTS {p}edd_subscriptions (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER NOT NULL DEFAULT 0,
    parent_payment_id INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    initial_amount REAL NOT NULL DEFAULT 0,
    recurring_amount REAL NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    expiration TEXT
);
CREATE INDEX IF NOT EXISTS {p}idx_subscriptions_customer ON {p}edd_subscriptions(customer_id);

CREATE TABLE IF NOT EXISTS {p}posts (
    ID INTEGER PRIMARY KEY,
    post_title TEXT NOT NULL DEFAULT '',
    post_type TEXT NOT NULL DEFAULT 'download'
);
"#;

/// Software licensing add-on tables
const LICENSING_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS {p}edd_licenses (
    id INTEGER PRIMARY KEY,
    license_key TEXT NOT NULL,
    download_id INTEGER NOT NULL DEFAULT 0,
    customer_id INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS {p}edd_license_activations (
    site_id INTEGER PRIMARY KEY,
    license_id INTEGER NOT NULL,
    site_name TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS {p}idx_activations_license ON {p}edd_license_activations(license_id);
"#;

fn render(template: &str, prefix: &str) -> Result<String> {
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StatsError::Config(format!(
            "table prefix may only contain letters, digits and underscores: {:?}",
            prefix
        )));
    }
    Ok(template.replace("{p}", prefix))
}

/// Create the core shop tables under a prefix
pub fn create_store_tables(conn: &Connection, prefix: &str) -> Result<()> {
    conn.execute_batch(&render(CORE_SCHEMA, prefix)?)
        .map_err(|e| StatsError::Database(format!("Failed to create store tables: {}", e)))?;
    info!(prefix = prefix, "Store tables ready");
    Ok(())
}

/// Create the licensing tables under a prefix
pub fn create_licensing_tables(conn: &Connection, prefix: &str) -> Result<()> {
    conn.execute_batch(&render(LICENSING_SCHEMA, prefix)?)
        .map_err(|e| StatsError::Database(format!("Failed to create licensing tables: {}", e)))?;
    info!(prefix = prefix, "Licensing tables ready");
    Ok(())
}

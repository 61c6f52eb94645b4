//! tally - cached sales and subscription analytics for a shop database
//!
//! Reports are parameterized SQL statements over the shop's customer,
//! order and subscription tables. Every statement goes through a
//! read-through cache keyed by its fingerprint, and through a data source
//! selector that can swap the production store for a developer mirror.
//!
//! ## Modules
//!
//! - **source**: primary and mirror stores, dev-mode selection
//! - **cache**: TTL store and the report cache on top of it
//! - **engine**: cache-fronted statement execution
//! - **reports**: the report catalog and result shaping
//! - **routes** / **server**: the JSON HTTP API

pub mod auth;
pub mod cache;
pub mod config;
pub mod engine;
pub mod reports;
pub mod routes;
pub mod server;
pub mod settings;
pub mod source;
pub mod types;

pub use config::Args;
pub use engine::ReportQueryEngine;
pub use server::{run, AppState};
pub use types::{Result, StatsError};

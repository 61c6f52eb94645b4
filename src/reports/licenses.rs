//! Software licensing reports

use serde_json::Value;

use super::ReportQuery;
use crate::types::{ReportValue, ResultKind};

/// Names of every table in the store
pub fn store_tables() -> ReportQuery {
    ReportQuery::literal(
        "store_tables",
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name".to_string(),
        ResultKind::Column,
    )
}

pub fn shape_table_names(value: ReportValue) -> Vec<String> {
    value
        .into_column()
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

/// Whether the licensing add-on tables are installed under a prefix
pub fn has_licensing_tables(tables: &[String], prefix: &str) -> bool {
    let licenses = format!("{}edd_licenses", prefix);
    tables.iter().any(|t| *t == licenses)
}

/// Licenses with the most site activations
pub fn top_licenses(prefix: &str, limit: u64) -> ReportQuery {
    let statement = format!(
        "SELECT l.id AS license_id, l.license_key, \
           COUNT(la.site_name) AS activation_count, \
           d.post_title AS download_name \
         FROM {p}edd_licenses l \
         LEFT JOIN {p}edd_license_activations la ON l.id = la.license_id \
         LEFT JOIN {p}posts d ON l.download_id = d.ID \
         WHERE l.status != 'disabled' \
         GROUP BY l.id \
         ORDER BY activation_count DESC \
         LIMIT {limit}",
        p = prefix,
        limit = limit,
    );
    ReportQuery::literal(format!("top_licenses_{}", limit), statement, ResultKind::Rows)
}

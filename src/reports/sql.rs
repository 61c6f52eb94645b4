//! SQLite fragments shared by report statements
//!
//! Timestamps in the store are `YYYY-MM-DD HH:MM:SS` text, so string
//! comparison against `YYYY-MM-DD` literals orders correctly.

/// Order statuses that count as paid
pub const PAID_STATUSES: &str = "('complete', 'edd_subscription')";

/// `YYYY-MM-01` of a timestamp expression
pub fn month_start(expr: &str) -> String {
    format!("strftime('%Y-%m-01', {})", expr)
}

/// English month name of a timestamp expression
pub fn month_name(expr: &str) -> String {
    format!(
        "CASE strftime('%m', {e}) \
         WHEN '01' THEN 'January' WHEN '02' THEN 'February' WHEN '03' THEN 'March' \
         WHEN '04' THEN 'April' WHEN '05' THEN 'May' WHEN '06' THEN 'June' \
         WHEN '07' THEN 'July' WHEN '08' THEN 'August' WHEN '09' THEN 'September' \
         WHEN '10' THEN 'October' WHEN '11' THEN 'November' WHEN '12' THEN 'December' \
         END",
        e = expr
    )
}

/// `January 2024` style label of a timestamp expression
pub fn month_label(expr: &str) -> String {
    format!("{} || ' ' || strftime('%Y', {})", month_name(expr), expr)
}

/// Whole days from one timestamp expression to another
pub fn days_between(from: &str, to: &str) -> String {
    format!(
        "CAST(julianday(date({})) - julianday(date({})) AS INTEGER)",
        to, from
    )
}

/// Whole days between a timestamp expression and today
pub fn days_since(expr: &str) -> String {
    days_between(expr, "'now'")
}

/// Whole calendar months between a timestamp expression and now
pub fn months_since(expr: &str) -> String {
    format!(
        "((CAST(strftime('%Y', 'now') AS INTEGER) - CAST(strftime('%Y', {e}) AS INTEGER)) * 12 \
          + CAST(strftime('%m', 'now') AS INTEGER) - CAST(strftime('%m', {e}) AS INTEGER) \
          - (CASE WHEN strftime('%d %H:%M:%S', 'now') < strftime('%d %H:%M:%S', {e}) THEN 1 ELSE 0 END))",
        e = expr
    )
}

/// Quote a string literal
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Paid total of an order alias, zero for unpaid orders
pub fn paid_total(alias: &str) -> String {
    format!(
        "CASE WHEN {a}.status IN {s} THEN {a}.total ELSE 0 END",
        a = alias,
        s = PAID_STATUSES
    )
}

/// Percentage change from `previous` to `current`, rounded to two places.
/// Zero when there is no positive baseline.
pub fn change_percentage(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        round2((current - previous) / previous * 100.0)
    } else {
        0.0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation, `None` for an empty slice
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

//! Revenue forecast and seasonality
//!
//! Both reports cache the monthly revenue history and derive their
//! statistics from it after the cache, so SQLite needs no window or
//! standard deviation functions.

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use super::sql::{mean, month_start, round2, std_dev, PAID_STATUSES};
use super::ReportQuery;
use crate::types::value::{row_f64, row_i64};
use crate::types::{ReportValue, ResultKind};

/// Longest supported forecast horizon, in months
pub const MAX_FORECAST_MONTHS: u64 = 6;

/// Paid revenue per month over the last twelve months
pub fn revenue_forecast(prefix: &str, months: u64) -> ReportQuery {
    let statement = format!(
        "SELECT {month} AS month, SUM(o.total) AS monthly_revenue \
         FROM {p}edd_orders o \
         WHERE o.status IN {statuses} \
           AND o.date_created >= date('now', '-12 months') \
         GROUP BY strftime('%Y-%m', o.date_created) \
         ORDER BY month",
        month = month_start("o.date_created"),
        p = prefix,
        statuses = PAID_STATUSES,
    );
    ReportQuery::literal(format!("revenue_forecast_{}", months), statement, ResultKind::Rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastMonth {
    pub forecast_date: String,
    pub forecast_label: String,
    pub projected_revenue: f64,
    pub conservative_estimate: f64,
    pub optimistic_estimate: f64,
    pub growth_rate: f64,
    pub confidence_level: &'static str,
}

fn confidence(data_points: usize) -> &'static str {
    match data_points {
        n if n >= 12 => "High",
        n if n >= 6 => "Medium",
        _ => "Low",
    }
}

/// Project the average month forward by the average month-over-month
/// growth, with a one standard deviation band either side. No history
/// means no forecast.
pub fn shape_revenue_forecast(value: ReportValue, months: u64, today: NaiveDate) -> Vec<ForecastMonth> {
    let revenues: Vec<f64> = value
        .into_rows()
        .iter()
        .map(|row| row_f64(row, "monthly_revenue"))
        .collect();

    let Some(avg_revenue) = mean(&revenues) else {
        return Vec::new();
    };

    let growth_rates: Vec<f64> = revenues
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| 100.0 * (pair[1] - pair[0]) / pair[0])
        .collect();
    let avg_growth = mean(&growth_rates).unwrap_or(0.0);
    let spread = std_dev(&growth_rates).unwrap_or(0.0);
    let level = confidence(revenues.len());

    let month_start = today.with_day(1).unwrap_or(today);
    (1..=months.min(MAX_FORECAST_MONTHS))
        .filter_map(|n| month_start.checked_add_months(Months::new(n as u32)))
        .map(|date| ForecastMonth {
            forecast_date: date.format("%Y-%m-%d").to_string(),
            forecast_label: date.format("%B %Y").to_string(),
            projected_revenue: round2(avg_revenue * (1.0 + avg_growth / 100.0)),
            conservative_estimate: round2(avg_revenue * (1.0 + (avg_growth - spread) / 100.0)),
            optimistic_estimate: round2(avg_revenue * (1.0 + (avg_growth + spread) / 100.0)),
            growth_rate: round2(avg_growth),
            confidence_level: level,
        })
        .collect()
}

/// Paid revenue, orders and customers per calendar month over two years
pub fn seasonal_patterns(prefix: &str) -> ReportQuery {
    let statement = format!(
        "SELECT CAST(strftime('%m', o.date_created) AS INTEGER) AS month_number, \
           CAST(strftime('%Y', o.date_created) AS INTEGER) AS year, \
           SUM(o.total) AS monthly_revenue, \
           COUNT(DISTINCT o.id) AS order_count, \
           COUNT(DISTINCT o.customer_id) AS customer_count \
         FROM {p}edd_orders o \
         WHERE o.status IN {statuses} \
           AND o.date_created >= date('now', '-2 years') \
         GROUP BY strftime('%Y-%m', o.date_created) \
         ORDER BY year, month_number",
        p = prefix,
        statuses = PAID_STATUSES,
    );
    ReportQuery::literal("seasonal_patterns", statement, ResultKind::Rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalMonth {
    pub month_number: u32,
    pub month_name: &'static str,
    pub avg_revenue: f64,
    pub avg_orders: i64,
    pub avg_customers: i64,
    pub revenue_volatility: f64,
    pub deviation_from_average: Option<f64>,
    pub seasonality_classification: &'static str,
}

fn month_name(number: u32) -> &'static str {
    u8::try_from(number)
        .ok()
        .and_then(|n| chrono::Month::try_from(n).ok())
        .map(|m| m.name())
        .unwrap_or("")
}

fn classify(avg: f64, overall: f64) -> &'static str {
    if avg >= overall * 1.2 {
        "Peak Season"
    } else if avg >= overall * 1.1 {
        "High Season"
    } else if avg >= overall * 0.9 {
        "Normal Season"
    } else if avg >= overall * 0.8 {
        "Low Season"
    } else {
        "Off Season"
    }
}

/// Average each calendar month across years and rate it against the
/// average of all months
pub fn shape_seasonal_patterns(value: ReportValue) -> Vec<SeasonalMonth> {
    let rows = value.into_rows();
    let all: Vec<f64> = rows.iter().map(|row| row_f64(row, "monthly_revenue")).collect();
    let Some(overall) = mean(&all) else {
        return Vec::new();
    };

    let mut by_month: BTreeMap<u32, Vec<(f64, f64, f64)>> = BTreeMap::new();
    for row in &rows {
        let month = row_i64(row, "month_number").clamp(0, 12) as u32;
        by_month.entry(month).or_default().push((
            row_f64(row, "monthly_revenue"),
            row_f64(row, "order_count"),
            row_f64(row, "customer_count"),
        ));
    }

    by_month
        .into_iter()
        .map(|(month, samples)| {
            let revenue: Vec<f64> = samples.iter().map(|s| s.0).collect();
            let orders: Vec<f64> = samples.iter().map(|s| s.1).collect();
            let customers: Vec<f64> = samples.iter().map(|s| s.2).collect();
            let avg = mean(&revenue).unwrap_or(0.0);

            SeasonalMonth {
                month_number: month,
                month_name: month_name(month),
                avg_revenue: round2(avg),
                avg_orders: mean(&orders).unwrap_or(0.0).round() as i64,
                avg_customers: mean(&customers).unwrap_or(0.0).round() as i64,
                revenue_volatility: round2(std_dev(&revenue).unwrap_or(0.0)),
                deviation_from_average: (overall != 0.0)
                    .then(|| round2(100.0 * (avg - overall) / overall)),
                seasonality_classification: classify(avg, overall),
            }
        })
        .collect()
}

//! Recurring revenue and renewal reports

use serde::Serialize;

use super::sql::{month_label, month_start, PAID_STATUSES};
use super::{DateRange, ReportQuery};
use crate::types::value::{as_f64, row_f64, row_i64};
use crate::types::{ReportValue, ResultKind};

/// MRR contributed by subscriptions created each month, excluding
/// subscriptions whose parent payment was refunded
pub fn mrr_by_month(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, \
           COUNT(DISTINCT s.id) AS subscriptions, \
           ROUND(SUM(s.initial_amount / 12.0), 2) AS mrr \
         FROM {p}edd_subscriptions s \
         WHERE s.status != 'pending'{filter} \
           AND NOT EXISTS ( \
             SELECT 1 FROM {p}edd_orders o \
             WHERE (o.parent = s.parent_payment_id OR o.id = s.parent_payment_id) \
               AND o.status = 'refunded' \
           ) \
         GROUP BY strftime('%Y-%m', s.created) \
         ORDER BY date",
        date = month_start("s.created"),
        label = month_label("s.created"),
        p = prefix,
        filter = range.filter("s.created"),
    );
    ReportQuery::hashed("mrr_by_month_", statement, ResultKind::Rows)
}

/// MRR from subscriptions started this month
pub fn new_mrr_current(prefix: &str) -> ReportQuery {
    let statement = format!(
        "SELECT COALESCE(ROUND(SUM(initial_amount / 12.0), 2), 0) AS new_mrr \
         FROM {p}edd_subscriptions \
         WHERE strftime('%Y-%m', created) = strftime('%Y-%m', 'now') \
           AND status != 'pending'",
        p = prefix,
    );
    ReportQuery::literal("new_mrr_current", statement, ResultKind::Scalar)
}

/// MRR lost to subscriptions cancelled or expired this month
pub fn churned_mrr_current(prefix: &str) -> ReportQuery {
    let statement = format!(
        "SELECT COALESCE(ROUND(SUM(initial_amount / 12.0), 2), 0) AS churned_mrr \
         FROM {p}edd_subscriptions \
         WHERE strftime('%Y-%m', expiration) = strftime('%Y-%m', 'now') \
           AND status IN ('cancelled', 'expired')",
        p = prefix,
    );
    ReportQuery::literal("churned_mrr_current", statement, ResultKind::Scalar)
}

/// MRR from active subscriptions started before this month
pub fn existing_mrr_current(prefix: &str) -> ReportQuery {
    let statement = format!(
        "SELECT COALESCE(ROUND(SUM(initial_amount / 12.0), 2), 0) AS existing_mrr \
         FROM {p}edd_subscriptions \
         WHERE strftime('%Y-%m', created) < strftime('%Y-%m', 'now') \
           AND status = 'active'",
        p = prefix,
    );
    ReportQuery::literal("existing_mrr_current", statement, ResultKind::Scalar)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MrrBreakdown {
    pub new_mrr: f64,
    pub existing_mrr: f64,
    pub churned_mrr: f64,
    pub net_mrr: f64,
}

pub fn shape_mrr_breakdown(new: ReportValue, existing: ReportValue, churned: ReportValue) -> MrrBreakdown {
    let new_mrr = as_f64(&new.into_scalar());
    let existing_mrr = as_f64(&existing.into_scalar());
    let churned_mrr = as_f64(&churned.into_scalar());
    MrrBreakdown {
        new_mrr,
        existing_mrr,
        churned_mrr,
        net_mrr: new_mrr + existing_mrr - churned_mrr,
    }
}

/// Share of each monthly signup cohort that renewed in the 12th month
/// after signup. Cohorts younger than a year are left out.
pub fn renewal_rates_by_month(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, \
           ROUND(100.0 * COUNT(DISTINCT CASE \
             WHEN o.status IN {statuses} \
               AND o.type = 'renewal' \
               AND o.date_created >= datetime(c.date_created, '+1 year') \
               AND o.date_created <= datetime(c.date_created, '+13 months') \
             THEN o.customer_id END) / NULLIF(COUNT(DISTINCT c.id), 0), 2) AS renewal_rate \
         FROM {p}edd_customers c \
         LEFT JOIN {p}edd_orders o ON c.id = o.customer_id \
         WHERE c.date_created >= '2017-01-01' \
           AND c.date_created <= date('now', '-1 year'){filter} \
         GROUP BY strftime('%Y-%m', c.date_created) \
         ORDER BY date",
        date = month_start("c.date_created"),
        label = month_label("c.date_created"),
        statuses = PAID_STATUSES,
        p = prefix,
        filter = range.filter_through_end_of_day("c.date_created"),
    );
    ReportQuery::hashed("renewal_rates_", statement, ResultKind::Rows)
}

/// Active subscriptions expiring within the next `days` days
pub fn upcoming_renewals(prefix: &str, days: u64) -> ReportQuery {
    let statement = format!(
        "SELECT COUNT(DISTINCT id) AS count, \
           ROUND(SUM(recurring_amount), 2) AS estimated_revenue \
         FROM {p}edd_subscriptions \
         WHERE status = 'active' \
           AND expiration >= date('now') \
           AND expiration <= date('now', '+{days} days')",
        p = prefix,
        days = days,
    );
    ReportQuery::literal(format!("upcoming_renewals_{}", days), statement, ResultKind::Rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct UpcomingRenewals {
    pub count: i64,
    pub estimated_revenue: f64,
}

pub fn shape_upcoming_renewals(value: ReportValue) -> UpcomingRenewals {
    value
        .first_row()
        .map(|row| UpcomingRenewals {
            count: row_i64(&row, "count"),
            estimated_revenue: row_f64(&row, "estimated_revenue"),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_mrr_breakdown_net() {
        let shaped = shape_mrr_breakdown(
            ReportValue::Scalar(json!(100.5)),
            ReportValue::Scalar(json!("400")),
            ReportValue::Scalar(json!(50)),
        );
        assert_eq!(shaped.new_mrr, 100.5);
        assert_eq!(shaped.existing_mrr, 400.0);
        assert_eq!(shaped.net_mrr, 450.5);
    }

    #[test]
    fn test_upcoming_zero_record() {
        let shaped = shape_upcoming_renewals(ReportValue::Rows(vec![]));
        assert_eq!(
            serde_json::to_value(shaped).unwrap(),
            json!({"count": 0, "estimated_revenue": 0.0})
        );
    }

    #[test]
    fn test_upcoming_key_per_window() {
        assert_eq!(upcoming_renewals("wp_", 30).key.as_str(), "upcoming_renewals_30");
        assert!(upcoming_renewals("wp_", 7).statement.contains("'+7 days'"));
    }

    #[test]
    fn test_renewal_end_date_covers_whole_day() {
        let range = DateRange::new(None, NaiveDate::from_ymd_opt(2023, 6, 30));
        let query = renewal_rates_by_month("wp_", &range);
        assert!(query.statement.contains("c.date_created <= '2023-06-30 23:59:59'"));
    }
}

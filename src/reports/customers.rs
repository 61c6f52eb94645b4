//! Customer acquisition and lifetime value reports

use serde::Serialize;

use super::sql::{
    change_percentage, days_between, days_since, month_label, month_start, paid_total, PAID_STATUSES,
};
use super::{DateRange, ReportQuery};
use crate::types::value::{row_f64, row_i64};
use crate::types::{ReportValue, ResultKind};

/// New customers per signup month
pub fn new_customers_by_month(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, COUNT(*) AS value \
         FROM {p}edd_customers \
         WHERE date_created IS NOT NULL{filter} \
         GROUP BY strftime('%Y-%m', date_created) \
         ORDER BY date",
        date = month_start("date_created"),
        label = month_label("date_created"),
        p = prefix,
        filter = range.filter("date_created"),
    );
    ReportQuery::hashed("customers_by_month_", statement, ResultKind::Rows)
}

/// Signups this calendar year against last year
pub fn new_customers_yoy(prefix: &str) -> ReportQuery {
    let statement = format!(
        "SELECT \
           SUM(CASE WHEN strftime('%Y', date_created) = strftime('%Y', 'now') THEN 1 ELSE 0 END) AS current_year, \
           SUM(CASE WHEN CAST(strftime('%Y', date_created) AS INTEGER) = CAST(strftime('%Y', 'now') AS INTEGER) - 1 THEN 1 ELSE 0 END) AS last_year \
         FROM {p}edd_customers \
         WHERE CAST(strftime('%Y', date_created) AS INTEGER) \
           IN (CAST(strftime('%Y', 'now') AS INTEGER), CAST(strftime('%Y', 'now') AS INTEGER) - 1)",
        p = prefix,
    );
    ReportQuery::literal("customers_yoy", statement, ResultKind::Rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YoyChange {
    pub current_year: i64,
    pub last_year: i64,
    pub change: f64,
}

pub fn shape_yoy(value: ReportValue) -> YoyChange {
    match value.first_row() {
        Some(row) => {
            let current_year = row_i64(&row, "current_year");
            let last_year = row_i64(&row, "last_year");
            YoyChange {
                current_year,
                last_year,
                change: change_percentage(current_year as f64, last_year as f64),
            }
        }
        None => YoyChange {
            current_year: 0,
            last_year: 0,
            change: 0.0,
        },
    }
}

/// Top customers by paid total
pub fn customer_lifetime_values(prefix: &str, range: &DateRange, limit: u64) -> ReportQuery {
    let statement = format!(
        "SELECT c.id AS customer_id, c.email, c.name, c.date_created AS signup_date, \
           COUNT(DISTINCT o.id) AS purchase_count, \
           ROUND(SUM({paid}), 2) AS total_spent, \
           ROUND(AVG(CASE WHEN o.status IN {statuses} THEN o.total ELSE NULL END), 2) AS avg_order_value, \
           {days} AS days_active, \
           MAX(o.date_created) AS last_purchase_date \
         FROM {p}edd_customers c \
         LEFT JOIN {p}edd_orders o ON c.id = o.customer_id \
         WHERE c.date_created IS NOT NULL{filter} \
         GROUP BY c.id \
         HAVING COUNT(DISTINCT o.id) > 0 \
         ORDER BY total_spent DESC \
         LIMIT {limit}",
        paid = paid_total("o"),
        statuses = PAID_STATUSES,
        days = days_since("c.date_created"),
        p = prefix,
        filter = range.filter("c.date_created"),
        limit = limit,
    );
    ReportQuery::hashed("customer_clv_", statement, ResultKind::Rows)
}

/// Average lifetime value per monthly signup cohort
pub fn clv_by_cohort(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS cohort_date, {label} AS cohort_label, \
           COUNT(DISTINCT c.id) AS customer_count, \
           ROUND(AVG(t.total_spent), 2) AS avg_clv, \
           ROUND(AVG(t.purchase_count), 2) AS avg_purchases, \
           CAST(ROUND(AVG(t.days_active), 0) AS INTEGER) AS avg_days_active \
         FROM {p}edd_customers c \
         INNER JOIN ( \
           SELECT c2.id, SUM({paid}) AS total_spent, \
             COUNT(DISTINCT o.id) AS purchase_count, \
             {days} AS days_active \
           FROM {p}edd_customers c2 \
           LEFT JOIN {p}edd_orders o ON c2.id = o.customer_id \
           GROUP BY c2.id \
         ) AS t ON c.id = t.id \
         WHERE c.date_created IS NOT NULL{filter} \
         GROUP BY strftime('%Y-%m', c.date_created) \
         ORDER BY cohort_date",
        date = month_start("c.date_created"),
        label = month_label("c.date_created"),
        paid = paid_total("o"),
        days = days_since("c2.date_created"),
        p = prefix,
        filter = range.filter("c.date_created"),
    );
    ReportQuery::hashed("clv_by_cohort_", statement, ResultKind::Rows)
}

/// Signup to purchase to repeat purchase to subscription
pub fn activation_funnel(prefix: &str, range: &DateRange) -> ReportQuery {
    let purchased = "COUNT(DISTINCT CASE WHEN o.id IS NOT NULL THEN c.id END)";
    let repeated = "COUNT(DISTINCT CASE WHEN pc.purchase_count >= 2 THEN c.id END)";
    let subscribed = "COUNT(DISTINCT CASE WHEN s.id IS NOT NULL THEN c.id END)";

    let statement = format!(
        "SELECT COUNT(DISTINCT c.id) AS total_signups, \
           {purchased} AS made_purchase, \
           {repeated} AS repeat_purchase, \
           {subscribed} AS became_subscriber, \
           ROUND(100.0 * {purchased} / NULLIF(COUNT(DISTINCT c.id), 0), 2) AS purchase_rate, \
           ROUND(100.0 * {repeated} / NULLIF({purchased}, 0), 2) AS repeat_rate, \
           ROUND(100.0 * {subscribed} / NULLIF({purchased}, 0), 2) AS subscription_rate \
         FROM {p}edd_customers c \
         LEFT JOIN {p}edd_orders o ON c.id = o.customer_id AND o.status IN {statuses} \
         LEFT JOIN {p}edd_subscriptions s ON c.id = s.customer_id AND s.status != 'pending' \
         LEFT JOIN ( \
           SELECT customer_id, COUNT(DISTINCT id) AS purchase_count \
           FROM {p}edd_orders \
           WHERE status IN {statuses} \
           GROUP BY customer_id \
         ) AS pc ON c.id = pc.customer_id \
         WHERE c.date_created IS NOT NULL{filter}",
        purchased = purchased,
        repeated = repeated,
        subscribed = subscribed,
        statuses = PAID_STATUSES,
        p = prefix,
        filter = range.filter("c.date_created"),
    );
    ReportQuery::hashed("activation_funnel_", statement, ResultKind::Rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ActivationFunnel {
    pub total_signups: i64,
    pub made_purchase: i64,
    pub repeat_purchase: i64,
    pub became_subscriber: i64,
    pub purchase_rate: f64,
    pub repeat_rate: f64,
    pub subscription_rate: f64,
}

/// Missing row and null rates both read as zero
pub fn shape_activation_funnel(value: ReportValue) -> ActivationFunnel {
    let Some(row) = value.first_row() else {
        return ActivationFunnel::default();
    };

    ActivationFunnel {
        total_signups: row_i64(&row, "total_signups"),
        made_purchase: row_i64(&row, "made_purchase"),
        repeat_purchase: row_i64(&row, "repeat_purchase"),
        became_subscriber: row_i64(&row, "became_subscriber"),
        purchase_rate: row_f64(&row, "purchase_rate"),
        repeat_rate: row_f64(&row, "repeat_rate"),
        subscription_rate: row_f64(&row, "subscription_rate"),
    }
}

/// Paying customers bucketed by where their lifetime spend falls among
/// all customers
pub fn clv_distribution(prefix: &str) -> ReportQuery {
    let cut = |share: f64| {
        format!(
            "(SELECT total_spent FROM ranked \
              WHERE spend_rank = (SELECT CAST(COUNT(*) * {} AS INTEGER) FROM spend))",
            share
        )
    };

    let statement = format!(
        "WITH spend AS ( \
           SELECT c.id, SUM({paid}) AS total_spent \
           FROM {p}edd_customers c \
           LEFT JOIN {p}edd_orders o ON c.id = o.customer_id \
           GROUP BY c.id \
         ), \
         ranked AS ( \
           SELECT total_spent, ROW_NUMBER() OVER (ORDER BY total_spent) - 1 AS spend_rank FROM spend \
         ), \
         cuts AS ( \
           SELECT {p90} AS p90, {p75} AS p75, {p50} AS p50, {p25} AS p25 \
         ) \
         SELECT \
           CASE \
             WHEN s.total_spent >= cuts.p90 THEN 'Top 10%' \
             WHEN s.total_spent >= cuts.p75 THEN '75-90%' \
             WHEN s.total_spent >= cuts.p50 THEN '50-75%' \
             WHEN s.total_spent >= cuts.p25 THEN '25-50%' \
             ELSE 'Bottom 25%' \
           END AS segment, \
           COUNT(*) AS customer_count, \
           ROUND(AVG(s.total_spent), 2) AS avg_clv, \
           ROUND(SUM(s.total_spent), 2) AS total_revenue \
         FROM spend s CROSS JOIN cuts \
         WHERE s.total_spent > 0 \
         GROUP BY segment \
         ORDER BY CASE segment \
           WHEN 'Top 10%' THEN 1 WHEN '75-90%' THEN 2 WHEN '50-75%' THEN 3 \
           WHEN '25-50%' THEN 4 ELSE 5 END",
        paid = paid_total("o"),
        p = prefix,
        p90 = cut(0.9),
        p75 = cut(0.75),
        p50 = cut(0.5),
        p25 = cut(0.25),
    );
    ReportQuery::literal("clv_distribution", statement, ResultKind::Rows)
}

/// Health rating per paying customer from purchase recency, repeat
/// purchases and active subscriptions
pub fn customer_health_scores(prefix: &str, limit: u64) -> ReportQuery {
    let days = days_since("MAX(o.date_created)");
    let active = format!(
        "(SELECT COUNT(*) FROM {p}edd_subscriptions s \
          WHERE s.customer_id = c.id AND s.status = 'active')",
        p = prefix
    );
    let tier = |labels: [&str; 5]| {
        format!(
            "CASE \
               WHEN {days} <= 30 AND {active} > 0 THEN {} \
               WHEN {days} <= 60 AND COUNT(DISTINCT o.id) >= 2 THEN {} \
               WHEN {days} <= 90 THEN {} \
               WHEN {days} <= 180 THEN {} \
               ELSE {} \
             END",
            labels[0],
            labels[1],
            labels[2],
            labels[3],
            labels[4],
            days = days,
            active = active,
        )
    };

    let statement = format!(
        "SELECT c.id AS customer_id, c.email, c.name, \
           {days} AS days_since_purchase, \
           COUNT(DISTINCT o.id) AS total_purchases, \
           ROUND(SUM({paid}), 2) AS total_spent, \
           {active} AS active_subscriptions, \
           {status} AS health_status, \
           {score} AS health_score \
         FROM {p}edd_customers c \
         INNER JOIN {p}edd_orders o ON c.id = o.customer_id \
         WHERE o.status IN {statuses} \
         GROUP BY c.id \
         ORDER BY health_score DESC, total_spent DESC \
         LIMIT {limit}",
        days = days,
        paid = paid_total("o"),
        active = active,
        status = tier(["'Excellent'", "'Good'", "'Fair'", "'At Risk'", "'Poor'"]),
        score = tier(["95", "75", "50", "25", "10"]),
        p = prefix,
        statuses = PAID_STATUSES,
        limit = limit,
    );
    ReportQuery::literal(format!("customer_health_{}", limit), statement, ResultKind::Rows)
}

/// Active customers, orders and order value per month
pub fn engagement_metrics(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, \
           COUNT(DISTINCT o.customer_id) AS active_customers, \
           COUNT(DISTINCT o.id) AS total_orders, \
           ROUND(AVG(o.total), 2) AS avg_order_value, \
           ROUND(1.0 * COUNT(DISTINCT o.id) / COUNT(DISTINCT o.customer_id), 2) AS orders_per_customer \
         FROM {p}edd_orders o \
         WHERE o.status IN {statuses}{filter} \
         GROUP BY strftime('%Y-%m', o.date_created) \
         ORDER BY date",
        date = month_start("o.date_created"),
        label = month_label("o.date_created"),
        p = prefix,
        statuses = PAID_STATUSES,
        filter = range.filter("o.date_created"),
    );
    ReportQuery::hashed("engagement_metrics_", statement, ResultKind::Rows)
}

/// How long customers take from signup to their first paid order
pub fn time_to_first_purchase(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT \
           CASE \
             WHEN days_to_first_purchase <= 0 THEN 'Same Day' \
             WHEN days_to_first_purchase <= 1 THEN '1 Day' \
             WHEN days_to_first_purchase <= 7 THEN '2-7 Days' \
             WHEN days_to_first_purchase <= 30 THEN '8-30 Days' \
             WHEN days_to_first_purchase <= 90 THEN '31-90 Days' \
             ELSE '90+ Days' \
           END AS time_segment, \
           COUNT(*) AS customer_count, \
           ROUND(AVG(days_to_first_purchase), 1) AS avg_days \
         FROM ( \
           SELECT c.id, {days} AS days_to_first_purchase \
           FROM {p}edd_customers c \
           INNER JOIN {p}edd_orders o ON c.id = o.customer_id \
           WHERE o.status IN {statuses} \
             AND c.date_created IS NOT NULL{filter} \
           GROUP BY c.id \
         ) AS conversion \
         GROUP BY time_segment \
         ORDER BY CASE time_segment \
           WHEN 'Same Day' THEN 1 WHEN '1 Day' THEN 2 WHEN '2-7 Days' THEN 3 \
           WHEN '8-30 Days' THEN 4 WHEN '31-90 Days' THEN 5 ELSE 6 END",
        days = days_between("c.date_created", "MIN(o.date_created)"),
        p = prefix,
        statuses = PAID_STATUSES,
        filter = range.filter("c.date_created"),
    );
    ReportQuery::hashed("time_to_first_purchase_", statement, ResultKind::Rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Row;
    use chrono::NaiveDate;
    use serde_json::json;

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(
            NaiveDate::parse_from_str(start, "%Y-%m-%d").ok(),
            NaiveDate::parse_from_str(end, "%Y-%m-%d").ok(),
        )
    }

    #[test]
    fn test_yoy_zero_record_on_no_rows() {
        let shaped = shape_yoy(ReportValue::Rows(vec![]));
        assert_eq!(
            serde_json::to_value(shaped).unwrap(),
            json!({"current_year": 0, "last_year": 0, "change": 0.0})
        );
    }

    #[test]
    fn test_yoy_null_sums_read_as_zero() {
        let mut row = Row::new();
        row.insert("current_year".into(), serde_json::Value::Null);
        row.insert("last_year".into(), serde_json::Value::Null);
        assert_eq!(shape_yoy(ReportValue::Rows(vec![row])).change, 0.0);
    }

    #[test]
    fn test_yoy_change() {
        let mut row = Row::new();
        row.insert("current_year".into(), json!(15));
        row.insert("last_year".into(), json!(10));
        let shaped = shape_yoy(ReportValue::Rows(vec![row]));
        assert_eq!(shaped.current_year, 15);
        assert_eq!(shaped.change, 50.0);
    }

    #[test]
    fn test_same_range_same_key() {
        let a = new_customers_by_month("wp_", &range("2024-01-01", "2024-12-31"));
        let b = new_customers_by_month("wp_", &range("2024-01-01", "2024-12-31"));
        let c = new_customers_by_month("wp_", &range("2024-01-01", "2024-06-30"));
        assert_eq!(a.key, b.key);
        assert_ne!(a.key, c.key);
        assert!(a.key.as_str().starts_with("customers_by_month_"));
    }

    #[test]
    fn test_funnel_defaults() {
        let funnel = shape_activation_funnel(ReportValue::Rows(vec![]));
        assert_eq!(funnel, ActivationFunnel::default());
    }

    #[test]
    fn test_limit_rendered() {
        let query = customer_lifetime_values("", &DateRange::all_time(), 25);
        assert!(query.statement.ends_with("LIMIT 25"));
    }

    #[test]
    fn test_health_score_keys_per_limit() {
        let query = customer_health_scores("wp_", 40);
        assert_eq!(query.key.as_str(), "customer_health_40");
        assert!(query.statement.contains("THEN 95"));
        assert!(query.statement.contains("THEN 'Excellent'"));
        assert!(query.statement.ends_with("LIMIT 40"));
    }

    #[test]
    fn test_first_purchase_filters_signups() {
        let query = time_to_first_purchase("wp_", &range("2024-01-01", "2024-12-31"));
        assert!(query.statement.contains("c.date_created >= '2024-01-01'"));
        assert!(query.key.as_str().starts_with("time_to_first_purchase_"));
    }
}

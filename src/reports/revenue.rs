//! Revenue and refund reports

use super::sql::{days_between, month_label, month_start, paid_total, quote, PAID_STATUSES};
use super::{DateRange, ReportQuery};
use crate::types::ResultKind;

/// Paid revenue per month split into new sales and renewals
pub fn revenue_by_month(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, \
           SUM(CASE WHEN o.type = 'sale' THEN o.total ELSE 0 END) AS new_revenue, \
           SUM(CASE WHEN o.type = 'renewal' THEN o.total ELSE 0 END) AS recurring_revenue, \
           SUM(o.total) AS total_revenue \
         FROM {p}edd_orders o \
         WHERE o.type IN ('sale', 'renewal') \
           AND o.status IN ('complete', 'edd_subscription'){filter} \
         GROUP BY strftime('%Y-%m', o.date_created) \
         ORDER BY date",
        date = month_start("o.date_created"),
        label = month_label("o.date_created"),
        p = prefix,
        filter = range.filter("o.date_created"),
    );
    ReportQuery::hashed("revenue_by_month_", statement, ResultKind::Rows)
}

/// Refunded order totals per month, as positive amounts
pub fn refunded_revenue_by_month(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, ABS(SUM(o.total)) AS value \
         FROM {p}edd_orders o \
         WHERE o.status = 'refunded'{filter} \
         GROUP BY strftime('%Y-%m', o.date_created) \
         ORDER BY date",
        date = month_start("o.date_created"),
        label = month_label("o.date_created"),
        p = prefix,
        filter = range.filter("o.date_created"),
    );
    ReportQuery::hashed("refunded_revenue_", statement, ResultKind::Rows)
}

/// Percentage of sales refunded, per month. Bounds compare at month
/// granularity.
pub fn refund_rates_by_month(prefix: &str, range: &DateRange) -> ReportQuery {
    let mut filter = String::new();
    if let Some(start) = range.start {
        filter.push_str(&format!(
            " AND strftime('%Y-%m', date_created) >= {}",
            quote(&start.format("%Y-%m").to_string())
        ));
    }
    if let Some(end) = range.end {
        filter.push_str(&format!(
            " AND strftime('%Y-%m', date_created) <= {}",
            quote(&end.format("%Y-%m").to_string())
        ));
    }

    let statement = format!(
        "SELECT month_year, {label} AS label, \
           ROUND(100.0 * SUM(CASE WHEN status = 'refunded' THEN 1 ELSE 0 END) / COUNT(*), 2) AS refund_rate \
         FROM ( \
           SELECT strftime('%Y-%m', date_created) AS month_year, status \
           FROM {p}edd_orders \
           WHERE type = 'sale'{filter} \
         ) AS orders \
         GROUP BY month_year \
         ORDER BY month_year",
        label = month_label("month_year || '-01'"),
        p = prefix,
        filter = filter,
    );
    ReportQuery::hashed("refund_rates_", statement, ResultKind::Rows)
}

/// Monthly paid revenue split by where it came from. A sale is a first
/// purchase when the customer has no earlier paid order and an upgrade when
/// it exceeds the customer's earlier average order.
pub fn revenue_breakdown(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, \
           ROUND(SUM(CASE WHEN o.type = 'sale' AND o.is_first_purchase = 1 THEN o.total ELSE 0 END), 2) AS new_customer_revenue, \
           ROUND(SUM(CASE WHEN o.type = 'sale' AND o.is_first_purchase = 0 THEN o.total ELSE 0 END), 2) AS existing_customer_revenue, \
           ROUND(SUM(CASE WHEN o.type = 'renewal' THEN o.total ELSE 0 END), 2) AS renewal_revenue, \
           ROUND(SUM(CASE WHEN o.type = 'sale' AND o.upgrade_indicator = 1 THEN o.total ELSE 0 END), 2) AS upgrade_revenue, \
           ROUND(SUM(o.total), 2) AS total_revenue \
         FROM ( \
           SELECT o.*, \
             CASE WHEN ( \
               SELECT COUNT(*) FROM {p}edd_orders o2 \
               WHERE o2.customer_id = o.customer_id \
                 AND o2.status IN {statuses} \
                 AND o2.date_created < o.date_created \
             ) = 0 THEN 1 ELSE 0 END AS is_first_purchase, \
             CASE WHEN o.total > ( \
               SELECT AVG(o3.total) FROM {p}edd_orders o3 \
               WHERE o3.customer_id = o.customer_id \
                 AND o3.status IN {statuses} \
                 AND o3.date_created < o.date_created \
             ) THEN 1 ELSE 0 END AS upgrade_indicator \
           FROM {p}edd_orders o \
           WHERE o.status IN {statuses}{filter} \
         ) AS o \
         GROUP BY strftime('%Y-%m', o.date_created) \
         ORDER BY date",
        date = month_start("o.date_created"),
        label = month_label("o.date_created"),
        p = prefix,
        statuses = PAID_STATUSES,
        filter = range.filter("o.date_created"),
    );
    ReportQuery::hashed("revenue_breakdown_", statement, ResultKind::Rows)
}

/// Share of paid revenue held by the top tenth and fifth of customers and
/// the top tenth of products
pub fn revenue_concentration(prefix: &str) -> ReportQuery {
    let share = format!(
        "ROUND(100.0 * SUM(amount) / NULLIF((SELECT SUM(total) FROM {p}edd_orders WHERE status IN {s}), 0), 2)",
        p = prefix,
        s = PAID_STATUSES
    );

    let statement = format!(
        "WITH customer_spend AS ( \
           SELECT c.id, SUM({paid}) AS amount, \
             ROW_NUMBER() OVER (ORDER BY SUM({paid}) DESC) AS spend_rank \
           FROM {p}edd_customers c \
           INNER JOIN {p}edd_orders o ON c.id = o.customer_id \
           GROUP BY c.id \
         ), \
         product_sales AS ( \
           SELECT oi.product_id, SUM(oi.total) AS amount, \
             ROW_NUMBER() OVER (ORDER BY SUM(oi.total) DESC) AS sales_rank \
           FROM {p}edd_order_items oi \
           INNER JOIN {p}edd_orders o ON oi.order_id = o.id \
           WHERE o.status IN {s} \
           GROUP BY oi.product_id \
         ) \
         SELECT 'Top 10% Customers' AS segment, COUNT(*) AS count, \
           ROUND(COALESCE(SUM(amount), 0), 2) AS revenue, {share} AS revenue_percentage \
         FROM customer_spend \
         WHERE spend_rank <= (SELECT CAST(COUNT(*) * 0.1 AS INTEGER) FROM {p}edd_customers) \
         UNION ALL \
         SELECT 'Top 20% Customers', COUNT(*), ROUND(COALESCE(SUM(amount), 0), 2), {share} \
         FROM customer_spend \
         WHERE spend_rank <= (SELECT CAST(COUNT(*) * 0.2 AS INTEGER) FROM {p}edd_customers) \
         UNION ALL \
         SELECT 'Top 10% Products', COUNT(*), ROUND(COALESCE(SUM(amount), 0), 2), {share} \
         FROM product_sales \
         WHERE sales_rank <= (SELECT CAST(COUNT(DISTINCT product_id) * 0.1 AS INTEGER) FROM {p}edd_order_items)",
        paid = paid_total("o"),
        p = prefix,
        s = PAID_STATUSES,
        share = share,
    );
    ReportQuery::literal("revenue_concentration", statement, ResultKind::Rows)
}

/// Attempts, success rate and revenue per payment gateway
pub fn payment_method_performance(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT COALESCE(NULLIF(o.gateway, ''), 'Unknown') AS payment_method, \
           COUNT(*) AS total_attempts, \
           COUNT(CASE WHEN o.status IN {s} THEN 1 END) AS successful_payments, \
           COUNT(CASE WHEN o.status = 'failed' THEN 1 END) AS failed_payments, \
           ROUND(100.0 * COUNT(CASE WHEN o.status IN {s} THEN 1 END) / COUNT(*), 2) AS success_rate, \
           ROUND(SUM({paid}), 2) AS total_revenue, \
           ROUND(AVG(CASE WHEN o.status IN {s} THEN o.total END), 2) AS avg_transaction_value \
         FROM {p}edd_orders o \
         WHERE 1 = 1{filter} \
         GROUP BY payment_method \
         ORDER BY total_revenue DESC",
        s = PAID_STATUSES,
        paid = paid_total("o"),
        p = prefix,
        filter = range.filter("o.date_created"),
    );
    ReportQuery::hashed("payment_method_performance_", statement, ResultKind::Rows)
}

/// Failed orders per month and how many were followed by a paid order from
/// the same customer within 30 days
pub fn failed_payment_recovery(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, \
           COUNT(DISTINCT failed.id) AS failed_count, \
           COUNT(DISTINCT recovery.id) AS recovered_count, \
           ROUND(100.0 * COUNT(DISTINCT recovery.id) / COUNT(DISTINCT failed.id), 2) AS recovery_rate, \
           ROUND(SUM(CASE WHEN recovery.id IS NOT NULL THEN recovery.total ELSE 0 END), 2) AS recovered_revenue, \
           ROUND(AVG({days}), 1) AS avg_days_to_recovery \
         FROM {p}edd_orders failed \
         LEFT JOIN {p}edd_orders recovery \
           ON failed.customer_id = recovery.customer_id \
           AND recovery.status IN {s} \
           AND recovery.date_created > failed.date_created \
           AND recovery.date_created <= datetime(failed.date_created, '+30 days') \
         WHERE failed.status = 'failed'{filter} \
         GROUP BY strftime('%Y-%m', failed.date_created) \
         ORDER BY date",
        date = month_start("failed.date_created"),
        label = month_label("failed.date_created"),
        days = days_between("failed.date_created", "recovery.date_created"),
        p = prefix,
        s = PAID_STATUSES,
        filter = range.filter("failed.date_created"),
    );
    ReportQuery::hashed("failed_payment_recovery_", statement, ResultKind::Rows)
}

/// Month over month revenue change, growth rate and acceleration
pub fn revenue_velocity(prefix: &str, range: &DateRange) -> ReportQuery {
    let statement = format!(
        "SELECT date, label, monthly_revenue, \
           LAG(monthly_revenue) OVER (ORDER BY date) AS previous_month_revenue, \
           ROUND(monthly_revenue - LAG(monthly_revenue) OVER (ORDER BY date), 2) AS revenue_change, \
           ROUND(100.0 * (monthly_revenue - LAG(monthly_revenue) OVER (ORDER BY date)) \
             / NULLIF(LAG(monthly_revenue) OVER (ORDER BY date), 0), 2) AS growth_rate, \
           ROUND((monthly_revenue - LAG(monthly_revenue) OVER (ORDER BY date)) \
             - (LAG(monthly_revenue) OVER (ORDER BY date) - LAG(monthly_revenue, 2) OVER (ORDER BY date)), 2) \
             AS acceleration \
         FROM ( \
           SELECT {date} AS date, {label} AS label, ROUND(SUM(o.total), 2) AS monthly_revenue \
           FROM {p}edd_orders o \
           WHERE o.status IN {s}{filter} \
           GROUP BY strftime('%Y-%m', o.date_created) \
         ) AS monthly \
         ORDER BY date",
        date = month_start("o.date_created"),
        label = month_label("o.date_created"),
        p = prefix,
        s = PAID_STATUSES,
        filter = range.filter("o.date_created"),
    );
    ReportQuery::hashed("revenue_velocity_", statement, ResultKind::Rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_refund_rate_bounds_are_months() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 15),
            NaiveDate::from_ymd_opt(2024, 5, 2),
        );
        let query = refund_rates_by_month("wp_", &range);
        assert!(query.statement.contains(">= '2024-03'"));
        assert!(query.statement.contains("<= '2024-05'"));
        assert!(query.key.as_str().starts_with("refund_rates_"));
    }

    #[test]
    fn test_unbounded_revenue_has_no_date_filter() {
        let query = revenue_by_month("wp_", &DateRange::all_time());
        assert!(!query.statement.contains("o.date_created >="));
        assert!(query.statement.contains("FROM wp_edd_orders o"));
    }

    #[test]
    fn test_concentration_uses_one_key() {
        let query = revenue_concentration("wp_");
        assert_eq!(query.key.as_str(), "revenue_concentration");
        assert_eq!(query.statement.matches("UNION ALL").count(), 2);
    }

    #[test]
    fn test_recovery_filters_failed_orders() {
        let range = DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 1), None);
        let query = failed_payment_recovery("wp_", &range);
        assert!(query.statement.contains("failed.date_created >= '2024-01-01'"));
        assert!(query.statement.contains("'+30 days'"));
    }
}

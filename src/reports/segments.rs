//! RFM segmentation and churn risk reports
//!
//! Scores run 1 to 5 on three axes: days since the last paid order,
//! number of paid orders, and total paid.

use super::sql::{days_since, paid_total, PAID_STATUSES};
use super::ReportQuery;
use crate::types::ResultKind;

fn recency_score(days: &str) -> String {
    format!(
        "CASE WHEN {d} <= 30 THEN 5 WHEN {d} <= 60 THEN 4 WHEN {d} <= 90 THEN 3 \
         WHEN {d} <= 180 THEN 2 ELSE 1 END",
        d = days
    )
}

fn frequency_score(count: &str) -> String {
    format!(
        "CASE WHEN {c} >= 10 THEN 5 WHEN {c} >= 7 THEN 4 WHEN {c} >= 4 THEN 3 \
         WHEN {c} >= 2 THEN 2 ELSE 1 END",
        c = count
    )
}

fn monetary_score(total: &str) -> String {
    format!(
        "CASE WHEN {t} >= 5000 THEN 5 WHEN {t} >= 2000 THEN 4 WHEN {t} >= 1000 THEN 3 \
         WHEN {t} >= 500 THEN 2 ELSE 1 END",
        t = total
    )
}

/// Per-customer RFM columns over paid orders
fn rfm_base(prefix: &str) -> String {
    let days = days_since("MAX(o.date_created)");
    let count = "COUNT(DISTINCT o.id)";
    let total = format!("SUM({})", paid_total("o"));

    format!(
        "SELECT c.id AS customer_id, c.email, c.name, \
           {days} AS recency_days, \
           {count} AS frequency, \
           ROUND({total}, 2) AS monetary, \
           {r} AS recency_score, \
           {f} AS frequency_score, \
           {m} AS monetary_score \
         FROM {p}edd_customers c \
         INNER JOIN {p}edd_orders o ON c.id = o.customer_id \
         WHERE o.status IN {statuses} \
         GROUP BY c.id",
        days = days,
        count = count,
        total = total,
        r = recency_score(&days),
        f = frequency_score(count),
        m = monetary_score(&total),
        p = prefix,
        statuses = PAID_STATUSES,
    )
}

/// Every paying customer with RFM scores, best first
pub fn rfm_segments(prefix: &str) -> ReportQuery {
    let statement = format!(
        "SELECT * FROM ({base}) AS rfm \
         WHERE frequency > 0 \
         ORDER BY recency_score DESC, frequency_score DESC, monetary_score DESC",
        base = rfm_base(prefix),
    );
    ReportQuery::literal("rfm_segments", statement, ResultKind::Rows)
}

/// Revenue and customer counts per named segment
pub fn segment_performance(prefix: &str) -> ReportQuery {
    let statement = format!(
        "SELECT \
           CASE \
             WHEN (recency_score + frequency_score + monetary_score) >= 13 THEN 'Champions' \
             WHEN (recency_score + frequency_score + monetary_score) >= 10 AND recency_score >= 4 THEN 'Loyal Customers' \
             WHEN monetary_score >= 4 AND (recency_score + frequency_score) >= 6 THEN 'Big Spenders' \
             WHEN recency_score >= 4 AND frequency_score <= 2 THEN 'Recent Customers' \
             WHEN frequency_score >= 4 AND recency_score <= 2 THEN 'At Risk' \
             WHEN recency_score <= 2 AND frequency_score <= 2 THEN 'Lost' \
             ELSE 'Potential' \
           END AS segment, \
           COUNT(*) AS customer_count, \
           ROUND(SUM(monetary), 2) AS total_revenue, \
           ROUND(AVG(monetary), 2) AS avg_revenue, \
           ROUND(AVG(frequency), 2) AS avg_purchases, \
           CAST(ROUND(AVG(recency_days), 0) AS INTEGER) AS avg_days_since_purchase \
         FROM ({base}) AS rfm_data \
         GROUP BY segment \
         ORDER BY total_revenue DESC",
        base = rfm_base(prefix),
    );
    ReportQuery::literal("segment_performance", statement, ResultKind::Rows)
}

/// Lapsed repeat buyers and customers with recent cancellations
pub fn at_risk_customers(prefix: &str, limit: u64) -> ReportQuery {
    let days = days_since("MAX(o.date_created)");
    let recent_cancellations = format!(
        "(SELECT COUNT(*) FROM {p}edd_subscriptions s \
          WHERE s.customer_id = c.id \
            AND s.status IN ('cancelled', 'expired') \
            AND s.expiration >= date('now', '-90 days'))",
        p = prefix
    );

    let statement = format!(
        "SELECT * FROM ( \
           SELECT c.id AS customer_id, c.email, c.name, \
             {days} AS days_since_purchase, \
             COUNT(DISTINCT o.id) AS total_purchases, \
             ROUND(SUM({paid}), 2) AS total_spent, \
             MAX(o.date_created) AS last_purchase_date, \
             {cancellations} AS recent_cancellations, \
             CASE \
               WHEN {cancellations} > 0 THEN 'High' \
               WHEN {days} > 120 AND COUNT(DISTINCT o.id) >= 3 THEN 'Medium' \
               ELSE 'Low' \
             END AS churn_risk \
           FROM {p}edd_customers c \
           INNER JOIN {p}edd_orders o ON c.id = o.customer_id \
           WHERE o.status IN {statuses} \
           GROUP BY c.id \
         ) AS candidates \
         WHERE (days_since_purchase > 90 AND total_purchases >= 2) OR recent_cancellations > 0 \
         ORDER BY CASE churn_risk WHEN 'High' THEN 1 WHEN 'Medium' THEN 2 ELSE 3 END, total_spent DESC \
         LIMIT {limit}",
        days = days,
        paid = paid_total("o"),
        cancellations = recent_cancellations,
        p = prefix,
        statuses = PAID_STATUSES,
        limit = limit,
    );
    ReportQuery::literal(format!("at_risk_customers_{}", limit), statement, ResultKind::Rows)
}

/// Heuristic churn score for every customer with orders
pub fn churn_prediction_scores(prefix: &str, limit: u64) -> ReportQuery {
    let days = days_since("MAX(o.date_created)");
    let active_subscriptions = format!(
        "(SELECT COUNT(*) FROM {p}edd_subscriptions s \
          WHERE s.customer_id = c.id AND s.status = 'active')",
        p = prefix
    );
    let failed_payments = format!(
        "(SELECT COUNT(*) FROM {p}edd_orders o2 \
          WHERE o2.customer_id = c.id AND o2.status = 'failed' \
            AND o2.date_created >= date('now', '-3 months'))",
        p = prefix
    );
    let recent_cancellations = format!(
        "(SELECT COUNT(*) FROM {p}edd_subscriptions s \
          WHERE s.customer_id = c.id AND s.status IN ('cancelled', 'expired') \
            AND s.expiration >= date('now', '-3 months'))",
        p = prefix
    );
    let high = format!(
        "({days} > 180 OR {failed} >= 2 OR {cancelled} > 0)",
        days = days,
        failed = failed_payments,
        cancelled = recent_cancellations
    );
    let medium = format!("({days} > 90 OR {failed} >= 1)", days = days, failed = failed_payments);

    let statement = format!(
        "SELECT c.id AS customer_id, c.email, c.name, \
           {days} AS days_since_last_order, \
           COUNT(DISTINCT o.id) AS total_orders, \
           ROUND(SUM({paid}), 2) AS lifetime_value, \
           {active} AS active_subscriptions, \
           {failed} AS recent_failed_payments, \
           CASE WHEN {high} THEN 'High' WHEN {medium} THEN 'Medium' ELSE 'Low' END AS churn_risk, \
           CASE WHEN {high} THEN 85 WHEN {medium} THEN 55 ELSE 20 END AS churn_score \
         FROM {p}edd_customers c \
         INNER JOIN {p}edd_orders o ON c.id = o.customer_id \
         WHERE o.status IN ('complete', 'edd_subscription', 'failed') \
         GROUP BY c.id \
         HAVING COUNT(DISTINCT o.id) > 0 \
         ORDER BY churn_score DESC, lifetime_value DESC \
         LIMIT {limit}",
        days = days,
        paid = paid_total("o"),
        active = active_subscriptions,
        failed = failed_payments,
        high = high,
        medium = medium,
        p = prefix,
        limit = limit,
    );
    ReportQuery::literal(format!("churn_prediction_scores_{}", limit), statement, ResultKind::Rows)
}

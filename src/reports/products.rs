//! Product performance reports
//!
//! Built on order line items. Revenue counts only items of paid orders.

use super::sql::{months_since, month_label, month_start, PAID_STATUSES};
use super::{DateRange, ReportQuery};
use crate::types::ResultKind;

/// Line items joined to their order and product name
fn paid_items(prefix: &str) -> String {
    format!(
        "{p}edd_order_items oi \
         INNER JOIN {p}edd_orders o ON oi.order_id = o.id \
         LEFT JOIN {p}posts p ON oi.product_id = p.ID",
        p = prefix
    )
}

/// Products ranked by revenue
pub fn top_products(prefix: &str, range: &DateRange, limit: u64) -> ReportQuery {
    let statement = format!(
        "SELECT oi.product_id, p.post_title AS product_name, \
           COUNT(DISTINCT o.id) AS order_count, \
           SUM(oi.quantity) AS units_sold, \
           ROUND(SUM(oi.total), 2) AS total_revenue, \
           ROUND(AVG(oi.total / NULLIF(oi.quantity, 0)), 2) AS avg_price, \
           ROUND(SUM(oi.total) / COUNT(DISTINCT o.id), 2) AS aov \
         FROM {items} \
         WHERE o.status IN {statuses}{filter} \
         GROUP BY oi.product_id \
         ORDER BY total_revenue DESC \
         LIMIT {limit}",
        items = paid_items(prefix),
        statuses = PAID_STATUSES,
        filter = range.filter("o.date_created"),
        limit = limit,
    );
    ReportQuery::hashed("top_products_", statement, ResultKind::Rows)
}

/// Monthly sales of the `limit` best-selling products
pub fn product_growth_trends(prefix: &str, range: &DateRange, limit: u64) -> ReportQuery {
    let statement = format!(
        "SELECT {date} AS date, {label} AS label, \
           oi.product_id, p.post_title AS product_name, \
           SUM(oi.quantity) AS units_sold, \
           ROUND(SUM(oi.total), 2) AS revenue, \
           COUNT(DISTINCT o.id) AS order_count \
         FROM {items} \
         WHERE oi.product_id IN ( \
           SELECT oi2.product_id \
           FROM {p}edd_order_items oi2 \
           INNER JOIN {p}edd_orders o2 ON oi2.order_id = o2.id \
           WHERE o2.status IN {statuses} \
           GROUP BY oi2.product_id \
           ORDER BY SUM(oi2.total) DESC \
           LIMIT {limit} \
         ) \
           AND o.status IN {statuses}{filter} \
         GROUP BY strftime('%Y-%m', o.date_created), oi.product_id \
         ORDER BY date, revenue DESC",
        date = month_start("o.date_created"),
        label = month_label("o.date_created"),
        items = paid_items(prefix),
        p = prefix,
        statuses = PAID_STATUSES,
        filter = range.filter("o.date_created"),
        limit = limit,
    );
    ReportQuery::hashed("product_growth_trends_", statement, ResultKind::Rows)
}

/// Products with sales in the last quarter, placed in a revenue / growth
/// quadrant against the average product
pub fn product_performance_matrix(prefix: &str, range: &DateRange) -> ReportQuery {
    let current = "SUM(CASE WHEN o.date_created >= date('now', '-3 months') THEN oi.total ELSE 0 END)";
    let previous = "SUM(CASE WHEN o.date_created >= date('now', '-6 months') \
                    AND o.date_created < date('now', '-3 months') THEN oi.total ELSE 0 END)";

    let statement = format!(
        "WITH metrics AS ( \
           SELECT oi.product_id, p.post_title AS product_name, \
             ROUND({current}, 2) AS current_revenue, \
             ROUND({previous}, 2) AS previous_revenue, \
             ROUND(100.0 * ({current} - {previous}) / NULLIF({previous}, 0), 2) AS growth_rate, \
             SUM(oi.quantity) AS units_sold \
           FROM {items} \
           WHERE o.status IN {statuses}{filter} \
           GROUP BY oi.product_id \
           HAVING current_revenue > 0 \
         ), \
         averages AS ( \
           SELECT AVG(current_revenue) AS avg_revenue, AVG(growth_rate) AS avg_growth FROM metrics \
         ) \
         SELECT m.product_id, m.product_name, m.current_revenue, m.previous_revenue, \
           m.growth_rate, m.units_sold, \
           CASE \
             WHEN m.current_revenue >= a.avg_revenue AND m.growth_rate >= a.avg_growth THEN 'Star' \
             WHEN m.current_revenue >= a.avg_revenue AND m.growth_rate < a.avg_growth THEN 'Cash Cow' \
             WHEN m.current_revenue < a.avg_revenue AND m.growth_rate >= a.avg_growth THEN 'Question Mark' \
             ELSE 'Dog' \
           END AS quadrant \
         FROM metrics m CROSS JOIN averages a \
         ORDER BY m.current_revenue DESC",
        current = current,
        previous = previous,
        items = paid_items(prefix),
        statuses = PAID_STATUSES,
        filter = range.filter("o.date_created"),
    );
    ReportQuery::hashed("product_performance_matrix_", statement, ResultKind::Rows)
}

/// Lifecycle stage of every product from its age and last month's trend
pub fn product_lifecycle_stages(prefix: &str) -> ReportQuery {
    let current = "SUM(CASE WHEN o.date_created >= date('now', '-1 month') THEN oi.total ELSE 0 END)";
    let previous = "SUM(CASE WHEN o.date_created >= date('now', '-2 months') \
                    AND o.date_created < date('now', '-1 month') THEN oi.total ELSE 0 END)";

    let statement = format!(
        "WITH monthly AS ( \
           SELECT oi.product_id, SUM(oi.total) AS revenue \
           FROM {p}edd_order_items oi \
           INNER JOIN {p}edd_orders o ON oi.order_id = o.id \
           WHERE o.status IN {statuses} \
           GROUP BY oi.product_id, strftime('%Y-%m', o.date_created) \
         ), \
         metrics AS ( \
           SELECT oi.product_id, p.post_title AS product_name, \
             {months} AS months_active, \
             ROUND(100.0 * ({current} - {previous}) / NULLIF({previous}, 0), 2) AS revenue_trend, \
             ROUND({current}, 2) AS current_revenue, \
             (SELECT ROUND(MAX(m.revenue), 2) FROM monthly m WHERE m.product_id = oi.product_id) AS peak_revenue, \
             MAX(o.date_created) AS last_sale_date \
           FROM {items} \
           WHERE o.status IN {statuses} \
           GROUP BY oi.product_id \
         ) \
         SELECT product_id, product_name, months_active, revenue_trend, current_revenue, peak_revenue, \
           CASE \
             WHEN months_active <= 3 AND revenue_trend > 20 THEN 'Introduction' \
             WHEN revenue_trend > 10 THEN 'Growth' \
             WHEN revenue_trend >= -10 AND revenue_trend <= 10 THEN 'Maturity' \
             WHEN revenue_trend < -10 AND revenue_trend >= -30 THEN 'Decline' \
             ELSE 'End of Life' \
           END AS lifecycle_stage, \
           last_sale_date \
         FROM metrics \
         WHERE months_active > 0 \
         ORDER BY CASE lifecycle_stage \
           WHEN 'Introduction' THEN 1 WHEN 'Growth' THEN 2 WHEN 'Maturity' THEN 3 \
           WHEN 'Decline' THEN 4 ELSE 5 END, \
           current_revenue DESC",
        months = months_since("MIN(o.date_created)"),
        current = current,
        previous = previous,
        items = paid_items(prefix),
        p = prefix,
        statuses = PAID_STATUSES,
    );
    ReportQuery::literal("product_lifecycle_stages", statement, ResultKind::Rows)
}

/// Units and revenue over the next `days` days for the `limit` products
/// with the most revenue in the last 90 days, from their daily averages
pub fn demand_forecast(prefix: &str, days: u64, limit: u64) -> ReportQuery {
    let statement = format!(
        "WITH daily AS ( \
           SELECT oi.product_id, date(o.date_created) AS sale_date, \
             SUM(oi.quantity) AS daily_units, SUM(oi.total) AS daily_revenue \
           FROM {p}edd_order_items oi \
           INNER JOIN {p}edd_orders o ON oi.order_id = o.id \
           WHERE o.status IN {statuses} \
             AND o.date_created >= date('now', '-90 days') \
           GROUP BY oi.product_id, date(o.date_created) \
         ), \
         leaders AS ( \
           SELECT product_id, SUM(daily_revenue) AS total_revenue \
           FROM daily \
           GROUP BY product_id \
           ORDER BY total_revenue DESC \
           LIMIT {limit} \
         ), \
         forecasts AS ( \
           SELECT d.product_id, p.post_title AS product_name, \
             AVG(d.daily_units) AS avg_units, \
             AVG(d.daily_revenue) AS avg_revenue, \
             COUNT(DISTINCT d.sale_date) AS data_points, \
             CASE \
               WHEN AVG(CASE WHEN d.sale_date >= date('now', '-30 days') THEN d.daily_units END) > \
                    AVG(CASE WHEN d.sale_date >= date('now', '-60 days') AND d.sale_date < date('now', '-30 days') THEN d.daily_units END) \
                 THEN 'Increasing' \
               WHEN AVG(CASE WHEN d.sale_date >= date('now', '-30 days') THEN d.daily_units END) < \
                    AVG(CASE WHEN d.sale_date >= date('now', '-60 days') AND d.sale_date < date('now', '-30 days') THEN d.daily_units END) \
                 THEN 'Decreasing' \
               ELSE 'Stable' \
             END AS trend_direction \
           FROM daily d \
           INNER JOIN leaders l ON d.product_id = l.product_id \
           LEFT JOIN {p}posts p ON d.product_id = p.ID \
           GROUP BY d.product_id \
         ) \
         SELECT product_id, product_name, \
           CAST(ROUND(avg_units * {days}, 0) AS INTEGER) AS forecasted_units, \
           ROUND(avg_revenue * {days}, 2) AS forecasted_revenue, \
           ROUND(avg_units, 2) AS avg_daily_sales, \
           ROUND(avg_revenue, 2) AS avg_daily_revenue, \
           trend_direction, \
           CASE WHEN data_points >= 90 THEN 'High' WHEN data_points >= 30 THEN 'Medium' ELSE 'Low' END \
             AS forecast_confidence \
         FROM forecasts \
         ORDER BY forecasted_revenue DESC",
        p = prefix,
        statuses = PAID_STATUSES,
        days = days,
        limit = limit,
    );
    ReportQuery::literal(
        format!("demand_forecast_{}_{}", days, limit),
        statement,
        ResultKind::Rows,
    )
}

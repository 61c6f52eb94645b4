//! Financial reports: cash flow, unit economics and health benchmarks

use serde::Serialize;

use super::sql::{paid_total, round2, PAID_STATUSES};
use super::ReportQuery;
use crate::types::value::{as_f64, row_f64, row_i64};
use crate::types::{ReportValue, ResultKind, Row};

/// Confirmed renewals, projected new sales and at-risk renewals over the
/// next 30, 60 and 90 days. Confirmed renewals only count subscriptions
/// expiring within `days`.
pub fn cash_flow_projection(prefix: &str, days: u64) -> ReportQuery {
    let renewing = |window: u64| {
        format!(
            "ROUND(COALESCE(SUM(CASE WHEN s.expiration <= date('now', '+{} days') \
               THEN s.recurring_amount ELSE 0 END), 0), 2)",
            window
        )
    };
    let projected = |window: u64| {
        format!(
            "ROUND(COALESCE(AVG(CASE WHEN d.sale_date >= date('now', '-{w} days') \
               THEN d.daily_revenue END), 0) * {w}, 2)",
            w = window
        )
    };
    let at_risk = |window: u64| {
        format!(
            "ROUND(COALESCE(SUM(CASE WHEN s.expiration <= date('now', '+{} days') AND EXISTS ( \
               SELECT 1 FROM {p}edd_orders f \
               WHERE f.customer_id = s.customer_id \
                 AND f.status = 'failed' \
                 AND f.date_created >= date('now', '-60 days') \
             ) THEN s.recurring_amount ELSE 0 END), 0), 2)",
            window,
            p = prefix
        )
    };

    let statement = format!(
        "SELECT 'Confirmed Revenue' AS category, \
           {c30} AS next_30_days, {c60} AS next_60_days, {c90} AS next_90_days \
         FROM {p}edd_subscriptions s \
         WHERE s.status = 'active' \
           AND s.expiration >= date('now') \
           AND s.expiration <= date('now', '+{days} days') \
         UNION ALL \
         SELECT 'Projected New Sales', {n30}, {n60}, {n90} \
         FROM ( \
           SELECT date(date_created) AS sale_date, SUM(total) AS daily_revenue \
           FROM {p}edd_orders \
           WHERE status IN {s} AND type = 'sale' \
           GROUP BY date(date_created) \
         ) AS d \
         UNION ALL \
         SELECT 'At-Risk Revenue', {r30}, {r60}, {r90} \
         FROM {p}edd_subscriptions s \
         WHERE s.status = 'active'",
        c30 = renewing(30),
        c60 = renewing(60),
        c90 = renewing(90),
        n30 = projected(30),
        n60 = projected(60),
        n90 = projected(90),
        r30 = at_risk(30),
        r60 = at_risk(60),
        r90 = at_risk(90),
        p = prefix,
        s = PAID_STATUSES,
        days = days,
    );
    ReportQuery::literal(
        format!("cash_flow_projection_{}", days),
        statement,
        ResultKind::Rows,
    )
}

/// Average lifetime value against acquisition cost, estimated as last
/// year's paid revenue per customer signed up in that year
pub fn ltv_cac_ratio(prefix: &str) -> ReportQuery {
    let statement = format!(
        "WITH lifetime AS ( \
           SELECT c.id, SUM({paid}) AS customer_ltv \
           FROM {p}edd_customers c \
           INNER JOIN {p}edd_orders o ON c.id = o.customer_id \
           GROUP BY c.id \
         ) \
         SELECT \
           (SELECT ROUND(AVG(customer_ltv), 2) FROM lifetime) AS avg_ltv, \
           (SELECT COUNT(*) FROM lifetime) AS customer_count, \
           (SELECT COALESCE(SUM(total), 0) FROM {p}edd_orders \
             WHERE status IN {s} AND date_created >= date('now', '-1 year')) AS revenue_last_year, \
           (SELECT COUNT(*) FROM {p}edd_customers \
             WHERE date_created >= date('now', '-1 year')) AS new_customers_last_year",
        paid = paid_total("o"),
        p = prefix,
        s = PAID_STATUSES,
    );
    ReportQuery::literal("ltv_cac_ratio", statement, ResultKind::Rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LtvCac {
    pub avg_ltv: f64,
    pub estimated_cac: f64,
    pub ltv_cac_ratio: f64,
    pub customer_count: i64,
}

/// Cost and ratio are zero when there were no signups or no cost
pub fn shape_ltv_cac(value: ReportValue) -> LtvCac {
    let Some(row) = value.first_row() else {
        return LtvCac::default();
    };

    let avg_ltv = row_f64(&row, "avg_ltv");
    let new_customers = row_i64(&row, "new_customers_last_year");
    let estimated_cac = if new_customers > 0 {
        round2(row_f64(&row, "revenue_last_year") / new_customers as f64)
    } else {
        0.0
    };
    let ltv_cac_ratio = if estimated_cac > 0.0 {
        round2(avg_ltv / estimated_cac)
    } else {
        0.0
    };

    LtvCac {
        avg_ltv,
        estimated_cac,
        ltv_cac_ratio,
        customer_count: row_i64(&row, "customer_count"),
    }
}

/// Annualised revenue from the last month, the last quarter and active
/// subscriptions
pub fn revenue_run_rate(prefix: &str) -> ReportQuery {
    let last_month = "COALESCE(SUM(CASE WHEN o.date_created >= date('now', '-1 month') THEN o.total ELSE 0 END), 0)";
    let last_quarter = "COALESCE(SUM(CASE WHEN o.date_created >= date('now', '-3 months') THEN o.total ELSE 0 END), 0)";

    let statement = format!(
        "SELECT \
           ROUND({m}, 2) AS last_month_revenue, \
           ROUND({m} * 12, 2) AS annual_run_rate, \
           ROUND({q} / 3.0, 2) AS avg_monthly_revenue_3mo, \
           ROUND({q} / 3.0 * 12, 2) AS annual_run_rate_3mo, \
           ROUND((SELECT COALESCE(SUM(recurring_amount * 12), 0) FROM {p}edd_subscriptions WHERE status = 'active'), 2) \
             AS arr_from_subscriptions, \
           ROUND((SELECT COALESCE(SUM(recurring_amount), 0) FROM {p}edd_subscriptions WHERE status = 'active'), 2) \
             AS mrr_from_subscriptions \
         FROM {p}edd_orders o \
         WHERE o.status IN {s}",
        m = last_month,
        q = last_quarter,
        p = prefix,
        s = PAID_STATUSES,
    );
    ReportQuery::literal("revenue_run_rate", statement, ResultKind::Rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RunRate {
    pub last_month_revenue: f64,
    pub annual_run_rate: f64,
    pub avg_monthly_revenue_3mo: f64,
    pub annual_run_rate_3mo: f64,
    pub arr_from_subscriptions: f64,
    pub mrr_from_subscriptions: f64,
}

pub fn shape_run_rate(value: ReportValue) -> RunRate {
    let Some(row) = value.first_row() else {
        return RunRate::default();
    };

    RunRate {
        last_month_revenue: row_f64(&row, "last_month_revenue"),
        annual_run_rate: row_f64(&row, "annual_run_rate"),
        avg_monthly_revenue_3mo: row_f64(&row, "avg_monthly_revenue_3mo"),
        annual_run_rate_3mo: row_f64(&row, "annual_run_rate_3mo"),
        arr_from_subscriptions: row_f64(&row, "arr_from_subscriptions"),
        mrr_from_subscriptions: row_f64(&row, "mrr_from_subscriptions"),
    }
}

/// Month over month revenue growth, subscription churn, customer retention
/// and refund rate, each null without a baseline
pub fn financial_health_indicators(prefix: &str) -> ReportQuery {
    let paid_between = |from: &str, to: Option<&str>| {
        let upper = to
            .map(|t| format!(" AND date_created < date('now', '{}')", t))
            .unwrap_or_default();
        format!(
            "(SELECT SUM(total) FROM {p}edd_orders \
              WHERE status IN {s} AND date_created >= date('now', '{from}'){upper})",
            p = prefix,
            s = PAID_STATUSES,
            from = from,
            upper = upper,
        )
    };
    let previous = paid_between("-2 months", Some("-1 month"));

    let statement = format!(
        "SELECT \
           ROUND(100.0 * ({current} - {previous}) / NULLIF({previous}, 0), 2) AS revenue_growth, \
           ROUND(100.0 * \
             (SELECT COUNT(*) FROM {p}edd_subscriptions \
               WHERE status IN ('cancelled', 'expired') AND expiration >= date('now', '-1 month')) \
             / NULLIF((SELECT COUNT(*) FROM {p}edd_subscriptions WHERE created < date('now', '-1 month')), 0), 2) \
             AS churn_rate, \
           ROUND(100.0 * \
             (SELECT COUNT(DISTINCT customer_id) FROM {p}edd_orders \
               WHERE status IN {s} AND date_created >= date('now', '-1 month') \
                 AND customer_id IN ( \
                   SELECT customer_id FROM {p}edd_orders \
                   WHERE status IN {s} AND date_created < date('now', '-1 month'))) \
             / NULLIF((SELECT COUNT(DISTINCT customer_id) FROM {p}edd_orders \
               WHERE status IN {s} AND date_created < date('now', '-1 month')), 0), 2) \
             AS retention_rate, \
           ROUND(100.0 * \
             (SELECT COUNT(*) FROM {p}edd_orders \
               WHERE status = 'refunded' AND date_created >= date('now', '-1 month')) \
             / NULLIF((SELECT COUNT(*) FROM {p}edd_orders \
               WHERE status IN ('complete', 'edd_subscription', 'refunded') \
                 AND date_created >= date('now', '-1 month')), 0), 2) \
             AS refund_rate",
        current = paid_between("-1 month", None),
        previous = previous,
        p = prefix,
        s = PAID_STATUSES,
    );
    ReportQuery::literal("financial_health_indicators", statement, ResultKind::Rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthIndicator {
    pub metric: &'static str,
    pub value: Option<f64>,
    pub unit: &'static str,
    pub health_status: &'static str,
}

/// Whether a larger value is healthier, with the Excellent, Good and Fair
/// cut-offs
enum Benchmark {
    Higher([f64; 3]),
    Lower([f64; 3]),
}

impl Benchmark {
    fn grade(&self, value: Option<f64>) -> &'static str {
        const GRADES: [&str; 3] = ["Excellent", "Good", "Fair"];
        let Some(value) = value else {
            return "Poor";
        };
        let position = match self {
            Benchmark::Higher(cuts) => cuts.iter().position(|cut| value >= *cut),
            Benchmark::Lower(cuts) => cuts.iter().position(|cut| value <= *cut),
        };
        position.map(|i| GRADES[i]).unwrap_or("Poor")
    }
}

const INDICATORS: [(&str, &str, Benchmark); 4] = [
    ("Revenue Growth", "revenue_growth", Benchmark::Higher([10.0, 5.0, 0.0])),
    ("Churn Rate", "churn_rate", Benchmark::Lower([3.0, 5.0, 7.0])),
    ("Customer Retention", "retention_rate", Benchmark::Higher([80.0, 70.0, 60.0])),
    ("Refund Rate", "refund_rate", Benchmark::Lower([2.0, 5.0, 8.0])),
];

fn nullable_f64(row: &Row, column: &str) -> Option<f64> {
    row.get(column).filter(|v| !v.is_null()).map(as_f64)
}

/// One graded indicator per metric. A metric without a baseline has a
/// null value and grades Poor.
pub fn shape_health_indicators(value: ReportValue) -> Vec<HealthIndicator> {
    let row = value.first_row().unwrap_or_default();
    INDICATORS
        .iter()
        .map(|(metric, column, benchmark)| {
            let value = nullable_f64(&row, column);
            HealthIndicator {
                metric: *metric,
                value,
                unit: "%",
                health_status: benchmark.grade(value),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn row(pairs: &[(&str, Value)]) -> ReportValue {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert((*k).into(), v.clone());
        }
        ReportValue::Rows(vec![row])
    }

    #[test]
    fn test_ltv_cac_guards_zero_signups() {
        let shaped = shape_ltv_cac(row(&[
            ("avg_ltv", json!(120.0)),
            ("customer_count", json!(4)),
            ("revenue_last_year", json!(500.0)),
            ("new_customers_last_year", json!(0)),
        ]));
        assert_eq!(shaped.estimated_cac, 0.0);
        assert_eq!(shaped.ltv_cac_ratio, 0.0);
        assert_eq!(shaped.customer_count, 4);
        assert_eq!(shape_ltv_cac(ReportValue::Rows(vec![])), LtvCac::default());
    }

    #[test]
    fn test_ltv_cac_ratio() {
        let shaped = shape_ltv_cac(row(&[
            ("avg_ltv", json!(300.0)),
            ("revenue_last_year", json!(1000.0)),
            ("new_customers_last_year", json!(10)),
        ]));
        assert_eq!(shaped.estimated_cac, 100.0);
        assert_eq!(shaped.ltv_cac_ratio, 3.0);
    }

    #[test]
    fn test_indicator_grades() {
        let graded = shape_health_indicators(row(&[
            ("revenue_growth", json!(7.5)),
            ("churn_rate", json!(2.0)),
            ("retention_rate", json!(50.0)),
            ("refund_rate", Value::Null),
        ]));
        let statuses: Vec<_> = graded.iter().map(|i| i.health_status).collect();
        assert_eq!(statuses, vec!["Good", "Excellent", "Poor", "Poor"]);
        assert_eq!(graded[3].value, None);
        assert_eq!(graded[1].unit, "%");
    }

    #[test]
    fn test_indicators_without_rows() {
        let graded = shape_health_indicators(ReportValue::Rows(vec![]));
        assert_eq!(graded.len(), 4);
        assert!(graded.iter().all(|i| i.value.is_none()));
    }

    #[test]
    fn test_cash_flow_key_per_window() {
        assert_eq!(cash_flow_projection("wp_", 90).key.as_str(), "cash_flow_projection_90");
        assert_ne!(
            cash_flow_projection("wp_", 30).statement,
            cash_flow_projection("wp_", 90).statement
        );
    }
}

//! Report catalog
//!
//! Each report is a pure function of the table prefix and its parameters
//! that renders one [`ReportQuery`]. [`ReportCatalog`] runs the query
//! through the engine and applies the report's shaping to the raw result:
//!
//! - single-row aggregates become a fixed record, zero-filled when empty
//! - change percentages are zero without a positive baseline
//! - list reports return an empty list when nothing matches

pub mod customers;
pub mod financial;
pub mod forecast;
pub mod licenses;
pub mod products;
pub mod revenue;
pub mod segments;
pub mod sql;
pub mod subscriptions;

pub use crate::engine::ReportQuery;
pub use customers::{ActivationFunnel, YoyChange};
pub use financial::{HealthIndicator, LtvCac, RunRate};
pub use forecast::{ForecastMonth, SeasonalMonth, MAX_FORECAST_MONTHS};
pub use subscriptions::{MrrBreakdown, UpcomingRenewals};

use chrono::NaiveDate;
use std::sync::Arc;

use crate::engine::ReportQueryEngine;
use crate::types::{ReportValue, Result, Row, StatsError};

/// Optional inclusive date bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn all_time() -> Self {
        Self::default()
    }

    /// Validate `YYYY-MM-DD` bounds. Empty or missing means unbounded;
    /// anything that is not a real calendar date is rejected.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Ok(Self {
            start: parse_date("start_date", start)?,
            end: parse_date("end_date", end)?,
        })
    }

    /// ` AND col >= 'start' AND col <= 'end'` for the bounds that are set
    pub fn filter(&self, column: &str) -> String {
        let mut out = String::new();
        if let Some(start) = self.start {
            out.push_str(&format!(" AND {} >= '{}'", column, start.format("%Y-%m-%d")));
        }
        if let Some(end) = self.end {
            out.push_str(&format!(" AND {} <= '{}'", column, end.format("%Y-%m-%d")));
        }
        out
    }

    /// Like [`DateRange::filter`], with the end bound covering the whole day
    pub fn filter_through_end_of_day(&self, column: &str) -> String {
        let mut out = String::new();
        if let Some(start) = self.start {
            out.push_str(&format!(" AND {} >= '{}'", column, start.format("%Y-%m-%d")));
        }
        if let Some(end) = self.end {
            out.push_str(&format!(
                " AND {} <= '{} 23:59:59'",
                column,
                end.format("%Y-%m-%d")
            ));
        }
        out
    }
}

fn parse_date(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| StatsError::BadRequest(format!("Invalid parameter(s): {} ({:?})", name, raw)))
}

/// Named reports over the current data source
///
/// The data source is resolved once per report call, so every statement of
/// a call reads the same store and caches under the same key namespace.
#[derive(Clone)]
pub struct ReportCatalog {
    engine: Arc<ReportQueryEngine>,
}

impl ReportCatalog {
    pub fn new(engine: Arc<ReportQueryEngine>) -> Self {
        Self { engine }
    }

    fn run(&self, build: impl FnOnce(&str) -> ReportQuery) -> Result<ReportValue> {
        let source = self.engine.resolve_source();
        self.engine.run_cached_on(&source, &build(&source.prefix), None)
    }

    fn rows(&self, build: impl FnOnce(&str) -> ReportQuery) -> Result<Vec<Row>> {
        Ok(self.run(build)?.into_rows())
    }

    pub fn new_customers_by_month(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| customers::new_customers_by_month(p, range))
    }

    pub fn new_customers_yoy_change(&self) -> Result<YoyChange> {
        Ok(customers::shape_yoy(self.run(customers::new_customers_yoy)?))
    }

    pub fn revenue_by_month(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| revenue::revenue_by_month(p, range))
    }

    pub fn refunded_revenue_by_month(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| revenue::refunded_revenue_by_month(p, range))
    }

    pub fn mrr_by_month(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| subscriptions::mrr_by_month(p, range))
    }

    pub fn current_mrr_breakdown(&self) -> Result<MrrBreakdown> {
        let source = self.engine.resolve_source();
        let prefix = source.prefix.as_str();
        let new = self.engine.run_cached_on(&source, &subscriptions::new_mrr_current(prefix), None)?;
        let churned = self.engine.run_cached_on(&source, &subscriptions::churned_mrr_current(prefix), None)?;
        let existing = self.engine.run_cached_on(&source, &subscriptions::existing_mrr_current(prefix), None)?;
        Ok(subscriptions::shape_mrr_breakdown(new, existing, churned))
    }

    pub fn renewal_rates_by_month(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| subscriptions::renewal_rates_by_month(p, range))
    }

    pub fn upcoming_renewals(&self, days: u64) -> Result<UpcomingRenewals> {
        let value = self.run(|p| subscriptions::upcoming_renewals(p, days))?;
        Ok(subscriptions::shape_upcoming_renewals(value))
    }

    pub fn refund_rates_by_month(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| revenue::refund_rates_by_month(p, range))
    }

    /// Table names of the current store
    pub fn store_tables(&self) -> Result<Vec<String>> {
        Ok(licenses::shape_table_names(self.run(|_| licenses::store_tables())?))
    }

    /// Empty when the licensing add-on is not installed
    pub fn top_licenses(&self, limit: u64) -> Result<Vec<Row>> {
        let source = self.engine.resolve_source();
        let tables = self.engine.run_cached_on(&source, &licenses::store_tables(), None)?;
        if !licenses::has_licensing_tables(&licenses::shape_table_names(tables), &source.prefix) {
            return Ok(Vec::new());
        }
        let query = licenses::top_licenses(&source.prefix, limit);
        Ok(self.engine.run_cached_on(&source, &query, None)?.into_rows())
    }

    pub fn customer_lifetime_values(&self, range: &DateRange, limit: u64) -> Result<Vec<Row>> {
        self.rows(|p| customers::customer_lifetime_values(p, range, limit))
    }

    pub fn clv_by_cohort(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| customers::clv_by_cohort(p, range))
    }

    pub fn clv_distribution(&self) -> Result<Vec<Row>> {
        self.rows(customers::clv_distribution)
    }

    pub fn customer_health_scores(&self, limit: u64) -> Result<Vec<Row>> {
        self.rows(|p| customers::customer_health_scores(p, limit))
    }

    pub fn engagement_metrics(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| customers::engagement_metrics(p, range))
    }

    pub fn time_to_first_purchase(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| customers::time_to_first_purchase(p, range))
    }

    pub fn rfm_segments(&self) -> Result<Vec<Row>> {
        self.rows(segments::rfm_segments)
    }

    pub fn segment_performance(&self) -> Result<Vec<Row>> {
        self.rows(segments::segment_performance)
    }

    pub fn at_risk_customers(&self, limit: u64) -> Result<Vec<Row>> {
        self.rows(|p| segments::at_risk_customers(p, limit))
    }

    pub fn churn_prediction_scores(&self, limit: u64) -> Result<Vec<Row>> {
        self.rows(|p| segments::churn_prediction_scores(p, limit))
    }

    pub fn activation_funnel(&self, range: &DateRange) -> Result<ActivationFunnel> {
        let value = self.run(|p| customers::activation_funnel(p, range))?;
        Ok(customers::shape_activation_funnel(value))
    }

    pub fn top_products(&self, range: &DateRange, limit: u64) -> Result<Vec<Row>> {
        self.rows(|p| products::top_products(p, range, limit))
    }

    pub fn product_growth_trends(&self, range: &DateRange, limit: u64) -> Result<Vec<Row>> {
        self.rows(|p| products::product_growth_trends(p, range, limit))
    }

    pub fn product_performance_matrix(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| products::product_performance_matrix(p, range))
    }

    pub fn product_lifecycle_stages(&self) -> Result<Vec<Row>> {
        self.rows(products::product_lifecycle_stages)
    }

    pub fn demand_forecast(&self, days: u64, limit: u64) -> Result<Vec<Row>> {
        self.rows(|p| products::demand_forecast(p, days, limit))
    }

    pub fn revenue_breakdown(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| revenue::revenue_breakdown(p, range))
    }

    pub fn revenue_concentration(&self) -> Result<Vec<Row>> {
        self.rows(revenue::revenue_concentration)
    }

    pub fn payment_method_performance(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| revenue::payment_method_performance(p, range))
    }

    pub fn failed_payment_recovery(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| revenue::failed_payment_recovery(p, range))
    }

    pub fn revenue_velocity(&self, range: &DateRange) -> Result<Vec<Row>> {
        self.rows(|p| revenue::revenue_velocity(p, range))
    }

    pub fn cash_flow_projection(&self, days: u64) -> Result<Vec<Row>> {
        self.rows(|p| financial::cash_flow_projection(p, days))
    }

    pub fn ltv_cac_ratio(&self) -> Result<LtvCac> {
        Ok(financial::shape_ltv_cac(self.run(financial::ltv_cac_ratio)?))
    }

    pub fn revenue_run_rate(&self) -> Result<RunRate> {
        Ok(financial::shape_run_rate(self.run(financial::revenue_run_rate)?))
    }

    pub fn financial_health_indicators(&self) -> Result<Vec<HealthIndicator>> {
        let value = self.run(financial::financial_health_indicators)?;
        Ok(financial::shape_health_indicators(value))
    }

    pub fn revenue_forecast(&self, months: u64) -> Result<Vec<ForecastMonth>> {
        let months = months.min(MAX_FORECAST_MONTHS);
        let value = self.run(|p| forecast::revenue_forecast(p, months))?;
        Ok(forecast::shape_revenue_forecast(
            value,
            months,
            chrono::Utc::now().date_naive(),
        ))
    }

    pub fn seasonal_patterns(&self) -> Result<Vec<SeasonalMonth>> {
        Ok(forecast::shape_seasonal_patterns(self.run(forecast::seasonal_patterns)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_validation() {
        assert!(DateRange::parse(Some("2024-02-29"), None).is_ok());
        assert!(DateRange::parse(Some(""), Some("")).unwrap() == DateRange::all_time());
        assert!(DateRange::parse(None, None).unwrap() == DateRange::all_time());

        let err = DateRange::parse(Some("2024-02-30"), None).unwrap_err();
        assert!(matches!(err, StatsError::BadRequest(_)));
        assert!(DateRange::parse(None, Some("not-a-date")).is_err());
        assert!(DateRange::parse(Some("2023-02-29"), None).is_err());
    }

    #[test]
    fn test_filter_rendering() {
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-03-31")).unwrap();
        assert_eq!(
            range.filter("o.date_created"),
            " AND o.date_created >= '2024-01-01' AND o.date_created <= '2024-03-31'"
        );
        assert_eq!(DateRange::all_time().filter("x"), "");
        assert!(range
            .filter_through_end_of_day("c.date_created")
            .ends_with("'2024-03-31 23:59:59'"));
    }
}

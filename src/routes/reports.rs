//! Report endpoints
//!
//! Parameters are validated before anything touches the engine; the
//! report itself runs on a blocking thread since the store driver is
//! synchronous.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{error_response, success_response, QueryParams};
use crate::reports::{DateRange, ReportCatalog, MAX_FORECAST_MONTHS};
use crate::types::{Result, StatsError};

const DEFAULT_LIFETIME_VALUE_LIMIT: u64 = 100;
const DEFAULT_AT_RISK_LIMIT: u64 = 50;
const DEFAULT_CHURN_SCORE_LIMIT: u64 = 100;
const DEFAULT_UPCOMING_DAYS: u64 = 30;
const DEFAULT_TOP_LICENSES_LIMIT: u64 = 20;
const DEFAULT_HEALTH_SCORE_LIMIT: u64 = 100;
const DEFAULT_TOP_PRODUCTS_LIMIT: u64 = 20;
const DEFAULT_GROWTH_TREND_LIMIT: u64 = 10;
const DEFAULT_DEMAND_DAYS: u64 = 30;
const DEFAULT_DEMAND_LIMIT: u64 = 10;
const DEFAULT_CASH_FLOW_DAYS: u64 = 90;

/// Report endpoints under the API namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportRoute {
    CustomersByMonth,
    CustomersYoyChange,
    CustomerLifetimeValue,
    ClvCohorts,
    Rfm,
    Segments,
    AtRisk,
    ChurnScores,
    ActivationFunnel,
    ClvDistribution,
    HealthScores,
    Engagement,
    TimeToFirstPurchase,
    TopProducts,
    ProductGrowthTrends,
    ProductMatrix,
    ProductLifecycle,
    DemandForecast,
    RevenueByMonth,
    RevenueRefunded,
    RevenueForecast,
    RevenueSeasonal,
    RevenueBreakdown,
    RevenueConcentration,
    PaymentMethods,
    FailedPaymentRecovery,
    RevenueVelocity,
    CashFlow,
    LtvCac,
    RunRate,
    FinancialHealth,
    MrrByMonth,
    MrrCurrent,
    RenewalRates,
    UpcomingRenewals,
    RefundRates,
    TopLicenses,
}

impl ReportRoute {
    /// Match a path relative to the namespace, e.g. `/revenue/by-month`
    pub fn from_path(path: &str) -> Option<Self> {
        let route = match path.trim_end_matches('/') {
            "/customers/by-month" => Self::CustomersByMonth,
            "/customers/yoy-change" => Self::CustomersYoyChange,
            "/customers/lifetime-value" => Self::CustomerLifetimeValue,
            "/customers/clv-cohorts" => Self::ClvCohorts,
            "/customers/rfm" => Self::Rfm,
            "/customers/segments" => Self::Segments,
            "/customers/at-risk" => Self::AtRisk,
            "/customers/churn-scores" => Self::ChurnScores,
            "/customers/activation-funnel" => Self::ActivationFunnel,
            "/customers/clv-distribution" => Self::ClvDistribution,
            "/customers/health-scores" => Self::HealthScores,
            "/customers/engagement" => Self::Engagement,
            "/customers/time-to-first-purchase" => Self::TimeToFirstPurchase,
            "/products/top" => Self::TopProducts,
            "/products/growth-trends" => Self::ProductGrowthTrends,
            "/products/performance-matrix" => Self::ProductMatrix,
            "/products/lifecycle" => Self::ProductLifecycle,
            "/products/demand-forecast" => Self::DemandForecast,
            "/revenue/by-month" => Self::RevenueByMonth,
            "/revenue/refunded" => Self::RevenueRefunded,
            "/revenue/forecast" => Self::RevenueForecast,
            "/revenue/seasonal" => Self::RevenueSeasonal,
            "/revenue/breakdown" => Self::RevenueBreakdown,
            "/revenue/concentration" => Self::RevenueConcentration,
            "/revenue/payment-methods" => Self::PaymentMethods,
            "/revenue/failed-payment-recovery" => Self::FailedPaymentRecovery,
            "/revenue/velocity" => Self::RevenueVelocity,
            "/financial/cash-flow" => Self::CashFlow,
            "/financial/ltv-cac" => Self::LtvCac,
            "/financial/run-rate" => Self::RunRate,
            "/financial/health-indicators" => Self::FinancialHealth,
            "/mrr/by-month" => Self::MrrByMonth,
            "/mrr/current" => Self::MrrCurrent,
            "/renewals/rates" => Self::RenewalRates,
            "/renewals/upcoming" => Self::UpcomingRenewals,
            "/refunds/rates" => Self::RefundRates,
            "/licenses/top" => Self::TopLicenses,
            _ => return None,
        };
        Some(route)
    }
}

/// A report call with validated parameters
#[derive(Debug, Clone, Copy)]
enum ReportRequest {
    Ranged(ReportRoute, DateRange),
    RangedLimit(ReportRoute, DateRange, u64),
    Count(ReportRoute, u64),
    /// Horizon in days and a result limit
    Window(ReportRoute, u64, u64),
    Plain(ReportRoute),
}

impl ReportRequest {
    fn validate(route: ReportRoute, params: &QueryParams) -> Result<Self> {
        use ReportRoute::*;

        let request = match route {
            CustomersByMonth | ClvCohorts | ActivationFunnel | Engagement
            | TimeToFirstPurchase | ProductMatrix | RevenueByMonth | RevenueRefunded
            | RevenueBreakdown | PaymentMethods | FailedPaymentRecovery | RevenueVelocity
            | MrrByMonth | RenewalRates | RefundRates => Self::Ranged(route, params.date_range()?),
            CustomerLifetimeValue => Self::RangedLimit(
                route,
                params.date_range()?,
                params.absint("limit", DEFAULT_LIFETIME_VALUE_LIMIT)?,
            ),
            TopProducts => Self::RangedLimit(
                route,
                params.date_range()?,
                params.absint("limit", DEFAULT_TOP_PRODUCTS_LIMIT)?,
            ),
            ProductGrowthTrends => Self::RangedLimit(
                route,
                params.date_range()?,
                params.absint("limit", DEFAULT_GROWTH_TREND_LIMIT)?,
            ),
            DemandForecast => Self::Window(
                route,
                params.absint("days", DEFAULT_DEMAND_DAYS)?,
                params.absint("limit", DEFAULT_DEMAND_LIMIT)?,
            ),
            HealthScores => Self::Count(route, params.absint("limit", DEFAULT_HEALTH_SCORE_LIMIT)?),
            CashFlow => Self::Count(route, params.absint("days", DEFAULT_CASH_FLOW_DAYS)?),
            AtRisk => Self::Count(route, params.absint("limit", DEFAULT_AT_RISK_LIMIT)?),
            ChurnScores => Self::Count(route, params.absint("limit", DEFAULT_CHURN_SCORE_LIMIT)?),
            RevenueForecast => Self::Count(route, params.absint("months", MAX_FORECAST_MONTHS)?),
            UpcomingRenewals => Self::Count(route, params.absint("days", DEFAULT_UPCOMING_DAYS)?),
            TopLicenses => Self::Count(route, params.absint("limit", DEFAULT_TOP_LICENSES_LIMIT)?),
            CustomersYoyChange | Rfm | Segments | ClvDistribution | ProductLifecycle
            | RevenueSeasonal | RevenueConcentration | LtvCac | RunRate | FinancialHealth
            | MrrCurrent => Self::Plain(route),
        };
        Ok(request)
    }

    fn execute(self, catalog: &ReportCatalog) -> Result<Value> {
        use ReportRoute::*;

        match self {
            Self::Ranged(route, range) => match route {
                CustomersByMonth => to_value(catalog.new_customers_by_month(&range)?),
                ClvCohorts => to_value(catalog.clv_by_cohort(&range)?),
                ActivationFunnel => to_value(catalog.activation_funnel(&range)?),
                Engagement => to_value(catalog.engagement_metrics(&range)?),
                TimeToFirstPurchase => to_value(catalog.time_to_first_purchase(&range)?),
                ProductMatrix => to_value(catalog.product_performance_matrix(&range)?),
                RevenueBreakdown => to_value(catalog.revenue_breakdown(&range)?),
                PaymentMethods => to_value(catalog.payment_method_performance(&range)?),
                FailedPaymentRecovery => to_value(catalog.failed_payment_recovery(&range)?),
                RevenueVelocity => to_value(catalog.revenue_velocity(&range)?),
                RevenueByMonth => to_value(catalog.revenue_by_month(&range)?),
                RevenueRefunded => to_value(catalog.refunded_revenue_by_month(&range)?),
                MrrByMonth => to_value(catalog.mrr_by_month(&range)?),
                RenewalRates => to_value(catalog.renewal_rates_by_month(&range)?),
                RefundRates => to_value(catalog.refund_rates_by_month(&range)?),
                other => Err(mismatch(other)),
            },
            Self::RangedLimit(route, range, limit) => match route {
                CustomerLifetimeValue => to_value(catalog.customer_lifetime_values(&range, limit)?),
                TopProducts => to_value(catalog.top_products(&range, limit)?),
                ProductGrowthTrends => to_value(catalog.product_growth_trends(&range, limit)?),
                other => Err(mismatch(other)),
            },
            Self::Window(DemandForecast, days, limit) => to_value(catalog.demand_forecast(days, limit)?),
            Self::Window(other, _, _) => Err(mismatch(other)),
            Self::Count(route, n) => match route {
                AtRisk => to_value(catalog.at_risk_customers(n)?),
                ChurnScores => to_value(catalog.churn_prediction_scores(n)?),
                RevenueForecast => to_value(catalog.revenue_forecast(n)?),
                UpcomingRenewals => to_value(catalog.upcoming_renewals(n)?),
                TopLicenses => to_value(catalog.top_licenses(n)?),
                HealthScores => to_value(catalog.customer_health_scores(n)?),
                CashFlow => to_value(catalog.cash_flow_projection(n)?),
                other => Err(mismatch(other)),
            },
            Self::Plain(route) => match route {
                CustomersYoyChange => to_value(catalog.new_customers_yoy_change()?),
                Rfm => to_value(catalog.rfm_segments()?),
                Segments => to_value(catalog.segment_performance()?),
                ClvDistribution => to_value(catalog.clv_distribution()?),
                ProductLifecycle => to_value(catalog.product_lifecycle_stages()?),
                RevenueConcentration => to_value(catalog.revenue_concentration()?),
                LtvCac => to_value(catalog.ltv_cac_ratio()?),
                RunRate => to_value(catalog.revenue_run_rate()?),
                FinancialHealth => to_value(catalog.financial_health_indicators()?),
                RevenueSeasonal => to_value(catalog.seasonal_patterns()?),
                MrrCurrent => to_value(catalog.current_mrr_breakdown()?),
                other => Err(mismatch(other)),
            },
        }
    }
}

fn to_value<T: Serialize>(data: T) -> Result<Value> {
    Ok(serde_json::to_value(data)?)
}

fn mismatch(route: ReportRoute) -> StatsError {
    StatsError::Internal(format!("Parameters do not match report {:?}", route))
}

/// Validate and run one report, answering with the JSON envelope
pub async fn handle_report(
    catalog: ReportCatalog,
    route: ReportRoute,
    params: QueryParams,
) -> Response<Full<Bytes>> {
    debug!(?route, "Running report");

    let request = match ReportRequest::validate(route, &params) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    let result = tokio::task::spawn_blocking(move || request.execute(&catalog))
        .await
        .map_err(|e| StatsError::Internal(format!("Report task failed: {}", e)));

    match result {
        Ok(Ok(data)) => success_response(data),
        Ok(Err(e)) | Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(
            ReportRoute::from_path("/revenue/by-month"),
            Some(ReportRoute::RevenueByMonth)
        );
        assert_eq!(
            ReportRoute::from_path("/licenses/top/"),
            Some(ReportRoute::TopLicenses)
        );
        assert_eq!(
            ReportRoute::from_path("/products/demand-forecast"),
            Some(ReportRoute::DemandForecast)
        );
        assert_eq!(
            ReportRoute::from_path("/financial/run-rate"),
            Some(ReportRoute::RunRate)
        );
        assert_eq!(ReportRoute::from_path("/revenue"), None);
        assert_eq!(ReportRoute::from_path("/cache/clear"), None);
    }

    #[test]
    fn test_validation_rejects_bad_dates() {
        let params = QueryParams::parse(Some("start_date=2024-02-30")).unwrap();
        let err = ReportRequest::validate(ReportRoute::RevenueByMonth, &params).unwrap_err();
        assert!(matches!(err, StatsError::BadRequest(_)));

        // routes without a range ignore date parameters
        assert!(ReportRequest::validate(ReportRoute::Rfm, &params).is_ok());
    }

    #[test]
    fn test_validation_defaults() {
        let params = QueryParams::default();
        assert!(matches!(
            ReportRequest::validate(ReportRoute::AtRisk, &params).unwrap(),
            ReportRequest::Count(ReportRoute::AtRisk, 50)
        ));
        assert!(matches!(
            ReportRequest::validate(ReportRoute::RevenueForecast, &params).unwrap(),
            ReportRequest::Count(ReportRoute::RevenueForecast, 6)
        ));
        assert!(matches!(
            ReportRequest::validate(ReportRoute::CustomerLifetimeValue, &params).unwrap(),
            ReportRequest::RangedLimit(_, _, 100)
        ));

        let params = QueryParams::parse(Some("days=-7")).unwrap();
        assert!(matches!(
            ReportRequest::validate(ReportRoute::UpcomingRenewals, &params).unwrap(),
            ReportRequest::Count(ReportRoute::UpcomingRenewals, 7)
        ));
        let params = QueryParams::parse(Some("limit=ten")).unwrap();
        assert!(ReportRequest::validate(ReportRoute::TopLicenses, &params).is_err());
    }

    #[test]
    fn test_product_and_financial_defaults() {
        let params = QueryParams::default();
        assert!(matches!(
            ReportRequest::validate(ReportRoute::TopProducts, &params).unwrap(),
            ReportRequest::RangedLimit(ReportRoute::TopProducts, _, 20)
        ));
        assert!(matches!(
            ReportRequest::validate(ReportRoute::DemandForecast, &params).unwrap(),
            ReportRequest::Window(ReportRoute::DemandForecast, 30, 10)
        ));
        assert!(matches!(
            ReportRequest::validate(ReportRoute::CashFlow, &params).unwrap(),
            ReportRequest::Count(ReportRoute::CashFlow, 90)
        ));

        let params = QueryParams::parse(Some("days=60&limit=5")).unwrap();
        assert!(matches!(
            ReportRequest::validate(ReportRoute::DemandForecast, &params).unwrap(),
            ReportRequest::Window(ReportRoute::DemandForecast, 60, 5)
        ));
    }
}

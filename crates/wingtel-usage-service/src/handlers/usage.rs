//! Usage query handlers.
//!
//! Both endpoints read only the rollup. Query parameters are taken as raw
//! strings and parsed here so that bad values come back as field-level
//! validation errors instead of extractor rejections.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use wingtel_usage_core::{
    ExceededPrice, ExceededPriceFilter, Metrics, MetricsFilter, PriceLimit, SubscriptionId,
    UsageError, UsageType,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for the price limit endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PriceLimitQuery {
    /// Threshold in whole currency units (required, positive).
    pub price_limit: Option<String>,
    /// Restrict to one subscription.
    pub subscription_id: Option<String>,
    /// Restrict to `data` or `voice`.
    pub type_of_usage: Option<String>,
}

/// Query parameters for the usage metrics endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct UsageMetricsQuery {
    /// Restrict to `data` or `voice`.
    pub type_of_usage: Option<String>,
    /// Inclusive lower bound, `YYYY-MM-DD`.
    #[serde(rename = "usage_date__gte")]
    pub usage_date_gte: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`.
    #[serde(rename = "usage_date__lte")]
    pub usage_date_lte: Option<String>,
}

/// A (subscription, usage type) group over its price limit.
#[derive(Debug, Serialize)]
pub struct ExceededPriceResponse {
    /// Subscription ID.
    pub subscription_id: u64,
    /// `data` or `voice`.
    pub type_of_usage: &'static str,
    /// Amount above the limit, formatted with two decimals.
    pub price_exceeded: String,
}

impl From<&ExceededPrice> for ExceededPriceResponse {
    fn from(row: &ExceededPrice) -> Self {
        Self {
            subscription_id: row.subscription_id.0,
            type_of_usage: row.usage_type.as_str(),
            price_exceeded: row.price_exceeded.to_string(),
        }
    }
}

/// Totals for one subscription.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    /// Subscription ID.
    pub subscription_id: u64,
    /// Summed price, formatted with two decimals.
    pub total_price: String,
    /// Summed quantity.
    pub total_used: i64,
}

impl From<&Metrics> for MetricsResponse {
    fn from(metrics: &Metrics) -> Self {
        Self {
            subscription_id: metrics.subscription_id.0,
            total_price: metrics.total_price.to_string(),
            total_used: metrics.total_used,
        }
    }
}

/// List subscriptions whose summed price exceeds `price_limit`.
pub async fn price_limit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PriceLimitQuery>,
) -> Result<Json<Vec<ExceededPriceResponse>>, ApiError> {
    let limit = PriceLimit::parse(present(query.price_limit.as_deref()))?;
    let filter = ExceededPriceFilter {
        subscription_id: parse_subscription(present(query.subscription_id.as_deref()))?,
        usage_type: parse_usage_type(present(query.type_of_usage.as_deref()))?,
    };

    let rows = state.queries.list_exceeded_price(limit, filter)?;

    tracing::debug!(
        price_limit = limit.units(),
        matches = rows.len(),
        "Listed subscriptions over price limit"
    );

    Ok(Json(rows.iter().map(ExceededPriceResponse::from).collect()))
}

/// Total price and usage for one subscription. Returns an empty list when
/// nothing matches.
pub async fn usage_metrics(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<String>,
    Query(query): Query<UsageMetricsQuery>,
) -> Result<Json<Vec<MetricsResponse>>, ApiError> {
    let subscription_id = SubscriptionId::from_str(&subscription_id)
        .map_err(|_| ApiError::NotFound(format!("subscription not found: {subscription_id}")))?;

    let filter = MetricsFilter {
        usage_type: parse_usage_type(present(query.type_of_usage.as_deref()))?,
        usage_date_gte: parse_date(present(query.usage_date_gte.as_deref()), "usage_date__gte")?,
        usage_date_lte: parse_date(present(query.usage_date_lte.as_deref()), "usage_date__lte")?,
    };

    let metrics = state.queries.get_metrics(subscription_id, filter)?;

    Ok(Json(metrics.iter().map(MetricsResponse::from).collect()))
}

/// Blank filter values count as absent.
fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_subscription(raw: Option<&str>) -> Result<Option<SubscriptionId>, UsageError> {
    raw.map(|s| {
        s.parse()
            .map_err(|_| UsageError::validation("subscription_id", format!("not a subscription id: {s}")))
    })
    .transpose()
}

fn parse_usage_type(raw: Option<&str>) -> Result<Option<UsageType>, UsageError> {
    raw.map(UsageType::from_str).transpose()
}

fn parse_date(raw: Option<&str>, field: &'static str) -> Result<Option<NaiveDate>, UsageError> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| UsageError::validation(field, format!("expected YYYY-MM-DD, got {s}")))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_absent() {
        assert_eq!(present(Some("  ")), None);
        assert_eq!(present(Some(" 7 ")), Some("7"));
        assert_eq!(present(None), None);
    }

    #[test]
    fn parse_date_reports_field() {
        let err = parse_date(Some("01/02/2024"), "usage_date__lte").unwrap_err();
        assert!(matches!(
            err,
            UsageError::Validation {
                field: "usage_date__lte",
                ..
            }
        ));
        assert_eq!(
            parse_date(Some("2024-01-02"), "usage_date__lte").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }

    #[test]
    fn parse_subscription_rejects_non_numeric() {
        assert!(parse_subscription(Some("abc")).is_err());
        assert_eq!(parse_subscription(Some("7")).unwrap(), Some(SubscriptionId(7)));
    }
}

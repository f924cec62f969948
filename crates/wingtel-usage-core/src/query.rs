//! Read-only projections over the rollup.
//!
//! Queries never look at raw records; everything here is answered from
//! aggregate rows supplied by an [`AggregateSource`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateKey, AggregateRow};
use crate::error::{Result, UsageError};
use crate::ids::SubscriptionId;
use crate::money::Cents;
use crate::usage::UsageType;

/// Selection over aggregate rows. Unset fields match everything; the date
/// bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateFilter {
    /// Only rows for this subscription.
    pub subscription_id: Option<SubscriptionId>,
    /// Only rows of this usage type.
    pub usage_type: Option<UsageType>,
    /// Only rows on or after this day.
    pub usage_date_gte: Option<NaiveDate>,
    /// Only rows on or before this day.
    pub usage_date_lte: Option<NaiveDate>,
}

impl AggregateFilter {
    /// Whether `key` is selected.
    #[must_use]
    pub fn matches(&self, key: &AggregateKey) -> bool {
        self.subscription_id.map_or(true, |s| s == key.subscription_id)
            && self.usage_type.map_or(true, |t| t == key.usage_type)
            && self.usage_date_gte.map_or(true, |d| key.usage_date >= d)
            && self.usage_date_lte.map_or(true, |d| key.usage_date <= d)
    }
}

/// Anything that can list aggregate rows.
pub trait AggregateSource {
    /// Return every aggregate row selected by `filter`, in key order.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Storage` if the rows cannot be read.
    fn scan_aggregates(&self, filter: &AggregateFilter) -> Result<Vec<AggregateRow>>;
}

impl AggregateSource for BTreeMap<AggregateKey, AggregateRow> {
    fn scan_aggregates(&self, filter: &AggregateFilter) -> Result<Vec<AggregateRow>> {
        Ok(self
            .values()
            .filter(|row| filter.matches(&row.key))
            .copied()
            .collect())
    }
}

impl<T: AggregateSource + ?Sized> AggregateSource for &T {
    fn scan_aggregates(&self, filter: &AggregateFilter) -> Result<Vec<AggregateRow>> {
        (**self).scan_aggregates(filter)
    }
}

impl<T: AggregateSource + ?Sized> AggregateSource for Arc<T> {
    fn scan_aggregates(&self, filter: &AggregateFilter) -> Result<Vec<AggregateRow>> {
        (**self).scan_aggregates(filter)
    }
}

/// A validated price threshold in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLimit(i64);

impl PriceLimit {
    /// Largest threshold whose cent value fits in `i64`.
    pub const MAX_UNITS: i64 = i64::MAX / 100;

    /// Validate a threshold.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Validation` unless `units` is positive and at
    /// most [`PriceLimit::MAX_UNITS`].
    pub fn new(units: i64) -> Result<Self> {
        if units <= 0 {
            return Err(UsageError::validation(
                "price_limit",
                "must be a positive integer",
            ));
        }
        if units > Self::MAX_UNITS {
            return Err(UsageError::validation(
                "price_limit",
                format!("must be at most {}", Self::MAX_UNITS),
            ));
        }
        Ok(Self(units))
    }

    /// Parse a raw query parameter.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Validation` if the value is missing,
    /// non-numeric, or not positive.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UsageError::validation("price_limit", "this field is required"))?;
        let units = raw.parse::<i64>().map_err(|_| {
            UsageError::validation("price_limit", format!("a valid integer is required, got {raw:?}"))
        })?;
        Self::new(units)
    }

    /// The threshold in whole units.
    #[must_use]
    pub const fn units(self) -> i64 {
        self.0
    }

    /// The threshold as an amount.
    #[must_use]
    pub const fn as_cents(self) -> Cents {
        // `new` caps units at MAX_UNITS, so this cannot overflow.
        Cents(self.0 * 100)
    }
}

/// Optional narrowing of a price-exceeded report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceededPriceFilter {
    /// Only this subscription.
    pub subscription_id: Option<SubscriptionId>,
    /// Only this usage type.
    pub usage_type: Option<UsageType>,
}

/// Optional narrowing of a metrics query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsFilter {
    /// Only this usage type.
    pub usage_type: Option<UsageType>,
    /// Inclusive lower day bound.
    pub usage_date_gte: Option<NaiveDate>,
    /// Inclusive upper day bound.
    pub usage_date_lte: Option<NaiveDate>,
}

impl MetricsFilter {
    /// Reject an inverted date range.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Validation` if the lower bound is after the
    /// upper bound.
    pub fn validate(&self) -> Result<()> {
        if let (Some(gte), Some(lte)) = (self.usage_date_gte, self.usage_date_lte) {
            if gte > lte {
                return Err(UsageError::validation(
                    "usage_date__gte",
                    format!("{gte} is after usage_date__lte {lte}"),
                ));
            }
        }
        Ok(())
    }
}

/// One (subscription, usage type) group whose summed price is over the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceededPrice {
    /// The subscription.
    pub subscription_id: SubscriptionId,
    /// The usage type.
    pub usage_type: UsageType,
    /// Summed price minus the limit; always positive.
    pub price_exceeded: Cents,
}

/// Summed totals for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// The subscription.
    pub subscription_id: SubscriptionId,
    /// Summed price.
    pub total_price: Cents,
    /// Summed quantity. Mixes kilobytes and seconds unless filtered by type.
    pub total_used: i64,
}

/// Threshold and totals queries over the rollup.
#[derive(Debug, Clone)]
pub struct QueryService<S> {
    source: S,
}

impl<S: AggregateSource> QueryService<S> {
    /// Create a query service reading from `source`.
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    /// List (subscription, usage type) groups whose price summed across all
    /// days is strictly greater than `limit`.
    ///
    /// Results are ordered by subscription then usage type.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Integrity` if a group's total overflows and
    /// propagates source errors.
    pub fn list_exceeded_price(
        &self,
        limit: PriceLimit,
        filter: ExceededPriceFilter,
    ) -> Result<Vec<ExceededPrice>> {
        let rows = self.source.scan_aggregates(&AggregateFilter {
            subscription_id: filter.subscription_id,
            usage_type: filter.usage_type,
            ..AggregateFilter::default()
        })?;

        let mut groups: BTreeMap<(SubscriptionId, UsageType), Cents> = BTreeMap::new();
        for row in rows {
            let total = groups
                .entry((row.key.subscription_id, row.key.usage_type))
                .or_default();
            *total = total
                .checked_add(row.total_price)
                .ok_or_else(|| overflow(row.key.subscription_id, "total_price"))?;
        }

        let limit = limit.as_cents();
        Ok(groups
            .into_iter()
            .filter(|(_, total)| *total > limit)
            .map(|((subscription_id, usage_type), total)| ExceededPrice {
                subscription_id,
                usage_type,
                price_exceeded: total - limit,
            })
            .collect())
    }

    /// Sum every row of `subscription_id` selected by `filter`.
    ///
    /// Returns `None` when no row matches.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Validation` for an inverted date range,
    /// `UsageError::Integrity` if a total overflows, and propagates source
    /// errors.
    pub fn get_metrics(
        &self,
        subscription_id: SubscriptionId,
        filter: MetricsFilter,
    ) -> Result<Option<Metrics>> {
        filter.validate()?;

        let rows = self.source.scan_aggregates(&AggregateFilter {
            subscription_id: Some(subscription_id),
            usage_type: filter.usage_type,
            usage_date_gte: filter.usage_date_gte,
            usage_date_lte: filter.usage_date_lte,
        })?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut metrics = Metrics {
            subscription_id,
            total_price: Cents::ZERO,
            total_used: 0,
        };
        for row in &rows {
            metrics.total_price = metrics
                .total_price
                .checked_add(row.total_price)
                .ok_or_else(|| overflow(subscription_id, "total_price"))?;
            metrics.total_used = metrics
                .total_used
                .checked_add(row.total_used)
                .ok_or_else(|| overflow(subscription_id, "total_used"))?;
        }

        Ok(Some(metrics))
    }
}

fn overflow(subscription_id: SubscriptionId, field: &str) -> UsageError {
    UsageError::Integrity(format!(
        "{field} of subscription {subscription_id} overflows across rows"
    ))
}

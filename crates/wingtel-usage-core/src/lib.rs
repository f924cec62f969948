//! Core types and the incremental aggregation engine for wingtel usage.
//!
//! This crate provides the foundational types used throughout the workspace:
//!
//! - **Identifiers**: `RecordId`, `SubscriptionId`, `SubscriptionRef`
//! - **Money**: `Cents`
//! - **Raw usage**: `UsageRecord`, `UsageType`
//! - **Rollup**: `AggregateKey`, `AggregateRow`, `UsageDelta`
//! - **Engine**: `AggregationEngine`, `AggregateTable`
//! - **Queries**: `QueryService`, `AggregateSource`
//!
//! # Rollup
//!
//! Every raw record contributes its price and quantity to exactly one rollup
//! row keyed by `(subscription, usage type, UTC day)`. The engine keeps each
//! row equal to the sum over the live raw records with that key; storage
//! layers call it from inside the transaction that writes the raw record.
//!
//! Prices are stored as `i64` cents so sums stay exact.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod ids;
pub mod money;
pub mod query;
pub mod usage;

pub use aggregate::{AggregateKey, AggregateRow, UsageDelta};
pub use engine::{AggregateTable, AggregationEngine, ZeroRowPolicy};
pub use error::{Result, UsageError};
pub use ids::{Carrier, IdError, RecordId, SubscriptionId, SubscriptionRef};
pub use money::Cents;
pub use query::{
    AggregateFilter, AggregateSource, ExceededPrice, ExceededPriceFilter, Metrics, MetricsFilter,
    PriceLimit, QueryService,
};
pub use usage::{UsageRecord, UsageType};

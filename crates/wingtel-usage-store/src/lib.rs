//! `RocksDB` storage layer for wingtel usage.
//!
//! This crate persists raw usage records and the rollup derived from them,
//! using a `RocksDB` `TransactionDB` so each raw write and its aggregate
//! adjustment commit together.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `usage_records`: Raw usage records, keyed by `record_id`
//! - `aggregates`: Rollup rows, keyed by `subscription_id || usage_type || day`
//!
//! Every mutation runs in one transaction that locks the raw record (for
//! updates and deletes) and the affected rollup rows with exclusive
//! row locks before reading them. Writers on the same rollup key therefore
//! serialize; writers on different keys proceed in parallel.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use wingtel_usage_core::{Cents, SubscriptionId, UsageRecord};
//! use wingtel_usage_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/wingtel-usage-db").unwrap();
//!
//! let record = UsageRecord::data(SubscriptionId(7), Utc::now(), Cents(5000), 200).unwrap();
//! store.insert_record(&record).unwrap();
//!
//! let row = store.get_aggregate(&record.aggregate_key()).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::{RocksStore, StoreOptions};

use serde::Serialize;
use wingtel_usage_core::{
    AggregateFilter, AggregateKey, AggregateRow, Cents, RecordId, UsageRecord,
};

/// The storage trait defining all database operations.
///
/// Raw-record writes are the only way rollup rows change; implementations
/// must apply the aggregation engine inside the same atomic unit as the raw
/// write.
pub trait Store: Send + Sync {
    // =========================================================================
    // Raw Record Operations
    // =========================================================================

    /// Insert a new raw record and add it to the rollup.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateRecord` if the id is already taken.
    /// - `StoreError::Usage` if validation or aggregation fails.
    fn insert_record(&self, record: &UsageRecord) -> Result<()>;

    /// Get a raw record by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_record(&self, id: &RecordId) -> Result<Option<UsageRecord>>;

    /// Replace a raw record and move its contribution in the rollup.
    ///
    /// Returns the record as it was before the update.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the record doesn't exist.
    /// - `StoreError::Usage` if validation or aggregation fails.
    fn update_record(&self, record: &UsageRecord) -> Result<UsageRecord>;

    /// Delete a raw record and remove its contribution from the rollup.
    ///
    /// Returns the deleted record.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the record doesn't exist.
    /// - `StoreError::Usage` if aggregation fails.
    fn delete_record(&self, id: &RecordId) -> Result<UsageRecord>;

    /// List raw records in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_records(&self, limit: usize, offset: usize) -> Result<Vec<UsageRecord>>;

    // =========================================================================
    // Aggregate Operations
    // =========================================================================

    /// Get a rollup row by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_aggregate(&self, key: &AggregateKey) -> Result<Option<AggregateRow>>;

    /// List rollup rows selected by `filter`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_aggregates(&self, filter: &AggregateFilter) -> Result<Vec<AggregateRow>>;

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Recompute the whole rollup from raw records.
    ///
    /// Returns the number of rows written. Rows that no longer have live
    /// records are handled by the engine's zero-row policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn rebuild_aggregates(&self) -> Result<usize>;

    /// Compare the rollup against a recompute from raw records without
    /// writing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn audit_aggregates(&self) -> Result<Vec<AggregateDrift>>;
}

/// A rollup row whose stored totals disagree with its raw records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateDrift {
    /// The diverging key.
    pub key: AggregateKey,
    /// Stored price, zero if the row is missing.
    pub stored_price: Cents,
    /// Stored usage, zero if the row is missing.
    pub stored_used: i64,
    /// Sum of raw prices.
    pub expected_price: Cents,
    /// Sum of raw quantities.
    pub expected_used: i64,
}

//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Raw usage records, keyed by `record_id` (ULID).
    pub const USAGE_RECORDS: &str = "usage_records";

    /// Rollup rows, keyed by `subscription_id || usage_type || day`.
    pub const AGGREGATES: &str = "aggregates";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::USAGE_RECORDS, cf::AGGREGATES]
}

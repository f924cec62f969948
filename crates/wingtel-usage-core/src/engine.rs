//! Incremental aggregation engine.
//!
//! The engine turns one raw-record mutation into the matching adjustment of
//! the rollup. It owns no storage: the caller hands it an [`AggregateTable`]
//! bound to the same transaction as the raw write, so both commit or neither
//! does.
//!
//! For updates the caller must pass the record as it was persisted *before*
//! the write, not a copy already carrying the new values; otherwise the old
//! contribution is never removed.

use std::collections::BTreeMap;

use crate::aggregate::{AggregateKey, AggregateRow};
use crate::error::{Result, UsageError};
use crate::usage::UsageRecord;

/// Transactional access to rollup rows.
pub trait AggregateTable {
    /// Read the row for `key` and hold an exclusive lock on it until the
    /// enclosing transaction ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be read or locked.
    fn lock(&mut self, key: &AggregateKey) -> Result<Option<AggregateRow>>;

    /// Write a row, replacing any previous value for its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn store(&mut self, row: &AggregateRow) -> Result<()>;

    /// Remove the row for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn remove(&mut self, key: &AggregateKey) -> Result<()>;
}

/// Unlocked in-memory table, used for previews and tests.
impl AggregateTable for BTreeMap<AggregateKey, AggregateRow> {
    fn lock(&mut self, key: &AggregateKey) -> Result<Option<AggregateRow>> {
        Ok(self.get(key).copied())
    }

    fn store(&mut self, row: &AggregateRow) -> Result<()> {
        self.insert(row.key, *row);
        Ok(())
    }

    fn remove(&mut self, key: &AggregateKey) -> Result<()> {
        BTreeMap::remove(self, key);
        Ok(())
    }
}

/// What happens to a row whose totals drop back to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZeroRowPolicy {
    /// Leave the `(0, 0)` row in place.
    #[default]
    Keep,
    /// Delete the row.
    Delete,
}

/// Applies raw-record mutations to the rollup.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationEngine {
    zero_rows: ZeroRowPolicy,
}

impl AggregationEngine {
    /// Create an engine with the given zero-row policy.
    #[must_use]
    pub const fn new(zero_rows: ZeroRowPolicy) -> Self {
        Self { zero_rows }
    }

    /// The configured zero-row policy.
    #[must_use]
    pub const fn zero_row_policy(&self) -> ZeroRowPolicy {
        self.zero_rows
    }

    /// Account for a newly inserted record.
    ///
    /// # Errors
    ///
    /// Propagates table errors; returns `UsageError::Integrity` if the
    /// record carries a negative contribution.
    pub fn on_insert<T>(&self, table: &mut T, record: &UsageRecord) -> Result<()>
    where
        T: AggregateTable + ?Sized,
    {
        let key = record.aggregate_key();
        let row = match table.lock(&key)? {
            Some(mut row) => {
                row.apply(record.contribution())?;
                row
            }
            None => AggregateRow::create(key, record.contribution())?,
        };
        table.store(&row)
    }

    /// Account for `old` being replaced by `new`.
    ///
    /// `old` must be the previously persisted state of the record.
    ///
    /// # Errors
    ///
    /// - `UsageError::Validation` if the update changes the usage type.
    /// - `UsageError::Integrity` if the old contribution is not present in
    ///   the rollup, or the records have different ids.
    pub fn on_update<T>(&self, table: &mut T, old: &UsageRecord, new: &UsageRecord) -> Result<()>
    where
        T: AggregateTable + ?Sized,
    {
        if old.id != new.id {
            return Err(UsageError::Integrity(format!(
                "update pairs different records: {} and {}",
                old.id, new.id
            )));
        }
        if old.usage_type != new.usage_type {
            return Err(UsageError::validation(
                "type_of_usage",
                "usage type of an existing record cannot change",
            ));
        }

        let old_key = old.aggregate_key();
        let new_key = new.aggregate_key();

        if old_key == new_key {
            let mut row = Self::require(table.lock(&old_key)?, &old_key)?;
            row.apply(new.contribution() - old.contribution())?;
            return self.persist(table, &row);
        }

        // Lock both rows in key order so two updates moving records in
        // opposite directions cannot deadlock.
        let (old_row, new_row) = if old_key < new_key {
            let old_row = table.lock(&old_key)?;
            (old_row, table.lock(&new_key)?)
        } else {
            let new_row = table.lock(&new_key)?;
            (table.lock(&old_key)?, new_row)
        };

        let mut old_row = Self::require(old_row, &old_key)?;
        old_row.apply(-old.contribution())?;

        let new_row = match new_row {
            Some(mut row) => {
                row.apply(new.contribution())?;
                row
            }
            None => AggregateRow::create(new_key, new.contribution())?,
        };

        self.persist(table, &old_row)?;
        table.store(&new_row)
    }

    /// Account for a deleted record.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Integrity` if the row is missing or holds less
    /// than the record's contribution.
    pub fn on_delete<T>(&self, table: &mut T, record: &UsageRecord) -> Result<()>
    where
        T: AggregateTable + ?Sized,
    {
        let key = record.aggregate_key();
        let mut row = Self::require(table.lock(&key)?, &key)?;
        row.apply(-record.contribution())?;
        self.persist(table, &row)
    }

    /// Compute the rollup of `records` from scratch.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Integrity` if a record has a negative
    /// contribution or a total overflows.
    pub fn recompute<'a, I>(records: I) -> Result<BTreeMap<AggregateKey, AggregateRow>>
    where
        I: IntoIterator<Item = &'a UsageRecord>,
    {
        let mut rows = BTreeMap::new();
        for record in records {
            let key = record.aggregate_key();
            rows.entry(key)
                .or_insert_with(|| AggregateRow::zero(key))
                .apply(record.contribution())?;
        }
        Ok(rows)
    }

    fn require(row: Option<AggregateRow>, key: &AggregateKey) -> Result<AggregateRow> {
        row.ok_or_else(|| UsageError::Integrity(format!("missing aggregate row {key}")))
    }

    fn persist<T>(&self, table: &mut T, row: &AggregateRow) -> Result<()>
    where
        T: AggregateTable + ?Sized,
    {
        if row.is_zero() && self.zero_rows == ZeroRowPolicy::Delete {
            table.remove(&row.key)
        } else {
            table.store(row)
        }
    }
}

//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait
//! on top of a pessimistic `TransactionDB`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, MultiThreaded, Options,
    Transaction, TransactionDB, TransactionDBOptions,
};
use serde::{Deserialize, Serialize};

use wingtel_usage_core::{
    AggregateFilter, AggregateKey, AggregateRow, AggregateSource, AggregateTable,
    AggregationEngine, Cents, RecordId, UsageDelta, UsageError, UsageRecord, ZeroRowPolicy,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AggregateDrift, Store};

type Db = TransactionDB<MultiThreaded>;

/// Default time a writer waits for a row lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT_MS: i64 = 5_000;

/// Options for opening a [`RocksStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Milliseconds to wait for a row lock.
    pub lock_timeout_ms: i64,
    /// What to do with rollup rows that drop to zero.
    pub zero_rows: ZeroRowPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            zero_rows: ZeroRowPolicy::Keep,
        }
    }
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<Db>,
    engine: AggregationEngine,
    /// Mutations hold this shared; rebuild and audit hold it exclusively so
    /// they see a quiescent raw table.
    maintenance: RwLock<()>,
}

/// Rollup row value; the key lives in the `RocksDB` key.
#[derive(Serialize, Deserialize)]
struct StoredTotals {
    total_price: Cents,
    total_used: i64,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open or create a database with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(options.lock_timeout_ms);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, &txn_opts, path, cf_descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            engine: AggregationEngine::new(options.zero_rows),
            maintenance: RwLock::new(()),
        })
    }

    /// Replace the aggregation engine used by mutations.
    #[must_use]
    pub fn with_engine(mut self, engine: AggregationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// The aggregation engine applied on every raw write.
    #[must_use]
    pub const fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn shared(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.maintenance
            .read()
            .map_err(|_| StoreError::Database("maintenance lock poisoned".into()))
    }

    fn exclusive(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.maintenance
            .write()
            .map_err(|_| StoreError::Database("maintenance lock poisoned".into()))
    }

    /// Read a raw record inside `txn`, locking it until the transaction ends.
    fn lock_record(
        txn: &Transaction<'_, Db>,
        cf_records: &Arc<BoundColumnFamily<'_>>,
        id: &RecordId,
    ) -> Result<UsageRecord> {
        txn.get_for_update_cf(cf_records, keys::record_key(id), true)?
            .map(|data| deserialize(&data))
            .transpose()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "usage record",
                id: id.to_string(),
            })
    }

    /// Run one engine operation against the rollup rows visible to `txn`.
    fn aggregate<'t, 'db, F>(
        txn: &'t Transaction<'db, Db>,
        cf_aggregates: &'t Arc<BoundColumnFamily<'db>>,
        record: &UsageRecord,
        op: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut TxAggregates<'t, 'db>) -> wingtel_usage_core::Result<()>,
    {
        let mut table = TxAggregates {
            txn,
            cf: cf_aggregates,
            failure: None,
        };

        let Err(err) = op(&mut table) else {
            return Ok(());
        };

        if let UsageError::Integrity(msg) = &err {
            tracing::error!(
                record_id = %record.id,
                subscription_id = %record.subscription.id,
                error = %msg,
                "Aggregate integrity violation, rolling back"
            );
        }

        Err(table.failure.unwrap_or(StoreError::Usage(err)))
    }

    fn scan_records(&self) -> Result<Vec<UsageRecord>> {
        let cf = self.cf(cf::USAGE_RECORDS)?;
        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item?;
                deserialize(&value)
            })
            .collect()
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Raw Record Operations
    // =========================================================================

    fn insert_record(&self, record: &UsageRecord) -> Result<()> {
        record.validate()?;
        let _shared = self.shared()?;

        let cf_records = self.cf(cf::USAGE_RECORDS)?;
        let cf_aggregates = self.cf(cf::AGGREGATES)?;
        let key = keys::record_key(&record.id);

        let txn = self.db.transaction();

        if txn.get_for_update_cf(&cf_records, &key, true)?.is_some() {
            return Err(StoreError::DuplicateRecord {
                id: record.id.to_string(),
            });
        }

        Self::aggregate(&txn, &cf_aggregates, record, |table| {
            self.engine.on_insert(table, record)
        })?;

        txn.put_cf(&cf_records, &key, serialize(record)?)?;
        txn.commit()?;

        tracing::debug!(
            record_id = %record.id,
            subscription_id = %record.subscription.id,
            usage_type = %record.usage_type,
            price = %record.price,
            quantity = record.quantity,
            "Inserted usage record"
        );

        Ok(())
    }

    fn get_record(&self, id: &RecordId) -> Result<Option<UsageRecord>> {
        let cf = self.cf(cf::USAGE_RECORDS)?;

        self.db
            .get_cf(&cf, keys::record_key(id))?
            .map(|data| deserialize(&data))
            .transpose()
    }

    fn update_record(&self, record: &UsageRecord) -> Result<UsageRecord> {
        record.validate()?;
        let _shared = self.shared()?;

        let cf_records = self.cf(cf::USAGE_RECORDS)?;
        let cf_aggregates = self.cf(cf::AGGREGATES)?;

        let txn = self.db.transaction();

        // The persisted state must be read before the new values are
        // written; it is the contribution the rollup currently holds.
        let previous = Self::lock_record(&txn, &cf_records, &record.id)?;

        Self::aggregate(&txn, &cf_aggregates, record, |table| {
            self.engine.on_update(table, &previous, record)
        })?;

        txn.put_cf(&cf_records, keys::record_key(&record.id), serialize(record)?)?;
        txn.commit()?;

        tracing::debug!(
            record_id = %record.id,
            old_key = %previous.aggregate_key(),
            new_key = %record.aggregate_key(),
            "Updated usage record"
        );

        Ok(previous)
    }

    fn delete_record(&self, id: &RecordId) -> Result<UsageRecord> {
        let _shared = self.shared()?;

        let cf_records = self.cf(cf::USAGE_RECORDS)?;
        let cf_aggregates = self.cf(cf::AGGREGATES)?;

        let txn = self.db.transaction();
        let previous = Self::lock_record(&txn, &cf_records, id)?;

        Self::aggregate(&txn, &cf_aggregates, &previous, |table| {
            self.engine.on_delete(table, &previous)
        })?;

        txn.delete_cf(&cf_records, keys::record_key(id))?;
        txn.commit()?;

        tracing::debug!(record_id = %id, key = %previous.aggregate_key(), "Deleted usage record");

        Ok(previous)
    }

    fn list_records(&self, limit: usize, offset: usize) -> Result<Vec<UsageRecord>> {
        let cf = self.cf(cf::USAGE_RECORDS)?;

        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .skip(offset)
            .take(limit)
            .map(|item| {
                let (_, value) = item?;
                deserialize(&value)
            })
            .collect()
    }

    // =========================================================================
    // Aggregate Operations
    // =========================================================================

    fn get_aggregate(&self, key: &AggregateKey) -> Result<Option<AggregateRow>> {
        let cf = self.cf(cf::AGGREGATES)?;

        self.db
            .get_cf(&cf, keys::aggregate_key(key))?
            .map(|data| decode_row(*key, &data))
            .transpose()
    }

    fn list_aggregates(&self, filter: &AggregateFilter) -> Result<Vec<AggregateRow>> {
        let cf = self.cf(cf::AGGREGATES)?;

        let prefix = filter
            .subscription_id
            .map(|sub| keys::aggregate_prefix(sub, filter.usage_type));
        let mode = match &prefix {
            Some(prefix) => IteratorMode::From(prefix, Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut rows = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item?;

            if let Some(prefix) = &prefix {
                if !key.starts_with(prefix) {
                    break;
                }
            }

            let key = keys::decode_aggregate_key(&key)?;
            if filter.matches(&key) {
                rows.push(decode_row(key, &value)?);
            }
        }

        Ok(rows)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    fn rebuild_aggregates(&self) -> Result<usize> {
        let _exclusive = self.exclusive()?;

        let records = self.scan_records()?;
        let mut rows = AggregationEngine::recompute(&records)?;
        for existing in self.list_aggregates(&AggregateFilter::default())? {
            rows.entry(existing.key)
                .or_insert_with(|| AggregateRow::zero(existing.key));
        }

        let cf = self.cf(cf::AGGREGATES)?;
        let drop_zero_rows = self.engine.zero_row_policy() == ZeroRowPolicy::Delete;

        let txn = self.db.transaction();
        let mut written = 0;
        for row in rows.values() {
            let key = keys::aggregate_key(&row.key);
            if drop_zero_rows && row.is_zero() {
                txn.delete_cf(&cf, key)?;
            } else {
                txn.put_cf(&cf, key, encode_row(row)?)?;
                written += 1;
            }
        }
        txn.commit()?;

        tracing::info!(
            records = records.len(),
            rows = written,
            "Rebuilt usage aggregates from raw records"
        );

        Ok(written)
    }

    fn audit_aggregates(&self) -> Result<Vec<AggregateDrift>> {
        let _exclusive = self.exclusive()?;

        let expected = AggregationEngine::recompute(&self.scan_records()?)?;
        let stored: BTreeMap<AggregateKey, AggregateRow> = self
            .list_aggregates(&AggregateFilter::default())?
            .into_iter()
            .map(|row| (row.key, row))
            .collect();

        let all_keys: BTreeSet<AggregateKey> =
            expected.keys().chain(stored.keys()).copied().collect();

        let drift: Vec<AggregateDrift> = all_keys
            .into_iter()
            .filter_map(|key| {
                let want = expected.get(&key).copied().unwrap_or(AggregateRow::zero(key));
                let have = stored.get(&key).copied().unwrap_or(AggregateRow::zero(key));
                if UsageDelta::between(&have, &want).is_zero() {
                    return None;
                }
                Some(AggregateDrift {
                    key,
                    stored_price: have.total_price,
                    stored_used: have.total_used,
                    expected_price: want.total_price,
                    expected_used: want.total_used,
                })
            })
            .collect();

        if !drift.is_empty() {
            tracing::warn!(rows = drift.len(), "Aggregate audit found drift");
        }

        Ok(drift)
    }
}

impl AggregateSource for RocksStore {
    fn scan_aggregates(&self, filter: &AggregateFilter) -> wingtel_usage_core::Result<Vec<AggregateRow>> {
        self.list_aggregates(filter).map_err(UsageError::from)
    }
}

/// Rollup rows reached through an open transaction.
struct TxAggregates<'t, 'db> {
    txn: &'t Transaction<'db, Db>,
    cf: &'t Arc<BoundColumnFamily<'db>>,
    /// The storage error behind the last failed call, if any.
    failure: Option<StoreError>,
}

impl TxAggregates<'_, '_> {
    fn fail(&mut self, err: StoreError) -> UsageError {
        let converted = UsageError::Storage(err.to_string());
        self.failure = Some(err);
        converted
    }
}

impl AggregateTable for TxAggregates<'_, '_> {
    fn lock(&mut self, key: &AggregateKey) -> wingtel_usage_core::Result<Option<AggregateRow>> {
        let data = match self.txn.get_for_update_cf(self.cf, keys::aggregate_key(key), true) {
            Ok(data) => data,
            Err(e) => return Err(self.fail(e.into())),
        };

        data.map(|data| decode_row(*key, &data))
            .transpose()
            .map_err(|e| self.fail(e))
    }

    fn store(&mut self, row: &AggregateRow) -> wingtel_usage_core::Result<()> {
        let value = encode_row(row).map_err(|e| self.fail(e))?;
        self.txn
            .put_cf(self.cf, keys::aggregate_key(&row.key), value)
            .map_err(|e| self.fail(e.into()))
    }

    fn remove(&mut self, key: &AggregateKey) -> wingtel_usage_core::Result<()> {
        self.txn
            .delete_cf(self.cf, keys::aggregate_key(key))
            .map_err(|e| self.fail(e.into()))
    }
}

/// Serialize a value using CBOR.
fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a value from CBOR.
fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode_row(row: &AggregateRow) -> Result<Vec<u8>> {
    serialize(&StoredTotals {
        total_price: row.total_price,
        total_used: row.total_used,
    })
}

fn decode_row(key: AggregateKey, data: &[u8]) -> Result<AggregateRow> {
    let totals: StoredTotals = deserialize(data)?;
    Ok(AggregateRow {
        key,
        total_price: totals.total_price,
        total_used: totals.total_used,
    })
}

//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `transactions` - Append-only transaction log (key: principal | id)
//! - `snapshots` - Daily balance checkpoints (key: principal | day-end millis)
//! - `deltas` - Per (principal, day) cached delta sums (key: principal | yyyymmdd)
//! - `frozen` - Per-principal reserved amounts (key: principal)
//! - `principals` - Registry of ledger owners (key: principal)
//!
//! Transaction ids sort reverse-chronologically, so a forward scan within a
//! principal's prefix yields newest-first. Snapshot writes are upserts keyed
//! by (principal, end); racing rollups for the same day overwrite each other
//! with identical rows instead of failing.
//!
//! The delta read-modify-write operations run under striped mutexes so that
//! concurrent appends for the same (principal, day) never lose updates.

use crate::{
    error::{Error, Result},
    types::{Accounting, PrincipalId, Transaction, TransactionId},
    Config,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use rust_decimal::Decimal;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Column family names
const CF_TRANSACTIONS: &str = "transactions";
const CF_SNAPSHOTS: &str = "snapshots";
const CF_DELTAS: &str = "deltas";
const CF_FROZEN: &str = "frozen";
const CF_PRINCIPALS: &str = "principals";

/// Key separator between principal and sort suffix
const SEP: u8 = b'|';

/// Number of striped locks guarding read-modify-write operations
const WRITE_LOCK_STRIPES: usize = 64;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    write_locks: Vec<Mutex<()>>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_SNAPSHOTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_DELTAS, Self::cf_options_scalar()),
            ColumnFamilyDescriptor::new(CF_FROZEN, Self::cf_options_scalar()),
            ColumnFamilyDescriptor::new(CF_PRINCIPALS, Self::cf_options_scalar()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened balance store");

        let write_locks = (0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        Ok(Self {
            db: Arc::new(db),
            write_locks,
        })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_scalar() -> Options {
        let mut opts = Options::default();
        // Small, frequently rewritten values; favor speed over ratio
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key helpers

    fn principal_prefix(principal: &PrincipalId) -> Vec<u8> {
        let mut key = principal.as_str().as_bytes().to_vec();
        key.push(SEP);
        key
    }

    fn transaction_key(principal: &PrincipalId, id: &TransactionId) -> Vec<u8> {
        let mut key = Self::principal_prefix(principal);
        key.extend_from_slice(id.as_str().as_bytes());
        key
    }

    fn snapshot_key(principal: &PrincipalId, end: DateTime<Utc>) -> Vec<u8> {
        let mut key = Self::principal_prefix(principal);
        key.extend_from_slice(&end.timestamp_millis().to_be_bytes());
        key
    }

    fn delta_key(principal: &PrincipalId, day: NaiveDate) -> Vec<u8> {
        let mut key = Self::principal_prefix(principal);
        key.extend_from_slice(day.format("%Y%m%d").to_string().as_bytes());
        key
    }

    fn write_lock(&self, key: &[u8]) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.write_locks[(hasher.finish() as usize) % self.write_locks.len()]
    }

    // Transaction operations

    /// Append a transaction (upsert keyed by principal | id)
    pub fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let key = Self::transaction_key(&transaction.principal, &transaction.id);
        let value = bincode::serialize(transaction)?;

        self.db.put_cf(cf, key, &value)?;

        tracing::debug!(
            principal = %transaction.principal,
            id = %transaction.id,
            delta = %transaction.delta,
            "Transaction appended"
        );

        Ok(())
    }

    /// Get a transaction by (principal, id)
    pub fn get_transaction(
        &self,
        principal: &PrincipalId,
        id: &TransactionId,
    ) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let key = Self::transaction_key(principal, id);

        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Transactions created within `[from, to]`, newest first
    pub fn transactions_in_range(
        &self,
        principal: &PrincipalId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let prefix = Self::principal_prefix(principal);

        // Newest admissible instant -> smallest admissible key
        let mut start_key = prefix.clone();
        start_key.extend_from_slice(TransactionId::scan_start(to).as_bytes());
        let mut end_key = prefix.clone();
        end_key.extend_from_slice(TransactionId::scan_end(from).as_bytes());

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start_key, Direction::Forward));

        let mut transactions = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) || key.as_ref() >= end_key.as_slice() {
                break;
            }
            transactions.push(bincode::deserialize(&value)?);
        }

        Ok(transactions)
    }

    // Snapshot operations

    /// Upsert a daily snapshot keyed by (principal, end)
    pub fn put_snapshot(&self, snapshot: &Accounting) -> Result<()> {
        let cf = self.cf_handle(CF_SNAPSHOTS)?;
        let key = Self::snapshot_key(&snapshot.principal, snapshot.end);
        let value = bincode::serialize(snapshot)?;

        self.db.put_cf(cf, key, &value)?;

        tracing::debug!(
            principal = %snapshot.principal,
            end = %snapshot.end,
            balance = %snapshot.balance,
            "Snapshot written"
        );

        Ok(())
    }

    /// Point lookup of the snapshot ending exactly at `end`
    pub fn snapshot_at(
        &self,
        principal: &PrincipalId,
        end: DateTime<Utc>,
    ) -> Result<Option<Accounting>> {
        let cf = self.cf_handle(CF_SNAPSHOTS)?;
        let key = Self::snapshot_key(principal, end);

        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Newest snapshot with `lower_end <= end <= upper_end`, if any
    pub fn latest_snapshot(
        &self,
        principal: &PrincipalId,
        lower_end: DateTime<Utc>,
        upper_end: DateTime<Utc>,
    ) -> Result<Option<Accounting>> {
        let cf = self.cf_handle(CF_SNAPSHOTS)?;
        let prefix = Self::principal_prefix(principal);
        let upper_key = Self::snapshot_key(principal, upper_end);
        let lower_key = Self::snapshot_key(principal, lower_end);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&upper_key, Direction::Reverse));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) || key.as_ref() < lower_key.as_slice() {
                break;
            }
            return Ok(Some(bincode::deserialize(&value)?));
        }

        Ok(None)
    }

    // Delta cache operations

    /// Cached delta sum for (principal, day); zero when absent
    pub fn cached_delta(&self, principal: &PrincipalId, day: NaiveDate) -> Result<Decimal> {
        let cf = self.cf_handle(CF_DELTAS)?;
        let key = Self::delta_key(principal, day);

        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Overwrite the cached delta sum for (principal, day)
    pub fn set_cached_delta(
        &self,
        principal: &PrincipalId,
        day: NaiveDate,
        value: Decimal,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_DELTAS)?;
        let key = Self::delta_key(principal, day);
        let value = bincode::serialize(&crate::types::round2(value))?;

        self.db.put_cf(cf, key, &value)?;
        Ok(())
    }

    /// Atomically add `amount` to the cached delta sum, returning the new total
    ///
    /// The read-modify-write runs under a striped lock keyed by
    /// (principal, day); concurrent appenders serialize here instead of
    /// overwriting each other's increments.
    pub fn add_cached_delta(
        &self,
        principal: &PrincipalId,
        day: NaiveDate,
        amount: Decimal,
    ) -> Result<Decimal> {
        let cf = self.cf_handle(CF_DELTAS)?;
        let key = Self::delta_key(principal, day);

        let _guard = self.write_lock(&key).lock();

        let current: Decimal = match self.db.get_cf(cf, &key)? {
            Some(value) => bincode::deserialize(&value)?,
            None => Decimal::ZERO,
        };
        let total = crate::types::round2(current + amount);

        self.db.put_cf(cf, &key, bincode::serialize(&total)?)?;

        Ok(total)
    }

    /// Remove the cached delta entry for (principal, day)
    pub fn clear_cached_delta(&self, principal: &PrincipalId, day: NaiveDate) -> Result<()> {
        let cf = self.cf_handle(CF_DELTAS)?;
        let key = Self::delta_key(principal, day);

        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    // Frozen funds operations

    /// Reserved amount for a principal; zero when absent
    pub fn frozen(&self, principal: &PrincipalId) -> Result<Decimal> {
        let cf = self.cf_handle(CF_FROZEN)?;

        match self.db.get_cf(cf, principal.as_str().as_bytes())? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Atomically add a signed `amount` to the reserved total
    ///
    /// An entry that lands exactly on zero is deleted rather than stored.
    pub fn adjust_frozen(&self, principal: &PrincipalId, amount: Decimal) -> Result<Decimal> {
        let cf = self.cf_handle(CF_FROZEN)?;
        let key = principal.as_str().as_bytes().to_vec();

        let _guard = self.write_lock(&key).lock();

        let current: Decimal = match self.db.get_cf(cf, &key)? {
            Some(value) => bincode::deserialize(&value)?,
            None => Decimal::ZERO,
        };
        let total = crate::types::round2(current + amount);

        if total == Decimal::ZERO {
            self.db.delete_cf(cf, &key)?;
        } else {
            self.db.put_cf(cf, &key, bincode::serialize(&total)?)?;
        }

        Ok(total)
    }

    /// Delete the reserved-amount entry for a principal
    pub fn delete_frozen(&self, principal: &PrincipalId) -> Result<()> {
        let cf = self.cf_handle(CF_FROZEN)?;
        self.db.delete_cf(cf, principal.as_str().as_bytes())?;
        Ok(())
    }

    // Principal registry

    /// Register a ledger owner (idempotent)
    pub fn register_principal(&self, principal: &PrincipalId) -> Result<()> {
        let cf = self.cf_handle(CF_PRINCIPALS)?;
        self.db.put_cf(cf, principal.as_str().as_bytes(), &[])?;
        Ok(())
    }

    /// All registered ledger owners
    pub fn principals(&self) -> Result<Vec<PrincipalId>> {
        let cf = self.cf_handle(CF_PRINCIPALS)?;

        let mut principals = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            principals.push(PrincipalId::new(String::from_utf8_lossy(&key)));
        }

        Ok(principals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{end_of, start_of};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_transaction(principal: &PrincipalId, at: DateTime<Utc>, delta: Decimal) -> Transaction {
        Transaction {
            principal: principal.clone(),
            id: TransactionId::generate(at),
            delta,
            reason: 1,
            remark: "test".to_string(),
            reference: String::new(),
            correlation: "corr".to_string(),
            created: at,
        }
    }

    #[test]
    fn test_transaction_roundtrip() {
        let (storage, _temp) = test_storage();
        let principal = PrincipalId::new("P1");
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();

        let tx = test_transaction(&principal, at, Decimal::new(10050, 2));
        storage.put_transaction(&tx).unwrap();

        let read = storage.get_transaction(&principal, &tx.id).unwrap().unwrap();
        assert_eq!(read.delta, tx.delta);
        assert_eq!(read.id, tx.id);

        let missing = TransactionId::new("no-such-id");
        assert!(storage.get_transaction(&principal, &missing).unwrap().is_none());
    }

    #[test]
    fn test_range_scan_newest_first_and_inclusive() {
        let (storage, _temp) = test_storage();
        let principal = PrincipalId::new("P1");
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        let early = start_of(day);
        let late = end_of(day);
        let outside = start_of(day) - Duration::milliseconds(1);

        storage.put_transaction(&test_transaction(&principal, early, Decimal::ONE)).unwrap();
        storage.put_transaction(&test_transaction(&principal, late, Decimal::TWO)).unwrap();
        storage.put_transaction(&test_transaction(&principal, outside, Decimal::TEN)).unwrap();

        // A second principal must never bleed into the scan
        let other = PrincipalId::new("P2");
        storage.put_transaction(&test_transaction(&other, early, Decimal::ONE_HUNDRED)).unwrap();

        let transactions = storage.transactions_in_range(&principal, early, late).unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].delta, Decimal::TWO, "newest first");
        assert_eq!(transactions[1].delta, Decimal::ONE);
    }

    #[test]
    fn test_snapshot_point_and_range_lookup() {
        let (storage, _temp) = test_storage();
        let principal = PrincipalId::new("P1");
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        for offset in 0..3i64 {
            let end = end_of(day) - Duration::days(offset);
            storage
                .put_snapshot(&Accounting {
                    principal: principal.clone(),
                    end,
                    balance: Decimal::new(100 - offset, 0),
                    credits: Decimal::ZERO,
                    debits: Decimal::ZERO,
                    created: Utc::now(),
                })
                .unwrap();
        }

        let exact = storage.snapshot_at(&principal, end_of(day)).unwrap().unwrap();
        assert_eq!(exact.balance, Decimal::new(100, 0));

        // Bounded reverse scan picks the newest inside the window
        let upper = end_of(day) - Duration::days(1);
        let lower = upper - Duration::days(30);
        let latest = storage.latest_snapshot(&principal, lower, upper).unwrap().unwrap();
        assert_eq!(latest.balance, Decimal::new(99, 0));

        // Window entirely before the data finds nothing
        let none = storage
            .latest_snapshot(&principal, lower - Duration::days(60), upper - Duration::days(60))
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_snapshot_upsert_is_idempotent() {
        let (storage, _temp) = test_storage();
        let principal = PrincipalId::new("P1");
        let end = end_of(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        let mut snapshot = Accounting {
            principal: principal.clone(),
            end,
            balance: Decimal::new(7000, 2),
            credits: Decimal::new(10000, 2),
            debits: Decimal::new(-3000, 2),
            created: Utc::now(),
        };

        storage.put_snapshot(&snapshot).unwrap();
        snapshot.created = snapshot.created + Duration::seconds(5);
        storage.put_snapshot(&snapshot).unwrap();

        let read = storage.snapshot_at(&principal, end).unwrap().unwrap();
        assert_eq!(read.balance, Decimal::new(7000, 2));
    }

    #[test]
    fn test_delta_cache_lifecycle() {
        let (storage, _temp) = test_storage();
        let principal = PrincipalId::new("P1");
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        assert_eq!(storage.cached_delta(&principal, day).unwrap(), Decimal::ZERO);

        let total = storage.add_cached_delta(&principal, day, Decimal::new(10000, 2)).unwrap();
        assert_eq!(total, Decimal::new(10000, 2));
        let total = storage.add_cached_delta(&principal, day, Decimal::new(-3000, 2)).unwrap();
        assert_eq!(total, Decimal::new(7000, 2));

        storage.clear_cached_delta(&principal, day).unwrap();
        assert_eq!(storage.cached_delta(&principal, day).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_concurrent_delta_increments_lose_nothing() {
        let (storage, _temp) = test_storage();
        let storage = std::sync::Arc::new(storage);
        let principal = PrincipalId::new("P1");
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            let principal = principal.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    storage.add_cached_delta(&principal, day, Decimal::new(1, 2)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // 400 increments of 0.01
        assert_eq!(storage.cached_delta(&principal, day).unwrap(), Decimal::new(400, 2));
    }

    #[test]
    fn test_frozen_adjust_and_delete_at_zero() {
        let (storage, _temp) = test_storage();
        let principal = PrincipalId::new("P1");

        assert_eq!(storage.frozen(&principal).unwrap(), Decimal::ZERO);

        let total = storage.adjust_frozen(&principal, Decimal::new(5000, 2)).unwrap();
        assert_eq!(total, Decimal::new(5000, 2));

        // Landing exactly on zero removes the entry
        let total = storage.adjust_frozen(&principal, Decimal::new(-5000, 2)).unwrap();
        assert_eq!(total, Decimal::ZERO);
        assert_eq!(storage.frozen(&principal).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_principal_registry() {
        let (storage, _temp) = test_storage();

        storage.register_principal(&PrincipalId::new("P1")).unwrap();
        storage.register_principal(&PrincipalId::new("P2")).unwrap();
        storage.register_principal(&PrincipalId::new("P1")).unwrap();

        let principals = storage.principals().unwrap();
        assert_eq!(principals.len(), 2);
        assert!(principals.contains(&PrincipalId::new("P1")));
        assert!(principals.contains(&PrincipalId::new("P2")));
    }
}

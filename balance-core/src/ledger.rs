//! Ledger facade
//!
//! [`BalanceLedger`] is the single entry point over the durable stores: the
//! append-only transaction log, the daily snapshot store, the per-day delta
//! cache, and the frozen-funds tracker. The rollup and query engines layer
//! on top of this one implementation rather than re-deriving the algorithm
//! per call site.
//!
//! # Example
//!
//! ```no_run
//! use balance_core::{BalanceLedger, Config, PrincipalId, TransactionRequest};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> balance_core::Result<()> {
//!     let ledger = BalanceLedger::open(Config::default())?;
//!
//!     let principal = PrincipalId::new("P1");
//!     let request = TransactionRequest::new(Decimal::new(10000, 2), 1);
//!     ledger.append(&principal, vec![request]).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    clock::{Clock, SystemClock},
    types::{round2, PrincipalId, Transaction, TransactionId, TransactionRequest},
    Config, Error, Metrics, Result, Storage,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use uuid::Uuid;

/// Facade over the balance ledger stores
pub struct BalanceLedger {
    /// Storage backend
    storage: Arc<Storage>,

    /// Injected time source
    clock: Arc<dyn Clock>,

    /// Optional metrics collector
    metrics: Option<Metrics>,
}

impl BalanceLedger {
    /// Open the ledger with configuration and the system clock
    pub fn open(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open the ledger with configuration and an injected clock
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        Ok(Self::new(storage, clock))
    }

    /// Build the ledger over an already-open storage handle
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            metrics: None,
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The ledger's time source
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    // Transaction log

    /// Append signed balance-changing records for a principal
    ///
    /// Each request's delta is rounded to 2 decimal places before storage;
    /// missing ids and correlation tokens are generated from the injected
    /// clock. Every written transaction also bumps the (principal, today)
    /// delta cache entry via an atomic add. A row that cannot be read back
    /// immediately after its write surfaces as
    /// [`Error::StoreInconsistency`].
    pub async fn append(
        &self,
        principal: &PrincipalId,
        requests: Vec<TransactionRequest>,
    ) -> Result<Vec<Transaction>> {
        if principal.is_empty() {
            return Err(Error::InvalidArgument(
                "principal must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        let now = self.clock.now();
        let today = now.date_naive();

        let mut written = Vec::with_capacity(requests.len());
        for request in requests {
            let delta = round2(request.delta);
            let transaction = Transaction {
                principal: principal.clone(),
                id: request.id.unwrap_or_else(|| TransactionId::generate(now)),
                delta,
                reason: request.reason,
                remark: request.remark,
                reference: request.reference,
                correlation: request
                    .correlation
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                created: now,
            };

            self.storage.put_transaction(&transaction)?;

            if self
                .storage
                .get_transaction(principal, &transaction.id)?
                .is_none()
            {
                return Err(Error::StoreInconsistency(format!(
                    "transaction {} not readable after write",
                    transaction.id
                )));
            }

            let cached = self.storage.add_cached_delta(principal, today, delta)?;

            tracing::debug!(
                principal = %principal,
                id = %transaction.id,
                delta = %delta,
                cached = %cached,
                "Transaction recorded"
            );

            if let Some(metrics) = &self.metrics {
                metrics.record_transaction_append();
            }

            written.push(transaction);
        }

        self.storage.register_principal(principal)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_append_duration(started.elapsed().as_secs_f64());
        }

        Ok(written)
    }

    /// Append a single transaction
    pub async fn make_transaction(
        &self,
        principal: &PrincipalId,
        request: TransactionRequest,
    ) -> Result<Transaction> {
        let mut written = self.append(principal, vec![request]).await?;
        written
            .pop()
            .ok_or_else(|| Error::Other("append returned no transaction".to_string()))
    }

    /// Transactions created within `[from, to]`, newest first
    pub async fn transactions_in_range(
        &self,
        principal: &PrincipalId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        self.storage.transactions_in_range(principal, from, to)
    }

    /// Stream of transactions created within `[from, to]`, newest first
    pub async fn query_range(
        &self,
        principal: &PrincipalId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<impl Stream<Item = Transaction>> {
        let transactions = self.storage.transactions_in_range(principal, from, to)?;
        Ok(tokio_stream::iter(transactions))
    }

    // Delta cache

    /// Cached delta sum for (principal, day); zero when absent
    pub async fn cached_delta(
        &self,
        principal: &PrincipalId,
        day: chrono::NaiveDate,
    ) -> Result<Decimal> {
        self.storage.cached_delta(principal, day)
    }

    /// Overwrite the cached delta sum for (principal, day)
    pub async fn set_cached_delta(
        &self,
        principal: &PrincipalId,
        day: chrono::NaiveDate,
        value: Decimal,
    ) -> Result<()> {
        self.storage.set_cached_delta(principal, day, value)
    }

    /// Remove the cached delta entry for (principal, day)
    pub async fn clear_cached_delta(
        &self,
        principal: &PrincipalId,
        day: chrono::NaiveDate,
    ) -> Result<()> {
        self.storage.clear_cached_delta(principal, day)
    }

    // Snapshots

    /// Point lookup of the snapshot ending exactly at `end`
    pub async fn snapshot_at(
        &self,
        principal: &PrincipalId,
        end: DateTime<Utc>,
    ) -> Result<Option<crate::types::Accounting>> {
        self.storage.snapshot_at(principal, end)
    }

    /// Newest snapshot with `lower_end <= end <= upper_end`, if any
    pub async fn latest_snapshot(
        &self,
        principal: &PrincipalId,
        lower_end: DateTime<Utc>,
        upper_end: DateTime<Utc>,
    ) -> Result<Option<crate::types::Accounting>> {
        self.storage.latest_snapshot(principal, lower_end, upper_end)
    }

    /// Upsert a daily snapshot keyed by (principal, end)
    pub async fn put_snapshot(&self, snapshot: &crate::types::Accounting) -> Result<()> {
        self.storage.put_snapshot(snapshot)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot();
        }
        Ok(())
    }

    // Frozen funds

    /// Reserved amount for a principal; zero when absent
    pub async fn frozen(&self, principal: &PrincipalId) -> Result<Decimal> {
        self.storage.frozen(principal)
    }

    /// Reserve `amount` against the principal's balance, returning the new total
    pub async fn freeze(&self, principal: &PrincipalId, amount: Decimal) -> Result<Decimal> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidArgument(
                "freeze amount must not be negative".to_string(),
            ));
        }

        let total = self.storage.adjust_frozen(principal, round2(amount))?;
        tracing::debug!(principal = %principal, amount = %amount, total = %total, "Funds frozen");
        Ok(total)
    }

    /// Release `amount` of the principal's reservation, returning the new total
    ///
    /// No zero floor is enforced; callers releasing more than is held see a
    /// negative total.
    pub async fn unfreeze(&self, principal: &PrincipalId, amount: Decimal) -> Result<Decimal> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidArgument(
                "unfreeze amount must not be negative".to_string(),
            ));
        }

        let total = self.storage.adjust_frozen(principal, -round2(amount))?;
        tracing::debug!(principal = %principal, amount = %amount, total = %total, "Funds unfrozen");
        Ok(total)
    }

    /// Drop the principal's reservation entirely
    pub async fn unfreeze_all(&self, principal: &PrincipalId) -> Result<Decimal> {
        self.storage.delete_frozen(principal)?;
        tracing::debug!(principal = %principal, "Reservation cleared");
        Ok(Decimal::ZERO)
    }

    // Principal registry

    /// All ledger owners that have appended at least one transaction
    pub async fn principals(&self) -> Result<Vec<PrincipalId>> {
        self.storage.principals()
    }
}

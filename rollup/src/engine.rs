//! Daily rollup engine
//!
//! Walks a principal's ledger forward day by day from the last snapshot
//! (or from nothing, for a new principal) to the target day, persisting one
//! balance checkpoint per calendar day and clearing the matching delta-cache
//! entry.
//!
//! # Design
//!
//! - Idempotent: a second run with no new activity produces nothing.
//! - Resumable: any prefix of rolled days is a valid state; a failed or
//!   cancelled run resumes from the last persisted snapshot.
//! - Serialized per principal: concurrent rollups for one principal queue on
//!   an async mutex; snapshot writes are upserts keyed by (principal, end),
//!   so even racing processes converge on identical rows.

use crate::{audit::AuditHook, Config, Result};
use balance_core::{
    day_start, round2, Accounting, BalanceLedger, Clock, Metrics, PrincipalId,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Produces daily balance snapshots from the transaction log
pub struct RollupEngine {
    /// Ledger facade
    ledger: Arc<BalanceLedger>,

    /// Injected time source (shared with the ledger)
    clock: Arc<dyn Clock>,

    /// Audit hooks invoked per produced snapshot
    hooks: Vec<Arc<dyn AuditHook>>,

    /// Per-principal rollup locks
    locks: DashMap<PrincipalId, Arc<Mutex<()>>>,

    /// Engine configuration
    config: Config,

    /// Optional metrics collector
    metrics: Option<Metrics>,
}

impl RollupEngine {
    /// Create a rollup engine over a ledger
    pub fn new(ledger: Arc<BalanceLedger>, config: Config) -> Self {
        let clock = ledger.clock();
        Self {
            ledger,
            clock,
            hooks: Vec::new(),
            locks: DashMap::new(),
            config,
            metrics: None,
        }
    }

    /// Register an audit hook
    pub fn with_hook(mut self, hook: Arc<dyn AuditHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn principal_lock(&self, principal: &PrincipalId) -> Arc<Mutex<()>> {
        let entry = self
            .locks
            .entry(principal.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    /// Bring a principal's snapshots current as of now
    ///
    /// Returns the snapshots produced by this run, oldest first; an empty
    /// vector means the principal was already up to date.
    pub async fn rollup(&self, principal: &PrincipalId) -> Result<Vec<Accounting>> {
        let as_of = self.clock.now();
        self.rollup_as_of(principal, as_of).await
    }

    /// Bring a principal's snapshots current as of `as_of`
    ///
    /// The target is yesterday's day-end relative to `as_of`; the current
    /// day is never snapshotted because its ledger is still accumulating.
    pub async fn rollup_as_of(
        &self,
        principal: &PrincipalId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Accounting>> {
        let lock = self.principal_lock(principal);
        let _guard = lock.lock().await;

        let started = Instant::now();
        let target = day_start(as_of) - Duration::milliseconds(1);
        let lower = target - Duration::days(self.config.lookback_days);

        let last = self.ledger.latest_snapshot(principal, lower, target).await?;
        let (mut cursor, mut previous_balance) = match &last {
            Some(snapshot) => (snapshot.next_day_end(), snapshot.balance),
            // New principal: produce exactly one snapshot, for the target day
            None => (target, Decimal::ZERO),
        };

        let mut produced = Vec::new();
        while cursor <= target {
            match self.snapshot_day(principal, cursor, previous_balance).await? {
                Some(snapshot) => {
                    previous_balance = snapshot.balance;
                    produced.push(snapshot);
                    cursor = cursor + Duration::days(1);
                }
                // Clock guard tripped; resume on the next run
                None => break,
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_rollup_duration(started.elapsed().as_secs_f64());
        }

        tracing::info!(
            principal = %principal,
            target = %target,
            produced = produced.len(),
            "Rollup complete"
        );

        Ok(produced)
    }

    /// Produce and persist the snapshot for the day ending at `end`
    ///
    /// Returns `None` when `end` lies in the future relative to the clock
    /// (clock skew or re-entrancy); the caller stops walking and retries on
    /// a later run.
    async fn snapshot_day(
        &self,
        principal: &PrincipalId,
        end: DateTime<Utc>,
        previous_balance: Decimal,
    ) -> Result<Option<Accounting>> {
        let now = self.clock.now();
        if end > now {
            tracing::debug!(
                principal = %principal,
                end = %end,
                "Refusing to snapshot a day that has not ended"
            );
            return Ok(None);
        }

        let start = day_start(end);
        let transactions = self.ledger.transactions_in_range(principal, start, end).await?;

        let mut credits = Decimal::ZERO;
        let mut debits = Decimal::ZERO;
        for transaction in &transactions {
            if transaction.delta > Decimal::ZERO {
                credits += transaction.delta;
            } else {
                debits += transaction.delta;
            }
        }

        let day = end.date_naive();
        let cached = self.ledger.cached_delta(principal, day).await?;
        let diff = credits + debits - cached;
        if diff != Decimal::ZERO {
            // Diagnostic only; promoting this to an alert needs a product decision
            tracing::warn!(
                principal = %principal,
                day = %day,
                ledger_sum = %(credits + debits),
                cached = %cached,
                diff = %diff,
                "Cached delta disagrees with ledger sum"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_reconciliation_mismatch();
            }
        }

        let snapshot = Accounting {
            principal: principal.clone(),
            end,
            balance: round2(previous_balance + credits + debits),
            credits: round2(credits),
            debits: round2(debits),
            created: now,
        };

        for hook in &self.hooks {
            if let Err(e) = hook.audit(&snapshot, &transactions) {
                tracing::warn!(
                    hook = hook.name(),
                    principal = %principal,
                    end = %end,
                    error = %e,
                    "Audit hook flagged snapshot"
                );
            }
        }

        self.ledger.put_snapshot(&snapshot).await?;
        self.ledger.clear_cached_delta(principal, day).await?;

        tracing::info!(
            principal = %principal,
            end = %end,
            balance = %snapshot.balance,
            credits = %snapshot.credits,
            debits = %snapshot.debits,
            "Day rolled up"
        );

        Ok(Some(snapshot))
    }
}

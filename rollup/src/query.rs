//! Point-in-time balance queries
//!
//! Answers "balance as of T" from the newest snapshot at most
//! `lookback_days` old plus cached deltas for the days a snapshot cannot
//! cover yet, minus frozen funds. Snapshotting amortizes summing an
//! unbounded transaction history into a bounded walk of cached lookups; the
//! "yesterday's snapshot + today's cache" fast path means a same-day
//! snapshot is never needed.

use crate::{Config, Result};
use balance_core::{day_end, end_of, round2, AccountBalance, BalanceLedger, Clock, PrincipalId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Answers point-in-time balance queries
pub struct BalanceQueryEngine {
    /// Ledger facade
    ledger: Arc<BalanceLedger>,

    /// Injected time source (shared with the ledger)
    clock: Arc<dyn Clock>,

    /// Engine configuration
    config: Config,
}

impl BalanceQueryEngine {
    /// Create a query engine over a ledger
    pub fn new(ledger: Arc<BalanceLedger>, config: Config) -> Self {
        let clock = ledger.clock();
        Self {
            ledger,
            clock,
            config,
        }
    }

    /// Balance of `principal` as of `at`
    pub async fn balance(&self, principal: &PrincipalId, at: DateTime<Utc>) -> Result<AccountBalance> {
        let at_end = day_end(at);
        let frozen = round2(self.ledger.frozen(principal).await?);

        // Today's ledger is still accumulating, so a snapshot for today
        // cannot exist yet; look up yesterday's and top up from the cache.
        let today = self.clock.now().date_naive();
        let (lookup_day, mut use_cache) = if at.date_naive() == today {
            (at.date_naive() - Duration::days(1), true)
        } else {
            (at.date_naive(), false)
        };

        let lookup_end = end_of(lookup_day);
        let mut snapshot = self.ledger.snapshot_at(principal, lookup_end).await?;
        if snapshot.is_none() {
            let lower = end_of(lookup_day - Duration::days(self.config.lookback_days));
            snapshot = self.ledger.latest_snapshot(principal, lower, lookup_end).await?;
        }

        let (mut balance, cursor_start) = match &snapshot {
            Some(snapshot) => (snapshot.balance, snapshot.end + Duration::milliseconds(1)),
            None => {
                // Brand-new principal: no snapshot anywhere, so accumulate a
                // bounded window of cached deltas instead
                use_cache = true;
                (
                    Decimal::ZERO,
                    at_end
                        - Duration::days(self.config.bootstrap_lookback_days)
                        - Duration::milliseconds(1),
                )
            }
        };

        if use_cache {
            let mut cursor = cursor_start;
            while cursor < at_end {
                balance += self.ledger.cached_delta(principal, cursor.date_naive()).await?;
                cursor = cursor + Duration::days(1);
            }
        }

        let total = round2(balance);

        tracing::debug!(
            principal = %principal,
            at = %at,
            total = %total,
            frozen = %frozen,
            cache_path = use_cache,
            "Balance query answered"
        );

        Ok(AccountBalance::new(total, frozen))
    }
}

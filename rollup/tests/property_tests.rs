//! Property-based tests for rollup invariants
//!
//! These tests use proptest to verify:
//! - Balance continuity: every snapshot extends its predecessor exactly
//! - Conservation: the final balance equals the sum of all appended deltas
//! - Idempotency: rerunning a rollup produces nothing new

use balance_core::{BalanceLedger, Config as CoreConfig, ManualClock, PrincipalId, TransactionRequest};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rollup::{Config, RollupEngine};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Strategy for per-day activity: up to 4 deltas in cents
fn day_activity_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-1_000_000i64..1_000_000i64, 0..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: catch-up rollups chain balances exactly and conserve the ledger sum
    #[test]
    fn prop_balance_continuity(days in prop::collection::vec(day_activity_strategy(), 1..6)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let mut config = CoreConfig::default();
            config.data_dir = temp_dir.path().to_path_buf();

            let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
            let clock = Arc::new(ManualClock::new(start));
            let ledger = Arc::new(BalanceLedger::with_clock(config, clock.clone()).unwrap());
            let engine = RollupEngine::new(ledger.clone(), Config::default());
            let principal = PrincipalId::new("P1");

            // Day 0 seeds the first snapshot so the later walk has a chain to extend
            for &cents in &days[0] {
                ledger
                    .append(&principal, vec![TransactionRequest::new(Decimal::new(cents, 2), 1)])
                    .await
                    .unwrap();
            }
            clock.set(start + Duration::days(1));
            let mut snapshots = engine.rollup(&principal).await.unwrap();
            prop_assert_eq!(snapshots.len(), 1);

            // Remaining days accumulate without intermediate rollups
            for (i, day) in days.iter().enumerate().skip(1) {
                clock.set(start + Duration::days(i as i64));
                for &cents in day {
                    ledger
                        .append(&principal, vec![TransactionRequest::new(Decimal::new(cents, 2), 1)])
                        .await
                        .unwrap();
                }
            }

            clock.set(start + Duration::days(days.len() as i64));
            snapshots.extend(engine.rollup(&principal).await.unwrap());
            prop_assert_eq!(snapshots.len(), days.len());

            // Continuity: each snapshot extends its predecessor exactly
            for pair in snapshots.windows(2) {
                prop_assert_eq!(
                    pair[1].balance,
                    pair[0].balance + pair[1].credits + pair[1].debits
                );
            }

            // Conservation: the final balance is the sum of everything appended
            let expected: i64 = days.iter().flatten().sum();
            prop_assert_eq!(
                snapshots.last().unwrap().balance,
                Decimal::new(expected, 2)
            );

            // Idempotency: nothing new on a rerun
            let rerun = engine.rollup(&principal).await.unwrap();
            prop_assert!(rerun.is_empty());

            Ok(())
        })?;
    }

    /// Property: appended deltas always agree with the day's cache entry before rollup
    #[test]
    fn prop_cache_agrees_with_appends(cents in prop::collection::vec(-1_000_000i64..1_000_000i64, 1..10)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp_dir = tempfile::tempdir().unwrap();
            let mut config = CoreConfig::default();
            config.data_dir = temp_dir.path().to_path_buf();

            let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
            let clock = Arc::new(ManualClock::new(start));
            let ledger = Arc::new(BalanceLedger::with_clock(config, clock.clone()).unwrap());
            let principal = PrincipalId::new("P1");

            let requests = cents
                .iter()
                .map(|&c| TransactionRequest::new(Decimal::new(c, 2), 1))
                .collect();
            ledger.append(&principal, requests).await.unwrap();

            let expected: i64 = cents.iter().sum();
            let cached = ledger.cached_delta(&principal, start.date_naive()).await.unwrap();
            prop_assert_eq!(cached, Decimal::new(expected, 2));

            Ok(())
        })?;
    }
}

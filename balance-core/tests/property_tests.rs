//! Property-based tests for ledger primitives
//!
//! These tests use proptest to verify:
//! - Rounding: half-away-from-zero, idempotent, bounded error
//! - Id ordering: later instants always sort first
//! - Scan bounds: a generated id always falls inside its own day's window

use balance_core::{end_of, round2, start_of, TransactionId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn instant_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    // 2020-01-01 .. ~2035 in seconds, plus sub-second millis
    (1_577_836_800i64..2_050_000_000i64, 0u32..1000u32).prop_map(|(secs, millis)| {
        Utc.timestamp_opt(secs, millis * 1_000_000).unwrap()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: rounding is idempotent and never moves a value by more than half a cent
    #[test]
    fn prop_round2_idempotent_and_bounded(units in -1_000_000_000i64..1_000_000_000i64, scale in 0u32..6u32) {
        let value = Decimal::new(units, scale);
        let rounded = round2(value);

        prop_assert_eq!(round2(rounded), rounded);
        prop_assert!(rounded.scale() <= 2);

        let error = (value - rounded).abs();
        prop_assert!(error <= Decimal::new(5, 3)); // 0.005
    }

    /// Property: ties round away from zero
    #[test]
    fn prop_round2_half_away_from_zero(cents in -1_000_000i64..1_000_000i64) {
        // Construct an exact .5-of-a-cent tie
        let tie = Decimal::new(cents * 10 + cents.signum() * 5, 3);
        let rounded = round2(tie);

        let expected = Decimal::new(cents + cents.signum(), 2);
        prop_assert_eq!(rounded, expected);
    }

    /// Property: a later creation instant produces a lexicographically smaller id
    #[test]
    fn prop_ids_sort_newest_first(at in instant_strategy(), gap_ms in 1i64..86_400_000i64) {
        let older = TransactionId::generate(at);
        let newer = TransactionId::generate(at + Duration::milliseconds(gap_ms));

        prop_assert!(newer.as_str() < older.as_str());
    }

    /// Property: an id generated at any instant of a day falls inside that day's scan window
    #[test]
    fn prop_id_within_day_window(at in instant_strategy()) {
        let day = at.date_naive();
        let start = TransactionId::scan_start(end_of(day));
        let end = TransactionId::scan_end(start_of(day));

        let id = TransactionId::generate(at);
        prop_assert!(id.as_str() >= start.as_str());
        prop_assert!(id.as_str() < end.as_str());
    }
}

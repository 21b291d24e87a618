//! Core types for the balance ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Round a monetary amount to 2 decimal places, half away from zero.
///
/// Every amount that crosses a storage boundary goes through this helper
/// so that `1.005` becomes `1.01` and `-1.005` becomes `-1.01`.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// UTC midnight at the start of `day`.
pub fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0).expect("midnight is always valid").and_utc()
}

/// The day-end instant for `day`: 23:59:59.999 UTC.
///
/// Snapshots are keyed by this instant; one millisecond later is the next
/// calendar day's midnight.
pub fn end_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_milli_opt(23, 59, 59, 999)
        .expect("day end is always valid")
        .and_utc()
}

/// Day-end instant of the calendar day containing `at`.
pub fn day_end(at: DateTime<Utc>) -> DateTime<Utc> {
    end_of(at.date_naive())
}

/// Midnight of the calendar day containing `at`.
pub fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    start_of(at.date_naive())
}

/// Ledger owner identifier (account, business, or device)
///
/// Construction trims surrounding whitespace; emptiness is checked at the
/// append boundary, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create new principal ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the trimmed identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time-ordered transaction identifier
///
/// Generated identifiers encode the creation instant reverse-chronologically
/// (`i64::MAX - nanos`, zero padded) followed by a UUID so that two
/// transactions written in the same nanosecond stay distinct. Lexicographic
/// order over generated ids is therefore newest-first, which makes
/// newest-first range scans a plain forward iteration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap a caller-supplied identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate an identifier for a transaction created at `at`
    pub fn generate(at: DateTime<Utc>) -> Self {
        let rev = i64::MAX - at.timestamp_nanos_opt().unwrap_or(0);
        Self(format!("{:019}-{}", rev, Uuid::new_v4().simple()))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Inclusive scan start for transactions created at or before `to`.
    ///
    /// Because ids sort reverse-chronologically, the *newest* admissible
    /// instant produces the *smallest* admissible id prefix.
    pub fn scan_start(to: DateTime<Utc>) -> String {
        format!("{:019}", i64::MAX - to.timestamp_nanos_opt().unwrap_or(0))
    }

    /// Exclusive scan end for transactions created at or after `from`.
    pub fn scan_end(from: DateTime<Utc>) -> String {
        let bound = (i64::MAX as i128) - (from.timestamp_nanos_opt().unwrap_or(0) as i128) + 1;
        format!("{:019}", bound)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed balance-changing record, immutable once written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Ledger owner
    pub principal: PrincipalId,

    /// Time-ordered identifier, unique within the principal
    pub id: TransactionId,

    /// Signed amount, rounded to 2 decimal places before storage
    pub delta: Decimal,

    /// Business reason code
    pub reason: i32,

    /// Free-form remark
    pub remark: String,

    /// External reference (order id, invoice number, ...)
    pub reference: String,

    /// Correlation token linking related writes
    pub correlation: String,

    /// Write instant
    pub created: DateTime<Utc>,
}

/// Input for a single ledger append
#[derive(Debug, Clone, Default)]
pub struct TransactionRequest {
    /// Signed amount to apply
    pub delta: Decimal,

    /// Business reason code
    pub reason: i32,

    /// Free-form remark
    pub remark: String,

    /// External reference
    pub reference: String,

    /// Caller-supplied identifier; generated from the clock when absent
    pub id: Option<TransactionId>,

    /// Caller-supplied correlation token; a fresh UUID when absent
    pub correlation: Option<String>,
}

impl TransactionRequest {
    /// Request carrying only an amount and a reason code
    pub fn new(delta: Decimal, reason: i32) -> Self {
        Self {
            delta,
            reason,
            ..Default::default()
        }
    }
}

/// Daily balance snapshot, immutable once written
///
/// For a given principal, snapshots form a sequence of consecutive calendar
/// days with `balance[n] == round2(balance[n-1] + credits[n] + debits[n])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accounting {
    /// Ledger owner
    pub principal: PrincipalId,

    /// Day-end instant this snapshot covers (23:59:59.999 UTC)
    pub end: DateTime<Utc>,

    /// Cumulative signed balance through `end`
    pub balance: Decimal,

    /// Sum of positive deltas that day
    pub credits: Decimal,

    /// Sum of negative deltas that day
    pub debits: Decimal,

    /// Write instant
    pub created: DateTime<Utc>,
}

impl Accounting {
    /// Calendar day this snapshot covers
    pub fn day(&self) -> NaiveDate {
        self.end.date_naive()
    }

    /// Day-end instant of the next day to roll after this snapshot
    pub fn next_day_end(&self) -> DateTime<Utc> {
        day_end(self.end + Duration::milliseconds(1))
    }
}

/// Point-in-time balance answer, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Ledger balance through the queried instant
    pub total: Decimal,

    /// Amount reserved against the balance
    pub frozen: Decimal,

    /// `total - frozen`, rounded
    pub available: Decimal,
}

impl AccountBalance {
    /// Build an answer from a total and a frozen amount
    pub fn new(total: Decimal, frozen: Decimal) -> Self {
        Self {
            total,
            frozen,
            available: round2(total - frozen),
        }
    }

    /// All-zero answer for a principal with no activity
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }
}

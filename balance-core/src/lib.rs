//! Balance Core
//!
//! Per-principal running balances over an append-only transaction log.
//!
//! # Architecture
//!
//! - **Transaction log**: immutable signed records, time-ordered ids
//! - **Delta cache**: per (principal, day) sum of not-yet-snapshotted deltas
//! - **Snapshot store**: durable day-end balance checkpoints
//! - **Frozen funds**: per-principal reservations with their own lifecycle
//!
//! # Invariants
//!
//! - Balance continuity: `balance[n] == round2(balance[n-1] + credits[n] + debits[n])`
//! - Append-only: transactions never modified or deleted
//! - The transaction log is the source of truth; the delta cache is
//!   rebuildable and its increments are atomic under concurrent appenders

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::BalanceLedger;
pub use metrics::Metrics;
pub use storage::Storage;
pub use types::{
    day_end, day_start, end_of, round2, start_of, AccountBalance, Accounting, PrincipalId,
    Transaction, TransactionId, TransactionRequest,
};

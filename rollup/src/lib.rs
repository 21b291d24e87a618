//! Rollup Engines
//!
//! Daily accounting rollups and point-in-time balance queries over
//! `balance-core`.
//!
//! # Architecture
//!
//! 1. **Append**: callers write transactions; the per-day delta cache is
//!    updated atomically alongside the log
//! 2. **Rollup**: on demand or on schedule, fold each completed day into a
//!    durable snapshot and clear that day's cache entry
//! 3. **Query**: answer "balance as of T" from the newest snapshot plus any
//!    not-yet-rolled cached deltas, minus frozen funds
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use balance_core::{BalanceLedger, PrincipalId};
//! use rollup::{BalanceQueryEngine, Config, RollupEngine};
//!
//! #[tokio::main]
//! async fn main() -> rollup::Result<()> {
//!     let ledger = Arc::new(BalanceLedger::open(balance_core::Config::default())?);
//!     let engine = RollupEngine::new(ledger.clone(), Config::default());
//!     let query = BalanceQueryEngine::new(ledger.clone(), Config::default());
//!
//!     let principal = PrincipalId::new("P1");
//!     engine.rollup(&principal).await?;
//!     let balance = query.balance(&principal, chrono::Utc::now()).await?;
//!     println!("available: {}", balance.available);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod scheduler;

// Re-exports
pub use audit::{AuditHook, JsonlAudit, LogAudit};
pub use config::Config;
pub use engine::RollupEngine;
pub use error::{Error, Result};
pub use query::BalanceQueryEngine;
pub use scheduler::{RollupScheduler, ScheduleConfig};

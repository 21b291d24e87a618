//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `balance_transactions_total` - Total number of transactions appended
//! - `balance_append_duration_seconds` - Histogram of append latencies
//! - `balance_snapshots_total` - Total number of daily snapshots produced
//! - `balance_rollup_duration_seconds` - Histogram of per-principal rollup latencies
//! - `balance_reconciliation_mismatches_total` - Days whose cached delta disagreed with the ledger sum

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total transactions appended
    pub transactions_total: IntCounter,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Total snapshots produced
    pub snapshots_total: IntCounter,

    /// Rollup duration histogram
    pub rollup_duration: Histogram,

    /// Reconciliation mismatches observed (diagnostic only)
    pub reconciliation_mismatches_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounter::with_opts(Opts::new(
            "balance_transactions_total",
            "Total number of transactions appended",
        ))?;
        registry.register(Box::new(transactions_total.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "balance_append_duration_seconds",
                "Histogram of append latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let snapshots_total = IntCounter::with_opts(Opts::new(
            "balance_snapshots_total",
            "Total number of daily snapshots produced",
        ))?;
        registry.register(Box::new(snapshots_total.clone()))?;

        let rollup_duration = Histogram::with_opts(
            HistogramOpts::new(
                "balance_rollup_duration_seconds",
                "Histogram of per-principal rollup latencies",
            )
            .buckets(vec![0.005, 0.025, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(rollup_duration.clone()))?;

        let reconciliation_mismatches_total = IntCounter::with_opts(Opts::new(
            "balance_reconciliation_mismatches_total",
            "Days whose cached delta disagreed with the ledger sum",
        ))?;
        registry.register(Box::new(reconciliation_mismatches_total.clone()))?;

        Ok(Self {
            transactions_total,
            append_duration,
            snapshots_total,
            rollup_duration,
            reconciliation_mismatches_total,
            registry,
        })
    }

    /// Record a transaction append
    pub fn record_transaction_append(&self) {
        self.transactions_total.inc();
    }

    /// Record append duration
    pub fn record_append_duration(&self, duration_seconds: f64) {
        self.append_duration.observe(duration_seconds);
    }

    /// Record a produced snapshot
    pub fn record_snapshot(&self) {
        self.snapshots_total.inc();
    }

    /// Record rollup duration
    pub fn record_rollup_duration(&self, duration_seconds: f64) {
        self.rollup_duration.observe(duration_seconds);
    }

    /// Record a reconciliation mismatch
    pub fn record_reconciliation_mismatch(&self) {
        self.reconciliation_mismatches_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

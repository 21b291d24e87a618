//! Audit hooks
//!
//! Pluggable observers invoked once per newly produced snapshot, before it
//! is persisted, with the snapshot and the transactions that produced it.
//! Hook failures are logged by the engine and never block the write.

use crate::Result;
use balance_core::{Accounting, Transaction};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Observer of newly produced snapshots
pub trait AuditHook: Send + Sync {
    /// Hook name used in log output
    fn name(&self) -> &str;

    /// Inspect a snapshot and the day's transactions
    ///
    /// Returning an error flags the snapshot; it does not stop it from
    /// being persisted.
    fn audit(&self, snapshot: &Accounting, transactions: &[Transaction]) -> Result<()>;
}

/// Hook that logs every snapshot through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAudit;

impl AuditHook for LogAudit {
    fn name(&self) -> &str {
        "log"
    }

    fn audit(&self, snapshot: &Accounting, transactions: &[Transaction]) -> Result<()> {
        tracing::info!(
            principal = %snapshot.principal,
            end = %snapshot.end,
            balance = %snapshot.balance,
            credits = %snapshot.credits,
            debits = %snapshot.debits,
            transactions = transactions.len(),
            "Snapshot audited"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    snapshot: &'a Accounting,
    transaction_ids: Vec<&'a str>,
}

/// Hook that appends one JSON line per snapshot to a file
pub struct JsonlAudit {
    file: Mutex<File>,
}

impl JsonlAudit {
    /// Open (or create) the audit file in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditHook for JsonlAudit {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn audit(&self, snapshot: &Accounting, transactions: &[Transaction]) -> Result<()> {
        let record = AuditRecord {
            snapshot,
            transaction_ids: transactions.iter().map(|t| t.id.as_str()).collect(),
        };
        let line = serde_json::to_string(&record)?;

        let mut file = self.file.lock();
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

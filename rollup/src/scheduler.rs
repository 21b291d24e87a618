//! Daily rollup scheduler
//!
//! Runs the rollup for every registered principal on a configurable
//! schedule (default: once a day shortly after midnight UTC, when
//! yesterday's ledger has stopped moving). Ad-hoc runs for ops remain
//! available through [`RollupScheduler::run_once`].

use crate::{engine::RollupEngine, Error, Result};
use balance_core::{BalanceLedger, Clock};
use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Rollup schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Times of day (UTC) when a rollup pass starts
    /// E.g., ["00:15"]
    pub run_times: Vec<String>,

    /// Enable automatic runs
    pub auto_run: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_times: vec!["00:15".to_string()],
            auto_run: true,
        }
    }
}

impl ScheduleConfig {
    /// Parse run times into NaiveTime
    fn parse_times(&self) -> Result<Vec<NaiveTime>> {
        self.run_times
            .iter()
            .map(|time_str| {
                NaiveTime::parse_from_str(time_str, "%H:%M").map_err(|e| {
                    Error::Config(format!("Invalid time format '{}': {}", time_str, e))
                })
            })
            .collect()
    }

    /// Calculate the next run time from `now`
    pub fn next_run_time(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let times = self.parse_times()?;
        let current_time = now.time();

        for run_time in &times {
            if current_time < *run_time {
                let next = now
                    .date_naive()
                    .and_time(*run_time)
                    .and_utc();
                return Ok(next);
            }
        }

        // No more runs today, take the first run tomorrow
        let tomorrow = (now + Duration::days(1)).date_naive();
        let first = times
            .first()
            .ok_or_else(|| Error::Config("No run times configured".to_string()))?;

        Ok(tomorrow.and_time(*first).and_utc())
    }

    /// Check if `now` matches any run time (within 1 minute tolerance)
    pub fn is_run_time(&self, now: DateTime<Utc>) -> Result<bool> {
        let times = self.parse_times()?;
        let current_time = now.time();

        for run_time in times {
            let diff_secs = (current_time.num_seconds_from_midnight() as i64
                - run_time.num_seconds_from_midnight() as i64)
                .abs();

            if diff_secs < 60 {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Drives scheduled rollup passes over all registered principals
pub struct RollupScheduler {
    engine: Arc<RollupEngine>,
    ledger: Arc<BalanceLedger>,
    clock: Arc<dyn Clock>,
    config: ScheduleConfig,
    last_run: RwLock<Option<DateTime<Utc>>>,
}

impl RollupScheduler {
    /// Create a scheduler over an engine and its ledger
    pub fn new(
        engine: Arc<RollupEngine>,
        ledger: Arc<BalanceLedger>,
        config: ScheduleConfig,
    ) -> Self {
        let clock = ledger.clock();
        Self {
            engine,
            ledger,
            clock,
            config,
            last_run: RwLock::new(None),
        }
    }

    /// Run the scheduler loop until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting rollup scheduler");

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(30));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.check_schedule().await {
                        warn!("Scheduler check failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Rollup scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Check whether a scheduled pass is due, and run it
    async fn check_schedule(&self) -> Result<()> {
        if !self.config.auto_run {
            return Ok(());
        }

        let now = self.clock.now();
        if !self.config.is_run_time(now)? {
            return Ok(());
        }

        // Suppress duplicate fires within the tolerance window
        if let Some(last) = *self.last_run.read().await {
            if (now - last).num_seconds() < 120 {
                debug!("Rollup pass already ran recently, skipping");
                return Ok(());
            }
        }

        *self.last_run.write().await = Some(now);
        self.run_once().await?;

        Ok(())
    }

    /// Roll up every registered principal once
    ///
    /// One principal's failure is logged and does not stop the pass.
    /// Returns the total number of snapshots produced.
    pub async fn run_once(&self) -> Result<usize> {
        let principals = self.ledger.principals().await?;
        info!(principals = principals.len(), "Starting rollup pass");

        let mut produced = 0;
        for principal in &principals {
            match self.engine.rollup(principal).await {
                Ok(snapshots) => produced += snapshots.len(),
                Err(e) => {
                    warn!(principal = %principal, error = %e, "Rollup failed for principal");
                }
            }
        }

        info!(produced, "Rollup pass complete");
        Ok(produced)
    }

    /// Next scheduled pass, from the injected clock
    pub fn next_run_time(&self) -> Result<DateTime<Utc>> {
        self.config.next_run_time(self.clock.now())
    }
}

//! Configuration for the rollup engines

use crate::scheduler::ScheduleConfig;
use serde::{Deserialize, Serialize};

/// Rollup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How many days back to search for the most recent snapshot
    pub lookback_days: i64,

    /// How many days of cached deltas to accumulate for a principal that has
    /// never been snapshotted
    ///
    /// Inherited bound; whether 3 is load-bearing or an approximation is an
    /// open product question, so it is configurable but defaults unchanged.
    pub bootstrap_lookback_days: i64,

    /// Scheduler settings
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            bootstrap_lookback_days: 3,
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }
}

//! Job Manager Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_JOBS: usize = 100;
pub const DEFAULT_RETENTION_SECS: u64 = 3600;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Job manager configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobConfig {
    /// Jobs tracked at once, any status
    pub max_jobs: usize,

    /// How long finished jobs are kept, in seconds
    pub retention_secs: u64,

    /// How often the cleanup sweep runs, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            retention_secs: DEFAULT_RETENTION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl JobConfig {
    pub fn with_max_jobs(max_jobs: usize) -> Self {
        Self {
            max_jobs,
            ..Default::default()
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_jobs == 0 {
            anyhow::bail!("Maximum concurrent jobs must be > 0");
        }
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("Job sweep interval must be at least 1 second");
        }
        Ok(())
    }
}

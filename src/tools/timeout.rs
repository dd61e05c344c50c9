//! Execution Timeout Policy
//!
//! Per-tool bounds on how long a subprocess may run. Requested values outside
//! the bounds are rejected, never clamped.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::validator::CommandValidationError;

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Timeout bounds for one tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    pub min_secs: u64,
    pub default_secs: u64,
    pub max_secs: u64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            min_secs: MIN_TIMEOUT_SECS,
            default_secs: DEFAULT_TIMEOUT_SECS,
            max_secs: MAX_TIMEOUT_SECS,
        }
    }
}

impl TimeoutPolicy {
    /// Default bounds with a different ceiling
    pub fn with_max(max_secs: u64) -> Self {
        Self {
            max_secs,
            ..Default::default()
        }
    }

    /// Resolve a requested timeout, falling back to the default
    ///
    /// # Errors
    ///
    /// Returns an error if the requested value is outside `[min, max]`.
    pub fn resolve(&self, requested: Option<u64>) -> Result<Duration, CommandValidationError> {
        let secs = requested.unwrap_or(self.default_secs);
        if secs < self.min_secs {
            return Err(CommandValidationError::TimeoutTooShort(self.min_secs));
        }
        if secs > self.max_secs {
            return Err(CommandValidationError::TimeoutTooLong(self.max_secs));
        }
        Ok(Duration::from_secs(secs))
    }
}

//! Rate Limit Configuration
//!
//! Limits for the three admission windows.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default rate limits
pub const DEFAULT_GLOBAL_LIMIT: usize = 100; // requests per window, all callers
pub const DEFAULT_PER_IP_LIMIT: usize = 20; // requests per window, per client address
pub const DEFAULT_PER_KEY_LIMIT: usize = 50; // requests per window, per API key
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Requests admitted per window across all callers
    pub global_limit: usize,

    /// Requests admitted per window for one client IP
    pub per_ip_limit: usize,

    /// Requests admitted per window for one API key
    pub per_key_limit: usize,

    /// Trailing window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_limit: DEFAULT_GLOBAL_LIMIT,
            per_ip_limit: DEFAULT_PER_IP_LIMIT,
            per_key_limit: DEFAULT_PER_KEY_LIMIT,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration with explicit limits
    pub fn new(global_limit: usize, per_ip_limit: usize, per_key_limit: usize) -> Self {
        Self {
            global_limit,
            per_ip_limit,
            per_key_limit,
            ..Default::default()
        }
    }

    /// Create a disabled configuration (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Override the window length
    pub fn with_window_secs(mut self, secs: u64) -> Self {
        self.window_secs = secs;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Validate limits
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.global_limit == 0 || self.per_ip_limit == 0 || self.per_key_limit == 0 {
            anyhow::bail!("Rate limits must be > 0");
        }
        if self.window_secs == 0 {
            anyhow::bail!("Rate limit window must be at least 1 second");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.global_limit, 100);
        assert_eq!(config.per_ip_limit, 20);
        assert_eq!(config.per_key_limit, 50);
        assert_eq!(config.window(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = RateLimitConfig::new(0, 1, 1);
        assert!(config.validate().is_err());

        let config = RateLimitConfig::default().with_window_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_config() {
        assert!(!RateLimitConfig::disabled().enabled);
    }
}

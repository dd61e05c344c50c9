//! Rate Limit Manager
//!
//! Sliding-window admission control across three scopes: global, per client
//! IP, and per API key.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::config::RateLimitConfig;
use super::store::WindowStore;

/// Which window rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LimitScope {
    #[serde(rename = "global")]
    Global,
    #[serde(rename = "per-IP")]
    PerIp,
    #[serde(rename = "per-key")]
    PerKey,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PerIp => "per-IP",
            Self::PerKey => "per-key",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::Global => "Global rate limit exceeded. Try again later.",
            Self::PerIp => "Rate limit exceeded for your IP address. Try again later.",
            Self::PerKey => "Rate limit exceeded for your API key. Try again later.",
        }
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Window that denied the request
    pub scope: Option<LimitScope>,

    /// Reason for denial (if not allowed)
    pub reason: Option<String>,

    /// Seconds until the exhausted window frees a slot
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    /// Create an allowed result
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            scope: None,
            reason: None,
            retry_after_secs: None,
        }
    }

    /// Create a denied result
    pub fn denied(scope: LimitScope, retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            scope: Some(scope),
            reason: Some(scope.message().to_string()),
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

/// Snapshot of limiter state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    pub global: GlobalStats,
    pub per_ip: PerIpStats,
    pub per_key: PerKeyStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub current: usize,
    pub limit: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerIpStats {
    pub limit: usize,
    pub tracked_ips: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerKeyStats {
    pub limit: usize,
    pub tracked_keys: usize,
}

/// Rate limiter
///
/// Check and record happen under a single lock, so N concurrent callers
/// against a limit of L admit exactly min(N, L).
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Configuration
    config: Arc<RateLimitConfig>,

    /// Windows for every scope
    store: Arc<Mutex<WindowStore>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(Mutex::new(WindowStore::new())),
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Create a disabled rate limiter (for testing)
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check every applicable window and, if all pass, record the request
    pub async fn check_and_record(&self, ip: &str, api_key: Option<&str>) -> RateLimitResult {
        self.check_and_record_at(ip, api_key, Instant::now()).await
    }

    pub(crate) async fn check_and_record_at(
        &self,
        ip: &str,
        api_key: Option<&str>,
        now: Instant,
    ) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::allowed();
        }

        let window = self.config.window();
        let mut store = self.store.lock().await;
        store.sweep_idle(now, window);
        let WindowStore {
            global,
            per_ip,
            per_key,
            ..
        } = &mut *store;

        global.prune(now, window);
        if global.len() >= self.config.global_limit {
            warn!(client_ip = ip, "global rate limit exceeded");
            return RateLimitResult::denied(
                LimitScope::Global,
                global.retry_after_secs(now, window),
            );
        }

        let ip_window = per_ip.entry(ip.to_string()).or_default();
        ip_window.prune(now, window);
        if ip_window.len() >= self.config.per_ip_limit {
            warn!(client_ip = ip, "per-IP rate limit exceeded");
            let retry_after = ip_window.retry_after_secs(now, window);
            if ip_window.is_empty() {
                per_ip.remove(ip);
            }
            return RateLimitResult::denied(LimitScope::PerIp, retry_after);
        }

        if let Some(key) = api_key {
            let key_window = per_key.entry(key.to_string()).or_default();
            key_window.prune(now, window);
            if key_window.len() >= self.config.per_key_limit {
                warn!(client_ip = ip, "per-key rate limit exceeded");
                let retry_after = key_window.retry_after_secs(now, window);
                if key_window.is_empty() {
                    per_key.remove(key);
                }
                // A denied request leaves no trace in a window it created
                if ip_window.is_empty() {
                    per_ip.remove(ip);
                }
                return RateLimitResult::denied(LimitScope::PerKey, retry_after);
            }
            key_window.record(now);
        }

        ip_window.record(now);
        global.record(now);

        debug!(client_ip = ip, global = global.len(), "request admitted");
        RateLimitResult::allowed()
    }

    /// Current counts, after pruning
    pub async fn get_stats(&self) -> RateLimitStats {
        let mut store = self.store.lock().await;
        store.prune_all(Instant::now(), self.config.window());

        RateLimitStats {
            global: GlobalStats {
                current: store.global.len(),
                limit: self.config.global_limit,
                window_seconds: self.config.window_secs,
            },
            per_ip: PerIpStats {
                limit: self.config.per_ip_limit,
                tracked_ips: store.per_ip.len(),
            },
            per_key: PerKeyStats {
                limit: self.config.per_key_limit,
                tracked_keys: store.per_key.len(),
            },
        }
    }

    /// Clear every window
    pub async fn reset(&self) {
        self.store.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_per_ip_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::new(100, 3, 50));

        for _ in 0..3 {
            assert!(limiter.check_and_record("198.51.100.7", None).await.allowed);
        }

        let result = limiter.check_and_record("198.51.100.7", None).await;
        assert!(!result.allowed);
        assert_eq!(result.scope, Some(LimitScope::PerIp));
        assert_eq!(
            result.reason.as_deref(),
            Some("Rate limit exceeded for your IP address. Try again later.")
        );
        assert!(result.retry_after_secs.unwrap() >= 1);

        // Another address is unaffected
        assert!(limiter.check_and_record("198.51.100.8", None).await.allowed);
    }

    #[tokio::test]
    async fn test_global_limit_checked_first() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, 1, 1));

        assert!(limiter.check_and_record("a", Some("k1")).await.allowed);
        assert!(limiter.check_and_record("b", Some("k2")).await.allowed);

        let result = limiter.check_and_record("a", Some("k1")).await;
        assert_eq!(result.scope, Some(LimitScope::Global));
        assert_eq!(
            result.reason.as_deref(),
            Some("Global rate limit exceeded. Try again later.")
        );
    }

    #[tokio::test]
    async fn test_per_key_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::new(100, 100, 2));

        assert!(limiter.check_and_record("a", Some("key")).await.allowed);
        assert!(limiter.check_and_record("b", Some("key")).await.allowed);

        let result = limiter.check_and_record("c", Some("key")).await;
        assert_eq!(result.scope, Some(LimitScope::PerKey));
        assert_eq!(
            result.reason.as_deref(),
            Some("Rate limit exceeded for your API key. Try again later.")
        );

        // Requests without a key only consume the IP and global windows
        assert!(limiter.check_and_record("c", None).await.allowed);
    }

    #[tokio::test]
    async fn test_denied_request_is_not_recorded() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10, 1, 10));

        assert!(limiter.check_and_record("a", None).await.allowed);
        assert!(!limiter.check_and_record("a", None).await.allowed);
        assert!(!limiter.check_and_record("a", None).await.allowed);

        let stats = limiter.get_stats().await;
        assert_eq!(stats.global.current, 1);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(RateLimitConfig::new(100, 2, 100).with_window_secs(60));
        let start = Instant::now();

        assert!(limiter.check_and_record_at("a", None, start).await.allowed);
        assert!(
            limiter
                .check_and_record_at("a", None, start + Duration::from_secs(30))
                .await
                .allowed
        );

        let blocked = limiter
            .check_and_record_at("a", None, start + Duration::from_secs(45))
            .await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.retry_after_secs, Some(15));

        // First entry has left the window
        assert!(
            limiter
                .check_and_record_at("a", None, start + Duration::from_secs(61))
                .await
                .allowed
        );
    }

    #[tokio::test]
    async fn test_one_off_callers_are_forgotten_without_stats() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10_000, 5, 5).with_window_secs(1));
        let start = Instant::now();

        for i in 0..5000 {
            let ip = format!("10.{}.{}.1", i / 256, i % 256);
            let key = format!("key-{}", i);
            assert!(limiter.check_and_record_at(&ip, Some(&key), start).await.allowed);
        }
        assert_eq!(limiter.store.lock().await.per_ip.len(), 5000);

        let later = start + Duration::from_secs(3600);
        assert!(limiter.check_and_record_at("198.51.100.1", None, later).await.allowed);

        let store = limiter.store.lock().await;
        assert_eq!(store.per_ip.len(), 1);
        assert!(store.per_key.is_empty());
    }

    #[tokio::test]
    async fn test_per_key_denial_leaves_no_empty_ip_window() {
        let limiter = RateLimiter::new(RateLimitConfig::new(100, 10, 1));
        let start = Instant::now();

        assert!(limiter.check_and_record_at("198.51.100.1", Some("k"), start).await.allowed);
        let denied = limiter
            .check_and_record_at("198.51.100.2", Some("k"), start)
            .await;
        assert_eq!(denied.scope, Some(LimitScope::PerKey));

        let store = limiter.store.lock().await;
        assert!(store.per_ip.contains_key("198.51.100.1"));
        assert!(!store.per_ip.contains_key("198.51.100.2"));
    }

    #[tokio::test]
    async fn test_concurrent_admission_is_exact() {
        let limiter = RateLimiter::new(RateLimitConfig::new(25, 1000, 1000));

        let checks = (0..100).map(|i| {
            let limiter = limiter.clone();
            async move {
                limiter
                    .check_and_record(&format!("10.0.0.{}", i % 7), None)
                    .await
                    .allowed
            }
        });
        let results = futures::future::join_all(checks).await;

        assert_eq!(results.iter().filter(|allowed| **allowed).count(), 25);
    }

    #[tokio::test]
    async fn test_concurrent_admission_across_tasks() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1000, 10, 1000));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.check_and_record("203.0.113.1", None).await.allowed
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn test_stats_and_reset() {
        let limiter = RateLimiter::default_config();

        limiter.check_and_record("a", Some("k")).await;
        limiter.check_and_record("b", None).await;

        let stats = limiter.get_stats().await;
        assert_eq!(stats.global.current, 2);
        assert_eq!(stats.global.limit, 100);
        assert_eq!(stats.global.window_seconds, 60);
        assert_eq!(stats.per_ip.tracked_ips, 2);
        assert_eq!(stats.per_ip.limit, 20);
        assert_eq!(stats.per_key.tracked_keys, 1);
        assert_eq!(stats.per_key.limit, 50);

        limiter.reset().await;
        let stats = limiter.get_stats().await;
        assert_eq!(stats.global.current, 0);
        assert_eq!(stats.per_ip.tracked_ips, 0);
    }

    #[tokio::test]
    async fn test_disabled_limiter_allows_everything() {
        let limiter = RateLimiter::disabled();
        for _ in 0..500 {
            assert!(limiter.check_and_record("a", Some("k")).await.allowed);
        }
        assert_eq!(limiter.get_stats().await.global.current, 0);
    }
}

// Configuration File Support
//
// Configuration for the netkit gateway. TOML (or JSON, by file extension)
// with environment variable overrides applied after the file is read.
//
// Search order: --config, $NETKIT_CONFIG, /etc/netkit/config.toml, ./netkit.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::jobs::JobConfig;
use crate::rate_limit::RateLimitConfig;
use crate::targets::TargetRule;
use crate::tools::ExecutorConfig;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "NETKIT_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/netkit/config.toml";
const LOCAL_CONFIG_PATH: &str = "netkit.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP listener
    pub server: ServerConfig,

    /// API key authentication
    pub auth: AuthConfig,

    /// Admission limits
    pub rate_limit: RateLimitConfig,

    /// Target whitelist/blacklist
    pub targets: TargetsConfig,

    /// Background jobs
    pub jobs: JobConfig,

    /// Subprocess execution
    pub execution: ExecutionConfig,

    /// Capability detection
    pub capabilities: CapabilitiesConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,

    /// Listen port
    pub port: u16,

    /// Largest accepted request body in bytes
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8090,
            max_request_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// When false every caller is treated as authenticated
    pub enabled: bool,

    /// Accepted API keys
    pub api_keys: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_keys: Vec::new(),
        }
    }
}

/// Target policy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetsConfig {
    /// If non-empty, only matching targets are allowed
    pub whitelist: Vec<String>,

    /// Matching targets are always denied
    pub blacklist: Vec<String>,

    /// Allow private, loopback and link-local addresses
    pub allow_private: bool,
}

/// Subprocess execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Captured bytes kept per output stream
    pub max_output_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: ExecutorConfig::default().max_output_size,
        }
    }
}

/// Capability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CapabilitiesConfig {
    /// Skip probing and assume raw sockets are (un)available
    pub assume_net_raw: Option<bool>,
}

impl Config {
    /// Load configuration from the first existing location
    ///
    /// An explicit path that does not exist is an error; the implicit
    /// locations fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            return Self::load_from_path(path);
        }

        match Self::locate(std::env::var(CONFIG_ENV).ok().map(PathBuf::from)) {
            Some(path) => Self::load_from_path(&path),
            None => {
                tracing::debug!("No config file found, using defaults");
                let config = Self::default().apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// First existing config file among the search locations
    pub fn locate(from_env: Option<PathBuf>) -> Option<PathBuf> {
        from_env
            .into_iter()
            .chain([
                PathBuf::from(SYSTEM_CONFIG_PATH),
                PathBuf::from(LOCAL_CONFIG_PATH),
            ])
            .find(|path| path.exists())
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the resulting configuration is invalid. A missing file yields the
    /// defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config = Self::parse(path, &content)?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))
        } else {
            toml::from_str(content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// Each setting is read from its `NETKIT_*` name first, then from its
    /// legacy name. List settings are comma-separated and extend the lists
    /// already configured.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |names: &[&str]| -> Option<(String, String)> {
            names.iter().find_map(|name| {
                lookup(name)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (name.to_string(), v))
            })
        };

        // Logging overrides
        if let Some((_, level)) = var(&["NETKIT_LOG_LEVEL"]) {
            self.logging.level = level;
        }
        if let Some((_, format)) = var(&["NETKIT_LOG_FORMAT"]) {
            self.logging.format = format;
        }

        // Server overrides
        if let Some((_, bind)) = var(&["NETKIT_BIND"]) {
            self.server.bind = bind;
        }
        if let Some(port) = parsed(var(&["NETKIT_PORT", "API_PORT"])) {
            self.server.port = port;
        }

        // Auth overrides
        if let Some(enabled) = flag(var(&["NETKIT_AUTH_ENABLED"])) {
            self.auth.enabled = enabled;
        }
        if let Some((_, keys)) = var(&["NETKIT_API_KEYS", "API_KEYS"]) {
            extend_unique(&mut self.auth.api_keys, &keys);
        }

        // Rate limit overrides
        if let Some(enabled) = flag(var(&["NETKIT_RATE_LIMIT_ENABLED"])) {
            self.rate_limit.enabled = enabled;
        }
        if let Some(limit) = parsed(var(&["NETKIT_RATE_LIMIT_GLOBAL", "RATE_LIMIT_GLOBAL"])) {
            self.rate_limit.global_limit = limit;
        }
        if let Some(limit) = parsed(var(&["NETKIT_RATE_LIMIT_PER_IP", "RATE_LIMIT_PER_IP"])) {
            self.rate_limit.per_ip_limit = limit;
        }
        if let Some(limit) = parsed(var(&["NETKIT_RATE_LIMIT_PER_KEY", "RATE_LIMIT_PER_KEY"])) {
            self.rate_limit.per_key_limit = limit;
        }

        // Target overrides
        if let Some((_, rules)) = var(&["NETKIT_SCAN_WHITELIST", "SCAN_WHITELIST"]) {
            extend_unique(&mut self.targets.whitelist, &rules);
        }
        if let Some((_, rules)) = var(&["NETKIT_SCAN_BLACKLIST", "SCAN_BLACKLIST"]) {
            extend_unique(&mut self.targets.blacklist, &rules);
        }
        if let Some(allow) = flag(var(&["NETKIT_ALLOW_PRIVATE_IPS", "ALLOW_PRIVATE_IPS"])) {
            self.targets.allow_private = allow;
        }

        // Job overrides
        if let Some(max) = parsed(var(&["NETKIT_MAX_JOBS", "MAX_CONCURRENT_JOBS"])) {
            self.jobs.max_jobs = max;
        }
        if let Some(secs) = parsed(var(&["NETKIT_JOB_RETENTION_SECS", "JOB_CLEANUP_INTERVAL"])) {
            self.jobs.retention_secs = secs;
        }

        // Execution and capability overrides
        if let Some(bytes) = parsed(var(&["NETKIT_MAX_OUTPUT_BYTES"])) {
            self.execution.max_output_bytes = bytes;
        }
        if let Some(net_raw) = flag(var(&["NETKIT_ASSUME_NET_RAW"])) {
            self.capabilities.assume_net_raw = Some(net_raw);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }
        if self.server.max_request_bytes == 0 {
            anyhow::bail!("Maximum request size must be > 0");
        }
        if self.execution.max_output_bytes == 0 {
            anyhow::bail!("Maximum output size must be > 0");
        }

        self.rate_limit.validate()?;
        self.jobs.validate()?;

        TargetRule::parse_all(&self.targets.whitelist).context("Invalid whitelist rule")?;
        TargetRule::parse_all(&self.targets.blacklist).context("Invalid blacklist rule")?;

        if self.auth.enabled && self.auth.api_keys.is_empty() {
            tracing::warn!("Authentication is enabled but no API keys are configured; all authenticated endpoints will reject requests");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

fn parsed<T: std::str::FromStr>(value: Option<(String, String)>) -> Option<T> {
    let (name, raw) = value?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring {}: invalid value {:?}", name, raw);
            None
        }
    }
}

fn flag(value: Option<(String, String)>) -> Option<bool> {
    let (name, raw) = value?;
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => {
            tracing::warn!("Ignoring {}: invalid boolean {:?}", name, raw);
            None
        }
    }
}

/// Append comma-separated entries, skipping blanks and duplicates
fn extend_unique(list: &mut Vec<String>, raw: &str) {
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if !list.iter().any(|existing| existing == entry) {
            list.push(entry.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::{Builder, NamedTempFile};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.server.max_request_bytes, 1024 * 1024);
        assert!(config.auth.enabled);
        assert_eq!(config.rate_limit.global_limit, 100);
        assert_eq!(config.jobs.max_jobs, 100);
        assert_eq!(config.execution.max_output_bytes, 10 * 1024 * 1024);
        assert!(!config.targets.allow_private);
        assert!(config.capabilities.assume_net_raw.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_values() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate_limit.per_ip_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.jobs.max_jobs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.targets.blacklist = vec!["10.0.0.0/99".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("nonexistent");
        let config = Config::load_from_path(&path);
        assert!(config.is_ok());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("missing");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
format = "json"

[server]
port = 9000

[auth]
api_keys = ["k1", "k2"]

[rate_limit]
per_ip_limit = 5

[targets]
whitelist = ["*.example.com", "192.0.2.0/24"]
allow_private = true

[jobs]
max_jobs = 7

[capabilities]
assume_net_raw = false
"#;
        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::parse(temp_file.path(), toml_content).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.auth.api_keys, vec!["k1", "k2"]);
        assert_eq!(config.rate_limit.per_ip_limit, 5);
        assert_eq!(config.rate_limit.global_limit, 100);
        assert_eq!(config.targets.whitelist.len(), 2);
        assert!(config.targets.allow_private);
        assert_eq!(config.jobs.max_jobs, 7);
        assert_eq!(config.capabilities.assume_net_raw, Some(false));
    }

    #[test]
    fn test_load_json_by_extension() {
        let temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        fs::write(
            temp_file.path(),
            r#"{"server": {"port": 8123}, "targets": {"blacklist": ["*.gov"]}}"#,
        )
        .unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        let config = Config::parse(temp_file.path(), &content).unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.targets.blacklist, vec!["*.gov"]);
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
        fs::write(temp_file.path(), "[logging\nlevel = \"debug\"\n").unwrap();
        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().apply_overrides_from(env(&[
            ("NETKIT_LOG_LEVEL", "debug"),
            ("API_PORT", "9100"),
            ("RATE_LIMIT_GLOBAL", "500"),
            ("NETKIT_RATE_LIMIT_PER_KEY", "75"),
            ("ALLOW_PRIVATE_IPS", "yes"),
            ("MAX_CONCURRENT_JOBS", "12"),
            ("JOB_CLEANUP_INTERVAL", "120"),
            ("NETKIT_ASSUME_NET_RAW", "on"),
        ]));

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.rate_limit.global_limit, 500);
        assert_eq!(config.rate_limit.per_key_limit, 75);
        assert!(config.targets.allow_private);
        assert_eq!(config.jobs.max_jobs, 12);
        assert_eq!(config.jobs.retention_secs, 120);
        assert_eq!(config.capabilities.assume_net_raw, Some(true));
    }

    #[test]
    fn test_env_prefixed_name_wins() {
        let config = Config::default()
            .apply_overrides_from(env(&[("NETKIT_PORT", "7000"), ("API_PORT", "7001")]));
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn test_env_lists_extend_and_dedup() {
        let mut config = Config::default();
        config.auth.api_keys = vec!["file-key".to_string()];
        config.targets.blacklist = vec!["*.gov".to_string()];

        let config = config.apply_overrides_from(env(&[
            ("API_KEYS", "env-key, file-key,,env-key"),
            ("SCAN_BLACKLIST", "*.mil,*.gov"),
        ]));

        assert_eq!(config.auth.api_keys, vec!["file-key", "env-key"]);
        assert_eq!(config.targets.blacklist, vec!["*.gov", "*.mil"]);
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let config = Config::default().apply_overrides_from(env(&[
            ("API_PORT", "not-a-port"),
            ("ALLOW_PRIVATE_IPS", "maybe"),
            ("MAX_CONCURRENT_JOBS", "-1"),
        ]));

        // Invalid values keep the defaults
        assert_eq!(config.server.port, 8090);
        assert!(!config.targets.allow_private);
        assert_eq!(config.jobs.max_jobs, 100);
    }

    #[test]
    fn test_locate_prefers_env_path() {
        let temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
        let found = Config::locate(Some(temp_file.path().to_path_buf()));
        assert_eq!(found.as_deref(), Some(temp_file.path()));
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);

        config.logging.level = "invalid".to_string();
        assert!(config.log_level().is_err());
    }

    #[test]
    fn test_listen_addr() {
        let server = ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 8091,
            ..Default::default()
        };
        assert_eq!(server.listen_addr(), "127.0.0.1:8091");
    }
}

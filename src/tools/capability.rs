//! Network Capability Detection
//!
//! Some scans need raw sockets (CAP_NET_RAW). The gateway asks a
//! [`CapabilityProbe`] once and caches the answer for the process lifetime.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::GatewayError;

/// Message returned when a privileged operation is refused
pub const NET_RAW_REQUIRED: &str = "This operation requires CAP_NET_RAW capability. \
     Run container with: --cap-add=NET_RAW --cap-add=NET_ADMIN";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const PRIVILEGE_ERRORS: &[&str] = &[
    "requires root privileges",
    "you requested a scan type which requires root",
    "permission denied",
];

/// Capability summary reported by health checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    pub net_raw: bool,
    pub net_admin: bool,
    pub features: BTreeMap<&'static str, bool>,
}

impl CapabilityReport {
    pub fn from_net_raw(net_raw: bool) -> Self {
        let features = BTreeMap::from([
            ("ssh", true),
            ("dns_tools", true),
            ("web_tools", true),
            ("nmap_connect_scan", true),
            ("nmap_syn_scan", net_raw),
            ("nmap_os_detection", net_raw),
            ("traceroute", net_raw),
            ("raw_sockets", net_raw),
        ]);
        Self {
            net_raw,
            // Granted together in practice
            net_admin: net_raw,
            features,
        }
    }
}

/// Source of truth for "may this process open raw sockets"
#[async_trait]
pub trait CapabilityProbe: Send + Sync + std::fmt::Debug {
    async fn has_net_raw(&self) -> bool;

    async fn report(&self) -> CapabilityReport {
        CapabilityReport::from_net_raw(self.has_net_raw().await)
    }

    /// Fail with a permission error unless raw sockets are available
    async fn require_net_raw(&self) -> Result<(), GatewayError> {
        if self.has_net_raw().await {
            Ok(())
        } else {
            Err(GatewayError::permission(NET_RAW_REQUIRED))
        }
    }
}

/// Fixed answer, for configuration overrides and tests
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe {
    net_raw: bool,
}

impl StaticProbe {
    pub fn new(net_raw: bool) -> Self {
        Self { net_raw }
    }
}

#[async_trait]
impl CapabilityProbe for StaticProbe {
    async fn has_net_raw(&self) -> bool {
        self.net_raw
    }
}

/// Detects CAP_NET_RAW by attempting a SYN scan of localhost with nmap
#[derive(Debug, Default)]
pub struct NmapProbe {
    cached: OnceCell<bool>,
}

impl NmapProbe {
    pub fn new() -> Self {
        Self::default()
    }

    async fn detect() -> bool {
        let probe = TokioCommand::new("nmap")
            .args(["-sS", "-p", "80", "--host-timeout", "1s", "127.0.0.1"])
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("nmap not found - cannot check CAP_NET_RAW");
                return false;
            }
            Ok(Err(e)) => {
                warn!("CAP_NET_RAW check failed: {}", e);
                return false;
            }
            Err(_) => {
                warn!("CAP_NET_RAW check timed out");
                return false;
            }
        };

        let has_cap = !lacks_privilege(&String::from_utf8_lossy(&output.stderr));
        if has_cap {
            info!("CAP_NET_RAW detected - privileged network operations enabled");
        } else {
            warn!(
                "CAP_NET_RAW not available - privileged operations will fail. \
                 Run container with: --cap-add=NET_RAW --cap-add=NET_ADMIN"
            );
        }
        has_cap
    }
}

#[async_trait]
impl CapabilityProbe for NmapProbe {
    async fn has_net_raw(&self) -> bool {
        *self.cached.get_or_init(Self::detect).await
    }
}

fn lacks_privilege(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    PRIVILEGE_ERRORS.iter().any(|needle| stderr.contains(needle))
}

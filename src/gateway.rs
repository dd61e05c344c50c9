//! Gateway Dispatcher
//!
//! The single entry point behind every outer surface. A request flows through:
//!
//! ```text
//! authenticate → admit (rate limiter) → resolve tool → check availability
//!     → build argv → capability check → target validation → timeout bounds
//!     → execute now | submit as job
//! ```
//!
//! Every stage before execution can reject the request; nothing is spawned
//! until all of them pass.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::jobs::{JobManager, JobMetadata, JobStats, JobStatus};
use crate::metrics;
use crate::rate_limit::{RateLimitStats, RateLimiter};
use crate::targets::TargetValidator;
use crate::tools::{
    split_command, CapabilityProbe, CapabilityReport, CommandBuilder, CommandValidationError,
    ExecRequest, ExecutionResult, ExecutorConfig, NmapProbe, StaticProbe, Tool, ToolExecutor,
    ToolRegistry,
};

/// Who is asking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Client address, used for per-IP limits and job metadata
    pub ip: String,

    /// Whether authentication succeeded
    pub authenticated: bool,

    /// API key the caller authenticated with, if any
    pub principal: Option<String>,
}

impl Caller {
    pub fn new(ip: impl Into<String>, authenticated: bool, principal: Option<String>) -> Self {
        Self {
            ip: ip.into(),
            authenticated,
            principal,
        }
    }

    /// An authenticated local caller (CLI, stdio)
    pub fn local() -> Self {
        Self::new("local", true, None)
    }
}

/// Handle returned for an accepted background job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub tool: String,
}

/// Outcome of a dispatched request
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Ran synchronously
    Completed(ExecutionResult),
    /// Queued as a background job
    Accepted(JobAccepted),
}

/// A request that passed every check and is ready to spawn
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub tool: String,
    pub argv: Vec<String>,
    pub timeout: Duration,
    pub output_format: String,
}

/// Tool counts for the stats endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStats {
    pub total: usize,
    pub available: usize,
}

/// Combined statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub rate_limiter: RateLimitStats,
    pub job_manager: JobStats,
    pub tools: ToolStats,
}

/// Request admission and execution control plane
#[derive(Debug, Clone)]
pub struct Gateway {
    registry: Arc<ToolRegistry>,
    builder: CommandBuilder,
    executor: ToolExecutor,
    targets: Arc<TargetValidator>,
    limiter: RateLimiter,
    jobs: JobManager,
    probe: Arc<dyn CapabilityProbe>,
}

impl Gateway {
    pub fn new(
        registry: ToolRegistry,
        targets: TargetValidator,
        limiter: RateLimiter,
        jobs: JobManager,
        probe: Arc<dyn CapabilityProbe>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            builder: CommandBuilder::new(),
            executor: ToolExecutor::new(),
            targets: Arc::new(targets),
            limiter,
            jobs,
            probe,
        }
    }

    /// Wire every component from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        use anyhow::Context;

        let targets = TargetValidator::from_rules(
            &config.targets.whitelist,
            &config.targets.blacklist,
            config.targets.allow_private,
        )
        .context("Invalid target rule")?;

        let probe: Arc<dyn CapabilityProbe> = match config.capabilities.assume_net_raw {
            Some(net_raw) => Arc::new(StaticProbe::new(net_raw)),
            None => Arc::new(NmapProbe::new()),
        };

        let gateway = Self::new(
            ToolRegistry::with_builtin_tools(),
            targets,
            RateLimiter::new(config.rate_limit.clone()),
            JobManager::new(config.jobs.clone()),
            probe,
        )
        .with_executor(ToolExecutor::with_config(ExecutorConfig::with_max_output_size(
            config.execution.max_output_bytes,
        )));

        Ok(gateway)
    }

    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Whether a tool's binary is installed; PATH searches run on the
    /// blocking pool
    pub async fn tool_available(&self, name: &str) -> bool {
        let registry = Arc::clone(&self.registry);
        let name = name.to_string();
        tokio::task::spawn_blocking(move || registry.is_available(&name))
            .await
            .unwrap_or(false)
    }

    /// Installed state of every registered tool
    pub async fn tool_availability(&self) -> BTreeMap<String, bool> {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || registry.availability())
            .await
            .unwrap_or_default()
    }

    pub fn targets(&self) -> &TargetValidator {
        &self.targets
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub async fn capabilities(&self) -> CapabilityReport {
        self.probe.report().await
    }

    /// Full pipeline for an external caller
    pub async fn handle(&self, caller: &Caller, request: ExecRequest) -> Result<Dispatch> {
        if !caller.authenticated {
            warn!(client_ip = %caller.ip, "unauthenticated execution request");
            return Err(GatewayError::Unauthorized("Unauthorized".to_string()));
        }

        let admission = self
            .limiter
            .check_and_record(&caller.ip, caller.principal.as_deref())
            .await;
        if !admission.allowed {
            if let Some(scope) = admission.scope {
                metrics::record_rate_limited(scope.as_str());
            }
            return Err(GatewayError::RateLimited {
                message: admission
                    .reason
                    .unwrap_or_else(|| "Rate limit exceeded".to_string()),
                retry_after_secs: admission.retry_after_secs,
            });
        }

        let (tool, request) = self.resolve(request)?;
        info!(
            op = "exec",
            tool = %tool.descriptor().name,
            client_ip = %caller.ip,
            run_async = request.run_async,
            "tool execution request"
        );

        let outcome = self.run_resolved(tool.as_ref(), &request, caller).await;
        if let Err(ref e) = outcome {
            metrics::record_request(&tool.descriptor().name, e.kind());
        }
        outcome
    }

    /// Pipeline without authentication or rate limiting, for trusted local
    /// surfaces
    pub async fn run(&self, request: ExecRequest) -> Result<Dispatch> {
        let (tool, request) = self.resolve(request)?;
        self.run_resolved(tool.as_ref(), &request, &Caller::local())
            .await
    }

    async fn run_resolved(
        &self,
        tool: &dyn Tool,
        request: &ExecRequest,
        caller: &Caller,
    ) -> Result<Dispatch> {
        let name = &tool.descriptor().name;
        if !self.tool_available(name).await {
            return Err(GatewayError::unavailable(format!(
                "Tool '{}' is not installed or not available",
                name
            )));
        }

        let prepared = self.prepare(tool, request).await?;

        if request.run_async {
            let metadata = JobMetadata::new(name.clone())
                .with_ip(caller.ip.clone())
                .with_api_key(caller.principal.as_deref());
            self.submit(prepared, metadata).await.map(Dispatch::Accepted)
        } else {
            self.execute(prepared).await.map(Dispatch::Completed)
        }
    }

    /// Find the tool and normalise the request
    ///
    /// Without `tool`, `command` is a full command line whose first word
    /// names the tool; the remaining words become `args`.
    pub fn resolve(&self, mut request: ExecRequest) -> Result<(Arc<dyn Tool>, ExecRequest)> {
        let name = match request.tool.clone() {
            Some(name) => name,
            None => {
                let command = request.command.take().ok_or_else(|| {
                    GatewayError::validation(
                        "Must provide either 'command' (full command string) or 'tool' (with args/command)",
                    )
                })?;
                if request.args.is_some() {
                    return Err(CommandValidationError::ConflictingInput.into());
                }
                let mut words = split_command(&command)?;
                if words.is_empty() {
                    return Err(CommandValidationError::EmptyCommand.into());
                }
                let name = words.remove(0);
                request.tool = Some(name.clone());
                request.args = Some(words);
                name
            }
        };

        let tool = self.registry.get(&name).ok_or_else(|| {
            GatewayError::validation(format!(
                "Unknown tool: {}. See /tools for available tools",
                name
            ))
        })?;
        Ok((tool, request))
    }

    /// Build and check everything needed to spawn, without spawning
    pub async fn prepare(&self, tool: &dyn Tool, request: &ExecRequest) -> Result<PreparedCommand> {
        let descriptor = tool.descriptor();
        let argv = self.builder.build(tool, request)?;
        let args = &argv[1..];

        if tool.needs_capability(args) {
            self.probe.require_net_raw().await?;
        }

        let scan_targets = tool.scan_targets(args, request);
        let decision = self.targets.validate_multiple(&scan_targets);
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "Target not allowed".to_string());
            warn!(tool = %descriptor.name, "target rejected: {}", reason);
            return Err(GatewayError::Validation(reason));
        }

        let timeout = descriptor.timeouts.resolve(request.timeout)?;
        debug!(tool = %descriptor.name, argv = ?argv, timeout_secs = timeout.as_secs(), "command prepared");

        Ok(PreparedCommand {
            tool: descriptor.name.clone(),
            argv,
            timeout,
            output_format: request.output_format().to_string(),
        })
    }

    /// Run a prepared command now
    pub async fn execute(&self, prepared: PreparedCommand) -> Result<ExecutionResult> {
        execute_prepared(self.executor.clone(), prepared).await
    }

    /// Queue a prepared command as a background job
    pub async fn submit(&self, prepared: PreparedCommand, metadata: JobMetadata) -> Result<JobAccepted> {
        let tool = prepared.tool.clone();
        let work = execute_prepared(self.executor.clone(), prepared);
        let job_id = self.jobs.create_job(metadata, work).await?;
        metrics::record_request(&tool, "accepted");

        Ok(JobAccepted {
            job_id,
            status: JobStatus::Pending,
            tool,
        })
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            rate_limiter: self.limiter.get_stats().await,
            job_manager: self.jobs.get_stats().await,
            tools: ToolStats {
                total: self.registry.len(),
                available: self.tool_availability().await.values().filter(|a| **a).count(),
            },
        }
    }
}

async fn execute_prepared(executor: ToolExecutor, prepared: PreparedCommand) -> Result<ExecutionResult> {
    let PreparedCommand {
        tool,
        argv,
        timeout,
        output_format,
    } = prepared;

    let result = executor.execute(&argv, timeout).await?;
    metrics::record_execution(&tool, result.duration_seconds, result.timed_out);
    metrics::record_request(&tool, if result.timed_out { "timeout" } else { "completed" });

    Ok(result.labelled(tool, output_format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobConfig;
    use crate::rate_limit::RateLimitConfig;
    use crate::tools::{GenericTool, ToolDescriptor, NET_RAW_REQUIRED};

    fn gateway_with(targets: TargetValidator, net_raw: bool) -> Gateway {
        let mut registry = ToolRegistry::with_builtin_tools();
        registry.register(Arc::new(GenericTool::new(ToolDescriptor::new(
            "echo",
            "echo",
            "Print arguments",
        ))));
        Gateway::new(
            registry,
            targets,
            RateLimiter::new(RateLimitConfig::new(100, 3, 50)),
            JobManager::new(JobConfig::default()),
            Arc::new(StaticProbe::new(net_raw)),
        )
    }

    fn gateway() -> Gateway {
        gateway_with(TargetValidator::permissive(), false)
    }

    #[test]
    fn test_resolve_command_form() {
        let gw = gateway();
        let (tool, request) = gw
            .resolve(ExecRequest::from_command("dig google.com +short"))
            .unwrap();

        assert_eq!(tool.descriptor().name, "dig");
        assert_eq!(request.tool.as_deref(), Some("dig"));
        assert_eq!(
            request.args,
            Some(vec!["google.com".to_string(), "+short".to_string()])
        );
        assert!(request.command.is_none());
    }

    #[tokio::test]
    async fn test_command_form_matches_args_form() {
        let gw = gateway();

        let (tool_a, a) = gw.resolve(ExecRequest::from_command("dig google.com +short")).unwrap();
        let (tool_b, b) = gw
            .resolve(ExecRequest::with_args("dig", ["google.com", "+short"]))
            .unwrap();

        let argv_a = gw.prepare(tool_a.as_ref(), &a).await.unwrap().argv;
        let argv_b = gw.prepare(tool_b.as_ref(), &b).await.unwrap().argv;
        assert_eq!(argv_a, argv_b);
    }

    #[test]
    fn test_resolve_errors() {
        let gw = gateway();

        let err = gw.resolve(ExecRequest::default()).unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = gw.resolve(ExecRequest::from_command("   ")).unwrap_err();
        assert_eq!(err, GatewayError::Validation("Empty command".to_string()));

        let err = gw.resolve(ExecRequest::from_command("rm -rf /")).unwrap_err();
        assert_eq!(
            err,
            GatewayError::Validation("Unknown tool: rm. See /tools for available tools".to_string())
        );

        let err = gw
            .resolve(ExecRequest::with_args("telnet", ["example.com"]))
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_prepare_rejects_denied_target() {
        let targets = TargetValidator::from_rules(&["*.example.com"], &[], false).unwrap();
        let gw = gateway_with(targets, false);

        let (tool, request) = gw
            .resolve(ExecRequest::with_args("dig", ["google.com"]))
            .unwrap();
        let err = gw.prepare(tool.as_ref(), &request).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Validation("Target google.com not in whitelist".to_string())
        );

        let (tool, request) = gw
            .resolve(ExecRequest::with_args("dig", ["api.example.com"]))
            .unwrap();
        assert!(gw.prepare(tool.as_ref(), &request).await.is_ok());
    }

    #[tokio::test]
    async fn test_prepare_rejects_private_target_by_default() {
        let gw = gateway_with(TargetValidator::default(), false);
        let (tool, request) = gw
            .resolve(ExecRequest::with_args("ping", ["127.0.0.1"]))
            .unwrap();
        let err = gw.prepare(tool.as_ref(), &request).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Validation("Private IP addresses not allowed: 127.0.0.1".to_string())
        );
    }

    #[tokio::test]
    async fn test_prepare_checks_unusual_target_spellings() {
        let gw = gateway_with(TargetValidator::default(), true);
        for (command, denied) in [
            ("nmap -sT 10.0.0.1-20", "10.0.0.0/27"),
            ("curl http://2130706433/", "127.0.0.1"),
            ("ping 0x7f000001", "127.0.0.1"),
        ] {
            let (tool, request) = gw.resolve(ExecRequest::from_command(command)).unwrap();
            let err = gw.prepare(tool.as_ref(), &request).await.unwrap_err();
            assert_eq!(
                err,
                GatewayError::Validation(format!("Private IP addresses not allowed: {}", denied)),
                "{}",
                command
            );
        }

        let targets = TargetValidator::from_rules(&["*.example.com"], &[], false).unwrap();
        let gw = gateway_with(targets, true);
        let (tool, request) = gw
            .resolve(ExecRequest::from_command("nmap -sT -p 22 intranet"))
            .unwrap();
        let err = gw.prepare(tool.as_ref(), &request).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Validation("Target intranet not in whitelist".to_string())
        );

        let (tool, request) = gw
            .resolve(ExecRequest::from_command("dig api.example.com MX +short"))
            .unwrap();
        assert!(gw.prepare(tool.as_ref(), &request).await.is_ok());
    }

    #[tokio::test]
    async fn test_prepare_enforces_capability() {
        let gw = gateway_with(TargetValidator::permissive(), false);

        let (tool, request) = gw
            .resolve(ExecRequest::from_command("nmap -sS -p 80 scanme.nmap.org"))
            .unwrap();
        let err = gw.prepare(tool.as_ref(), &request).await.unwrap_err();
        assert_eq!(err, GatewayError::Permission(NET_RAW_REQUIRED.to_string()));

        // Connect scans need no raw sockets
        let (tool, request) = gw
            .resolve(ExecRequest::from_command("nmap -sT -p 80 scanme.nmap.org"))
            .unwrap();
        assert!(gw.prepare(tool.as_ref(), &request).await.is_ok());

        let privileged = gateway_with(TargetValidator::permissive(), true);
        let (tool, request) = privileged
            .resolve(ExecRequest::from_command("traceroute example.com"))
            .unwrap();
        assert!(privileged.prepare(tool.as_ref(), &request).await.is_ok());
    }

    #[tokio::test]
    async fn test_prepare_timeout_bounds() {
        let gw = gateway();

        let (tool, request) = gw
            .resolve(ExecRequest::with_args("testssl", ["example.com"]).timeout(601))
            .unwrap();
        let err = gw.prepare(tool.as_ref(), &request).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Validation("Timeout cannot exceed 600 seconds".to_string())
        );

        let (tool, request) = gw
            .resolve(ExecRequest::with_args("dig", ["example.com"]))
            .unwrap();
        let prepared = gw.prepare(tool.as_ref(), &request).await.unwrap();
        assert_eq!(prepared.timeout, Duration::from_secs(60));
        assert_eq!(prepared.output_format, "text");
    }

    #[tokio::test]
    async fn test_handle_requires_authentication() {
        let gw = gateway();
        let caller = Caller::new("198.51.100.1", false, None);
        let err = gw
            .handle(&caller, ExecRequest::with_args("echo", ["hi"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_handle_rate_limits_before_resolution() {
        let gw = gateway();
        let caller = Caller::new("198.51.100.2", true, Some("key".to_string()));

        for _ in 0..3 {
            let _ = gw.handle(&caller, ExecRequest::from_command("nosuchtool")).await;
        }
        let err = gw
            .handle(&caller, ExecRequest::from_command("nosuchtool"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::RateLimited {
                message: "Rate limit exceeded for your IP address. Try again later.".to_string(),
                retry_after_secs: Some(60),
            }
        );
    }

    #[tokio::test]
    async fn test_handle_sync_execution() {
        let gw = gateway();
        let caller = Caller::new("198.51.100.3", true, None);

        let outcome = gw
            .handle(&caller, ExecRequest::from_command("echo hello gateway"))
            .await
            .unwrap();

        match outcome {
            Dispatch::Completed(result) => {
                assert_eq!(result.exit_code, 0);
                assert_eq!(result.stdout, "hello gateway\n");
                assert_eq!(result.tool, "echo");
                assert_eq!(result.output_format, "text");
            }
            other => panic!("expected completed execution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handle_async_submission() {
        let gw = gateway();
        let caller = Caller::new("198.51.100.4", true, Some("abcdefghijk".to_string()));

        let outcome = gw
            .handle(&caller, ExecRequest::with_args("echo", ["later"]).asynchronous())
            .await
            .unwrap();

        let accepted = match outcome {
            Dispatch::Accepted(accepted) => accepted,
            other => panic!("expected job, got {:?}", other),
        };
        assert_eq!(accepted.status, JobStatus::Pending);
        assert_eq!(accepted.tool, "echo");

        let job = gw.jobs().get_job(&accepted.job_id).await.unwrap();
        assert_eq!(job.metadata.ip.as_deref(), Some("198.51.100.4"));
        assert_eq!(job.metadata.api_key.as_deref(), Some("abcdefgh..."));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(GenericTool::new(ToolDescriptor::new(
            "ghost",
            "definitely-not-installed-netkit-binary",
            "Missing",
        ))));
        let gw = Gateway::new(
            registry,
            TargetValidator::permissive(),
            RateLimiter::disabled(),
            JobManager::default(),
            Arc::new(StaticProbe::new(false)),
        );

        let err = gw.run(ExecRequest::with_args("ghost", ["x"])).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Unavailable("Tool 'ghost' is not installed or not available".to_string())
        );
        assert!(!gw.tool_available("ghost").await);
    }

    #[tokio::test]
    async fn test_tool_availability_off_runtime_threads() {
        let gw = gateway();
        assert!(gw.tool_available("echo").await);
        assert!(!gw.tool_available("unregistered").await);

        let availability = gw.tool_availability().await;
        assert_eq!(availability.len(), 16);
        assert_eq!(availability.get("echo"), Some(&true));
    }

    #[tokio::test]
    async fn test_stats() {
        let gw = gateway();
        gw.handle(
            &Caller::new("198.51.100.5", true, None),
            ExecRequest::from_command("echo stats"),
        )
        .await
        .unwrap();

        let stats = gw.stats().await;
        assert_eq!(stats.rate_limiter.global.current, 1);
        assert_eq!(stats.tools.total, 16);
        assert!(stats.tools.available >= 1);
        assert_eq!(stats.job_manager.total_jobs, 0);
    }
}

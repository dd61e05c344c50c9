//! Tool Execution Subsystem
//!
//! Everything between "the caller named a tool" and "a subprocess ran".
//!
//! # Security Features
//!
//! - **Registered Tools Only**: only tools in the [`ToolRegistry`] can run
//! - **List Invocation**: commands are executed as argument vectors, never through a shell
//! - **Argument Denylist**: shell control sequences are rejected in every argument
//! - **Timeout Enforcement**: per-tool bounds, hard kill on expiry
//! - **Capability Gating**: raw-socket scans require CAP_NET_RAW
//!
//! # Architecture
//!
//! The module is organized into:
//! - `request.rs`: the structured execution request
//! - `validator.rs`: argument denylist
//! - `builder.rs`: request → argument vector
//! - `registry.rs` / `catalog.rs`: tool trait and built-in tools
//! - `targets.rs`: scan target extraction
//! - `timeout.rs`: timeout bounds
//! - `executor.rs`: subprocess execution
//! - `capability.rs`: CAP_NET_RAW detection
//!
//! # Example
//!
//! ```no_run
//! use netkit_gateway::tools::{CommandBuilder, ExecRequest, ToolExecutor, ToolRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = ToolRegistry::with_builtin_tools();
//!     let dig = registry.get("dig").expect("dig is built in");
//!
//!     let request = ExecRequest::with_args("dig", ["example.com", "+short"]);
//!     let argv = CommandBuilder::new().build(dig.as_ref(), &request)?;
//!     let timeout = dig.descriptor().timeouts.resolve(request.timeout)?;
//!
//!     let result = ToolExecutor::new().execute(&argv, timeout).await?;
//!     println!("Exit code: {}", result.exit_code);
//!     println!("Stdout: {}", result.stdout);
//!
//!     Ok(())
//! }
//! ```

mod builder;
mod capability;
mod catalog;
mod executor;
mod registry;
mod request;
mod targets;
mod timeout;
mod validator;

pub use builder::{parse_input, split_command, CommandBuilder};
pub use capability::{CapabilityProbe, CapabilityReport, NmapProbe, StaticProbe, NET_RAW_REQUIRED};
pub use catalog::{builtin_tools, GenericTool, NmapTool, PingTool, SshTool};
pub use executor::{ExecutionResult, ExecutorConfig, ToolExecutor, TIMEOUT_EXIT_CODE};
pub use registry::{Tool, ToolDescriptor, ToolRegistry};
pub use request::{ExecRequest, SshOptions, DEFAULT_OUTPUT_FORMAT};
pub use targets::{extract_targets, target_from_arg, ArgumentHints};
pub use timeout::{TimeoutPolicy, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
pub use validator::{CommandValidationError, CommandValidator, DANGEROUS_PATTERNS};

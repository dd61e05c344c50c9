//! Netkit Gateway Library
//!
//! An authenticated control plane for network diagnostic tools. Callers name
//! a tool and its arguments; the gateway rate-limits the request, validates
//! the arguments and the hosts they reach, and runs the tool as a subprocess
//! under a timeout, either inline or as a background job.
//!
//! The [`gateway::Gateway`] owns the pipeline. [`server`] (HTTP) and
//! [`mcp_server`] (JSON-RPC over stdio) are thin adapters over it.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod mcp_server;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod targets;
pub mod tools;

pub use auth::{AuthOutcome, Authenticator};
pub use config::Config;
pub use error::{GatewayError, Result};
pub use gateway::{Caller, Dispatch, Gateway, JobAccepted};

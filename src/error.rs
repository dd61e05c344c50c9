//! Gateway Error Types
//!
//! Every failure the admission and execution pipeline can produce is one of
//! the variants below. The HTTP and MCP adapters translate them into status
//! codes and JSON-RPC error codes respectively.

use thiserror::Error;

use crate::tools::CommandValidationError;

/// Result alias used throughout the gateway core
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the gateway
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Bad input: dangerous argument, timeout out of range, denied target, unknown tool
    #[error("{0}")]
    Validation(String),

    /// Caller failed authentication
    #[error("{0}")]
    Unauthorized(String),

    /// Operation needs a network capability the process does not hold
    #[error("{0}")]
    Permission(String),

    /// Unknown job or tool lookup
    #[error("{0}")]
    NotFound(String),

    /// Admission denied by the rate limiter
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Binary missing from PATH, or job capacity exhausted
    #[error("{0}")]
    Unavailable(String),

    /// Unexpected failure; the detail is logged, never returned to callers
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable label, used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::Permission(_) => "permission",
            Self::NotFound(_) => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// Message safe to hand back to a caller
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<CommandValidationError> for GatewayError {
    fn from(err: CommandValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

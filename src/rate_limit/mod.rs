//! Rate Limiting Module
//!
//! Sliding-window admission control for tool execution requests.
//!
//! # Features
//!
//! - Global, per-IP and per-API-key windows
//! - Atomic check-and-record under a single lock
//! - Lazy pruning on every check, idle scopes swept once per window
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Rate Limiter                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │   Global    │  │   Per-IP    │  │  Per-Key    │         │
//! │  │   Window    │  │   Windows   │  │  Windows    │         │
//! │  └─────────────┘  └─────────────┘  └─────────────┘         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │          Window Store (one tokio Mutex)              │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod manager;
pub mod store;

pub use config::RateLimitConfig;
pub use manager::{LimitScope, RateLimitResult, RateLimitStats, RateLimiter};
pub use store::{SlidingWindow, WindowStore};

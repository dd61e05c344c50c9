//! Background Job Management
//!
//! Asynchronous tool executions: submit, poll, list, delete. Finished jobs
//! are swept after a retention window.

pub mod config;
pub mod job;
pub mod manager;

pub use config::JobConfig;
pub use job::{key_fingerprint, Job, JobMetadata, JobStatus};
pub use manager::{JobManager, JobStats};

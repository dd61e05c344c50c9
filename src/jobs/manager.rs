// Job manager - runs tool executions in the background
//
// Manages:
// - Job submission with a cap on tracked jobs
// - Background execution and result write-back
// - Periodic cleanup of finished jobs past retention
// - Listing and statistics

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::JobConfig;
use super::job::{Job, JobMetadata, JobStatus};
use crate::error::{GatewayError, Result};
use crate::metrics;
use crate::tools::ExecutionResult;

type JobTable = Arc<RwLock<HashMap<String, Job>>>;

/// Job manager statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub total_jobs: usize,
    pub max_jobs: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub cleanup_interval: u64,
}

/// Background job manager
///
/// Cloning is cheap; clones share the job table.
///
/// Deleting a job only removes its record. The underlying execution keeps
/// running until it finishes or its own timeout fires; its result is then
/// discarded.
#[derive(Debug, Clone)]
pub struct JobManager {
    jobs: JobTable,
    config: Arc<JobConfig>,
    sequence: Arc<AtomicU64>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new(JobConfig::default())
    }
}

impl JobManager {
    /// Create a new job manager
    pub fn new(config: JobConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            sequence: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Submit work and return its job id immediately
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] when `max_jobs` jobs are already
    /// tracked.
    pub async fn create_job<F>(&self, metadata: JobMetadata, work: F) -> Result<String>
    where
        F: Future<Output = Result<ExecutionResult>> + Send + 'static,
    {
        let job = Job::new(metadata, self.sequence.fetch_add(1, Ordering::Relaxed));
        let job_id = job.job_id.clone();
        let tool = job.metadata.tool.clone();

        {
            let mut jobs = self.jobs.write().await;
            if jobs.len() >= self.config.max_jobs {
                warn!(max_jobs = self.config.max_jobs, "job capacity reached");
                return Err(GatewayError::unavailable(format!(
                    "Maximum concurrent jobs ({}) reached. Try again later or wait for existing jobs to complete.",
                    self.config.max_jobs
                )));
            }
            jobs.insert(job_id.clone(), job);
        }

        info!(job_id = %job_id, tool = %tool, "job created");
        metrics::record_job_created(&tool);

        tokio::spawn(run_job(Arc::clone(&self.jobs), job_id.clone(), work));
        Ok(job_id)
    }

    /// Copy of a job with `duration_seconds` filled in
    pub async fn get_job(&self, job_id: &str) -> Option<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(|job| job.snapshot(Utc::now()))
    }

    /// Jobs newest first, optionally filtered by status
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        let now = Utc::now();
        let jobs = self.jobs.read().await;

        let mut selected: Vec<&Job> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .collect();
        selected.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        selected
            .into_iter()
            .take(limit)
            .map(|job| job.snapshot(now))
            .collect()
    }

    /// Forget a job; returns whether it existed
    pub async fn delete_job(&self, job_id: &str) -> bool {
        let removed = self.jobs.write().await.remove(job_id).is_some();
        if removed {
            info!(job_id, "job deleted");
        }
        removed
    }

    /// Remove finished jobs older than the retention window
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let retention = self.config.retention_secs;
        let mut jobs = self.jobs.write().await;

        let before = jobs.len();
        jobs.retain(|_, job| !job.is_expired(now, retention));
        let removed = before - jobs.len();

        if removed > 0 {
            info!(removed, remaining = jobs.len(), "cleaned up expired jobs");
        }
        removed
    }

    /// Start the periodic cleanup sweep
    ///
    /// The task runs until [`JobManager::shutdown`] is called.
    pub fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let mut stop = self.shutdown.subscribe();
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let sweep = tokio::spawn({
                            let manager = manager.clone();
                            async move { manager.cleanup_expired().await }
                        });
                        match sweep.await {
                            Ok(removed) => debug!(removed, "job sweep finished"),
                            Err(e) => error!("job sweep failed: {}", e),
                        }
                        manager.publish_gauges().await;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            debug!("job sweep stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stop the cleanup sweep
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Count of jobs per status
    pub async fn get_stats(&self) -> JobStats {
        let jobs = self.jobs.read().await;

        let mut by_status: BTreeMap<&'static str, usize> =
            JobStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        for job in jobs.values() {
            *by_status.entry(job.status.as_str()).or_default() += 1;
        }

        JobStats {
            total_jobs: jobs.len(),
            max_jobs: self.config.max_jobs,
            by_status,
            cleanup_interval: self.config.retention_secs,
        }
    }

    /// Push per-status counts to the jobs gauge
    pub async fn publish_gauges(&self) {
        let stats = self.get_stats().await;
        for (status, count) in &stats.by_status {
            metrics::set_jobs_by_status(status, *count);
        }
    }
}

/// Drive one job through running to its terminal state
async fn run_job<F>(jobs: JobTable, job_id: String, work: F)
where
    F: Future<Output = Result<ExecutionResult>> + Send + 'static,
{
    {
        let mut table = jobs.write().await;
        match table.get_mut(&job_id) {
            Some(job) => {
                job.mark_running(Utc::now());
            }
            None => {
                debug!(job_id = %job_id, "job deleted before start");
                return;
            }
        }
    }
    debug!(job_id = %job_id, "job running");

    // A panic inside the work must still leave the job in a terminal state
    let outcome = match tokio::spawn(work).await {
        Ok(outcome) => outcome,
        Err(e) => Err(GatewayError::internal(format!("job task aborted: {}", e))),
    };

    let mut table = jobs.write().await;
    let Some(job) = table.get_mut(&job_id) else {
        debug!(job_id = %job_id, "job deleted while running, dropping result");
        return;
    };

    match outcome {
        Ok(result) => {
            info!(job_id = %job_id, exit_code = result.exit_code, "job completed");
            job.complete(result, Utc::now());
        }
        Err(e) => {
            if matches!(e, GatewayError::Internal(_)) {
                error!(job_id = %job_id, "job failed: {}", e);
            } else {
                warn!(job_id = %job_id, "job failed: {}", e);
            }
            metrics::record_job_failed(&job.metadata.tool);
            job.fail(e.public_message(), Utc::now());
        }
    }
}

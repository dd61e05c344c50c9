// Prometheus metrics for the netkit gateway
//
// Exposes metrics on the /metrics HTTP endpoint:
// - Requests by tool and outcome (counter)
// - Rate limit denials by scope (counter)
// - Execution durations by tool (histogram)
// - Timeouts by tool (counter)
// - Jobs by status (gauge), jobs created/failed (counter)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Admission metrics
    pub static ref REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("netkit_requests_total", "Execution requests by tool and outcome"),
        &["tool", "outcome"]
    ).expect("Failed to create requests total metric");

    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("netkit_rate_limited_total", "Requests rejected by the rate limiter"),
        &["scope"]
    ).expect("Failed to create rate limited metric");

    // Execution metrics
    pub static ref EXECUTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("netkit_execution_duration_seconds", "Tool execution duration in seconds")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["tool"]
    ).expect("Failed to create execution duration metric");

    pub static ref EXECUTION_TIMEOUTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("netkit_execution_timeouts_total", "Executions killed by their timeout"),
        &["tool"]
    ).expect("Failed to create execution timeouts metric");

    // Job metrics
    pub static ref JOBS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("netkit_jobs", "Tracked background jobs by status"),
        &["status"]
    ).expect("Failed to create jobs gauge");

    pub static ref JOBS_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("netkit_jobs_created_total", "Background jobs submitted"),
        &["tool"]
    ).expect("Failed to create jobs created metric");

    pub static ref JOBS_FAILED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("netkit_jobs_failed_total", "Background jobs that ended in failure"),
        &["tool"]
    ).expect("Failed to create jobs failed metric");
}

static INIT: Once = Once::new();

/// Register every metric with the registry; safe to call more than once
pub fn init() -> prometheus::Result<()> {
    let mut outcome = Ok(());
    INIT.call_once(|| {
        outcome = register_all();
    });
    outcome
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMITED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXECUTION_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(EXECUTION_TIMEOUTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOBS.clone()))?;
    REGISTRY.register(Box::new(JOBS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOBS_FAILED_TOTAL.clone()))?;
    Ok(())
}

pub fn record_request(tool: &str, outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[tool, outcome]).inc();
}

pub fn record_rate_limited(scope: &str) {
    RATE_LIMITED_TOTAL.with_label_values(&[scope]).inc();
}

pub fn record_execution(tool: &str, duration_seconds: f64, timed_out: bool) {
    EXECUTION_DURATION_SECONDS
        .with_label_values(&[tool])
        .observe(duration_seconds);
    if timed_out {
        EXECUTION_TIMEOUTS_TOTAL.with_label_values(&[tool]).inc();
    }
}

pub fn record_job_created(tool: &str) {
    JOBS_CREATED_TOTAL.with_label_values(&[tool]).inc();
}

pub fn record_job_failed(tool: &str) {
    JOBS_FAILED_TOTAL.with_label_values(&[tool]).inc();
}

pub fn set_jobs_by_status(status: &str, count: usize) {
    JOBS.with_label_values(&[status]).set(count as i64);
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

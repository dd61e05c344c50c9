// Job records
//
// A job tracks one background tool execution from submission to its terminal
// state. Status only moves forward: pending -> running -> completed | failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::tools::ExecutionResult;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!(
                "Invalid job status '{}'. Must be one of: pending, running, completed, failed",
                other
            )),
        }
    }
}

/// Who submitted a job and what for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub tool: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// First characters of the API key, never the whole key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl JobMetadata {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ..Default::default()
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_api_key(mut self, key: Option<&str>) -> Self {
        self.api_key = key.map(key_fingerprint);
        self
    }
}

/// First 8 characters of a key followed by `...`
pub fn key_fingerprint(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{}...", prefix)
}

/// A background execution
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub metadata: JobMetadata,

    /// Filled in on read: (completed_at or now) - started_at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    /// Submission order, for stable newest-first listing
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl Job {
    pub fn new(metadata: JobMetadata, sequence: u64) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            metadata,
            duration_seconds: None,
            sequence,
        }
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// pending -> running
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> bool {
        let moved = self.transition(JobStatus::Running);
        if moved {
            self.started_at = Some(now);
        }
        moved
    }

    /// running -> completed
    pub fn complete(&mut self, result: ExecutionResult, now: DateTime<Utc>) -> bool {
        let moved = self.transition(JobStatus::Completed);
        if moved {
            self.result = Some(result);
            self.completed_at = Some(now);
        }
        moved
    }

    /// running -> failed
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> bool {
        let moved = self.transition(JobStatus::Failed);
        if moved {
            self.error = Some(error.into());
            self.completed_at = Some(now);
        }
        moved
    }

    /// Copy with `duration_seconds` filled in
    pub fn snapshot(&self, now: DateTime<Utc>) -> Self {
        let mut copy = self.clone();
        copy.duration_seconds = self.started_at.map(|started| {
            let end = self.completed_at.unwrap_or(now);
            (end - started).num_milliseconds().max(0) as f64 / 1000.0
        });
        copy
    }

    /// Terminal and finished longer than `retention_secs` ago
    pub fn is_expired(&self, now: DateTime<Utc>, retention_secs: u64) -> bool {
        match self.completed_at {
            Some(done) => (now - done).num_seconds() > retention_secs as i64,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result() -> ExecutionResult {
        serde_json::from_value(serde_json::json!({
            "exit_code": 0,
            "stdout": "ok\n",
            "stderr": "",
            "duration_seconds": 0.5,
            "tool": "dig",
            "output_format": "text"
        }))
        .unwrap()
    }

    #[test]
    fn test_status_only_moves_forward() {
        use JobStatus::*;
        let legal = [(Pending, Running), (Running, Completed), (Running, Failed)];

        for from in JobStatus::ALL {
            for to in JobStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_lifecycle() {
        let now = Utc::now();
        let mut job = Job::new(JobMetadata::new("dig"), 0);
        assert_eq!(job.status, JobStatus::Pending);

        // Cannot finish before starting
        assert!(!job.complete(result(), now));
        assert!(job.mark_running(now));
        assert!(!job.mark_running(now));
        assert!(job.complete(result(), now + Duration::seconds(2)));
        assert_eq!(job.status, JobStatus::Completed);

        // Terminal states are final
        assert!(!job.fail("late", now));
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_snapshot_duration() {
        let start = Utc::now();
        let mut job = Job::new(JobMetadata::new("dig"), 0);
        assert_eq!(job.snapshot(start).duration_seconds, None);

        job.mark_running(start);
        let running = job.snapshot(start + Duration::milliseconds(1500));
        assert_eq!(running.duration_seconds, Some(1.5));

        job.fail("boom", start + Duration::seconds(2));
        let done = job.snapshot(start + Duration::seconds(30));
        assert_eq!(done.duration_seconds, Some(2.0));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut job = Job::new(JobMetadata::new("dig"), 0);
        assert!(!job.is_expired(now + Duration::days(1), 60));

        job.mark_running(now);
        job.complete(result(), now);
        assert!(!job.is_expired(now + Duration::seconds(60), 60));
        assert!(job.is_expired(now + Duration::seconds(61), 60));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Completed".parse::<JobStatus>(), Ok(JobStatus::Completed));
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_key_fingerprint() {
        assert_eq!(key_fingerprint("abcdefghijkl"), "abcdefgh...");
        assert_eq!(key_fingerprint("abc"), "abc...");
        let metadata = JobMetadata::new("nmap")
            .with_ip("198.51.100.1")
            .with_api_key(Some("secret-key-123"));
        assert_eq!(metadata.api_key.as_deref(), Some("secret-k..."));
    }

    #[test]
    fn test_job_serialization() {
        let mut job = Job::new(JobMetadata::new("dig"), 7);
        job.mark_running(Utc::now());
        let json = serde_json::to_value(job.snapshot(Utc::now())).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["metadata"]["tool"], "dig");
        assert!(json.get("sequence").is_none());
        assert!(json.get("result").is_none());
    }
}

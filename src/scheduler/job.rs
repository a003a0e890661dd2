//! Retraining job records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::training::TriggerReason;

/// Lifecycle state of a retraining job.
///
/// Every dequeued job reaches exactly one of `Completed`/`Failed`; the
/// record is immutable once terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue
    Pending,
    /// Currently executing
    Running,
    /// Finished with a promoted model
    Completed,
    /// Finished without a promotion (cooldown skip, shortfall, or error)
    Failed,
}

impl JobStatus {
    /// Whether the job has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// The scheduler's unit of work, owned exclusively by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainingJob {
    /// Unique job identifier
    pub job_id: String,
    /// Model to retrain
    pub model_id: String,
    /// Why the job was queued
    pub trigger: TriggerReason,
    /// Current lifecycle state
    pub status: JobStatus,
    /// When the job was enqueued
    pub queued_at: DateTime<Utc>,
    /// When execution started
    pub start_time: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub end_time: Option<DateTime<Utc>>,
    /// Version string of the promoted model, on completion
    pub new_model_version: Option<String>,
    /// Relative NDCG improvement achieved, on completion
    pub ndcg_improvement: Option<f64>,
    /// Human-readable failure reason
    pub error: Option<String>,
}

impl RetrainingJob {
    /// Create a pending job with a fresh id
    pub fn new(model_id: impl Into<String>, trigger: TriggerReason) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            model_id: model_id.into(),
            trigger,
            status: JobStatus::Pending,
            queued_at: Utc::now(),
            start_time: None,
            end_time: None,
            new_model_version: None,
            ndcg_improvement: None,
            error: None,
        }
    }

    /// Transition to `Running`
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.start_time = Some(now);
    }

    /// Terminal transition to `Completed`
    pub fn mark_completed(
        &mut self,
        now: DateTime<Utc>,
        new_model_version: String,
        ndcg_improvement: f64,
    ) {
        self.status = JobStatus::Completed;
        self.end_time = Some(now);
        self.new_model_version = Some(new_model_version);
        self.ndcg_improvement = Some(ndcg_improvement);
    }

    /// Terminal transition to `Failed`
    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.end_time = Some(now);
        self.error = Some(error.into());
    }
}

/// Counts of jobs per lifecycle stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Jobs waiting to start
    pub queued: usize,
    /// Jobs currently in flight (including recently finished, pre-sweep)
    pub active: usize,
    /// Jobs swept into the completed ring
    pub completed: usize,
    /// Whether the processing loop is running
    pub running: bool,
}

//! The retraining control loop

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::drift::{DriftMonitor, TrendReport};
use crate::error::Result;
use crate::metrics::{MetricsRegistry, MetricsUpdate};
use crate::training::{TrainingOrchestrator, TriggerReason};

use super::job::{JobStatus, QueueStatus, RetrainingJob};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum jobs in flight at once
    pub max_concurrent_jobs: usize,
    /// Sleep between loop iterations
    pub poll_interval: Duration,
    /// Longer sleep after a failed iteration
    pub error_backoff: Duration,
    /// How long terminal jobs stay visible in the active map before being
    /// swept into the completed ring
    pub completed_retention: chrono::Duration,
    /// Completed-ring capacity
    pub completed_history: usize,
    /// Relative improvement a run must clear for its job to complete
    pub performance_threshold: f64,
    /// Hard bound on one pipeline run; expiry fails the job and frees the slot
    pub training_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("STEWARD_MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            poll_interval: Duration::from_millis(
                std::env::var("STEWARD_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5_000),
            ),
            error_backoff: Duration::from_secs(30),
            completed_retention: chrono::Duration::seconds(30),
            completed_history: 100,
            performance_threshold: 0.01,
            training_timeout: Duration::from_secs(
                std::env::var("STEWARD_TRAINING_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

impl SchedulerConfig {
    /// Set the concurrency cap
    pub fn with_max_concurrent_jobs(mut self, cap: usize) -> Self {
        self.max_concurrent_jobs = cap.max(1);
        self
    }

    /// Set the loop poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the completion improvement bar
    pub fn with_performance_threshold(mut self, threshold: f64) -> Self {
        self.performance_threshold = threshold;
        self
    }

    /// Set the pipeline timeout
    pub fn with_training_timeout(mut self, timeout: Duration) -> Self {
        self.training_timeout = timeout;
        self
    }

    /// Set the terminal-job retention grace
    pub fn with_completed_retention(mut self, retention: chrono::Duration) -> Self {
        self.completed_retention = retention;
        self
    }
}

/// Models that currently warrant retraining, with the reasons
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainingNeeds {
    pub models_needing_retrain: Vec<String>,
    pub reasons: Vec<String>,
}

/// Condensed drift picture across all tracked models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSummary {
    /// Models with any active alert
    pub models_with_drift: Vec<String>,
    /// Active alerts that require retraining
    pub critical_alert_count: usize,
    /// Suggested operator actions
    pub recommended_actions: Vec<String>,
}

/// Typed outcome of an A/B-test promotion attempt.
///
/// Promotion refusals are business decisions, not system errors, so they
/// come back as `success = false` with a reason instead of an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionOutcome {
    pub success: bool,
    pub message: String,
    pub promoted_model: Option<String>,
}

impl PromotionOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            promoted_model: None,
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    pending: Mutex<VecDeque<RetrainingJob>>,
    active: RwLock<HashMap<String, RetrainingJob>>,
    completed: RwLock<VecDeque<RetrainingJob>>,
}

/// Bounded-concurrency retraining control loop.
///
/// One cooperative loop drives dequeue -> execute -> sweep -> sleep. Jobs
/// run as spawned tasks up to the concurrency cap; shared state is only
/// mutated under the tokio locks, so writers never interleave. Cloning
/// yields another handle to the same scheduler.
#[derive(Clone)]
pub struct RetrainingScheduler {
    config: SchedulerConfig,
    registry: Arc<RwLock<MetricsRegistry>>,
    monitor: Arc<RwLock<DriftMonitor>>,
    orchestrator: Arc<TrainingOrchestrator>,
    state: Arc<SchedulerState>,
    running: Arc<AtomicBool>,
}

impl RetrainingScheduler {
    /// Create a scheduler wired to its collaborators
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<RwLock<MetricsRegistry>>,
        monitor: Arc<RwLock<DriftMonitor>>,
        orchestrator: Arc<TrainingOrchestrator>,
    ) -> Self {
        Self {
            config,
            registry,
            monitor,
            orchestrator,
            state: Arc::new(SchedulerState::default()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared metrics registry handle
    pub fn registry(&self) -> Arc<RwLock<MetricsRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Shared drift monitor handle
    pub fn monitor(&self) -> Arc<RwLock<DriftMonitor>> {
        Arc::clone(&self.monitor)
    }

    /// Enqueue a pending job and return it immediately.
    ///
    /// Fire-and-forget: enqueueing guarantees eventual terminal state once
    /// the loop runs, not execution success.
    pub async fn queue_retraining_job(
        &self,
        model_id: &str,
        trigger: TriggerReason,
    ) -> RetrainingJob {
        let job = RetrainingJob::new(model_id, trigger);
        info!(job_id = %job.job_id, model_id, %trigger, "Queued retraining job");
        self.state.pending.lock().await.push_back(job.clone());
        job
    }

    /// Start the processing loop; a no-op when already running
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already running");
            return;
        }
        info!(
            max_concurrent = self.config.max_concurrent_jobs,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "Starting retraining scheduler"
        );
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop().await;
        });
    }

    /// Ask the processing loop to exit at its next wake
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping retraining scheduler");
        }
    }

    /// Whether the processing loop is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run_loop(self) {
        info!("Retraining scheduler loop started");
        while self.running.load(Ordering::SeqCst) {
            let sleep = match self.tick().await {
                Ok(()) => self.config.poll_interval,
                Err(e) => {
                    error!(error = %e, "Scheduler iteration failed; backing off");
                    self.config.error_backoff
                }
            };
            tokio::time::sleep(sleep).await;
        }
        info!("Retraining scheduler loop stopped");
    }

    /// One loop iteration: fill free slots, then sweep finished jobs
    async fn tick(&self) -> Result<()> {
        self.launch_pending().await;
        self.sweep_completed().await;
        Ok(())
    }

    async fn launch_pending(&self) {
        loop {
            let in_flight = self.in_flight_count().await;
            if in_flight >= self.config.max_concurrent_jobs {
                break;
            }

            let Some(mut job) = self.state.pending.lock().await.pop_front() else {
                break;
            };

            job.mark_running(Utc::now());
            debug!(job_id = %job.job_id, model_id = %job.model_id, "Dequeued retraining job");
            self.state
                .active
                .write()
                .await
                .insert(job.job_id.clone(), job.clone());

            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.execute_retraining_job(job).await;
            });
        }
    }

    async fn in_flight_count(&self) -> usize {
        self.state
            .active
            .read()
            .await
            .values()
            .filter(|j| !j.status.is_terminal())
            .count()
    }

    /// Per-job state machine. Every invocation leaves the job terminal.
    async fn execute_retraining_job(&self, mut job: RetrainingJob) {
        let now = Utc::now();

        let eligible = {
            let registry = self.registry.read().await;
            let monitor = self.monitor.read().await;
            monitor.should_retrain(&registry, &job.model_id, now)
        };

        if !eligible {
            // Cheaper to skip than to train uselessly.
            info!(
                job_id = %job.job_id,
                model_id = %job.model_id,
                "Skipping retraining: cooldown or no critical drift"
            );
            job.mark_failed(Utc::now(), "cooldown or no critical drift");
            self.store_terminal(job).await;
            return;
        }

        let outcome = timeout(
            self.config.training_timeout,
            self.orchestrator.execute_training_pipeline(job.trigger),
        )
        .await;

        match outcome {
            Err(_) => {
                let secs = self.config.training_timeout.as_secs();
                warn!(job_id = %job.job_id, timeout_secs = secs, "Retraining job timed out");
                job.mark_failed(Utc::now(), format!("training timed out after {secs}s"));
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.job_id, error = %e, "Retraining job failed");
                job.mark_failed(Utc::now(), e.to_string());
            }
            Ok(Ok(result)) => {
                if result.improvement >= self.config.performance_threshold {
                    let finished = Utc::now();
                    let version = format!("v{}", finished.format("%Y%m%d%H%M%S"));
                    self.apply_completed_training(&job.model_id, &version, result.improvement)
                        .await;
                    self.monitor
                        .write()
                        .await
                        .mark_retrained(&job.model_id, finished);
                    info!(
                        job_id = %job.job_id,
                        model_id = %job.model_id,
                        improvement = result.improvement,
                        version = %version,
                        "Retraining job completed"
                    );
                    job.mark_completed(finished, version, result.improvement);
                } else {
                    let message = format!(
                        "improvement {:.2}% below required {:.2}%",
                        result.improvement * 100.0,
                        self.config.performance_threshold * 100.0
                    );
                    info!(job_id = %job.job_id, model_id = %job.model_id, "{}", message);
                    job.mark_failed(Utc::now(), message);
                }
            }
        }

        self.store_terminal(job).await;
    }

    /// Raise the retrained model's tracked NDCG by the relative improvement
    /// and stamp the new version.
    async fn apply_completed_training(&self, model_id: &str, version: &str, improvement: f64) {
        let mut registry = self.registry.write().await;
        let Some(current) = registry.metrics(model_id).map(|m| m.ndcg_at_3) else {
            warn!(model_id, "Retrained model is not registered; skipping metrics update");
            return;
        };
        let update = MetricsUpdate {
            version: Some(version.to_string()),
            ndcg_at_3: Some((current * (1.0 + improvement)).min(1.0)),
            ..Default::default()
        };
        if let Err(e) = registry.update_metrics(model_id, update) {
            warn!(model_id, error = %e, "Failed to update retrained model metrics");
        }
    }

    async fn store_terminal(&self, job: RetrainingJob) {
        let mut active = self.state.active.write().await;
        active.insert(job.job_id.clone(), job);
    }

    async fn sweep_completed(&self) {
        let now = Utc::now();
        let mut active = self.state.active.write().await;
        let expired: Vec<String> = active
            .values()
            .filter(|j| {
                j.status.is_terminal()
                    && j.end_time.is_some_and(|t| {
                        now.signed_duration_since(t) >= self.config.completed_retention
                    })
            })
            .map(|j| j.job_id.clone())
            .collect();

        if expired.is_empty() {
            return;
        }

        let mut completed = self.state.completed.write().await;
        for job_id in expired {
            if let Some(job) = active.remove(&job_id) {
                debug!(job_id = %job.job_id, status = ?job.status, "Swept job into history");
                completed.push_back(job);
            }
        }
        while completed.len() > self.config.completed_history {
            completed.pop_front();
        }
    }

    /// Look up a job anywhere in its lifecycle
    pub async fn job_status(&self, job_id: &str) -> Option<RetrainingJob> {
        if let Some(job) = self.state.active.read().await.get(job_id) {
            return Some(job.clone());
        }
        if let Some(job) = self
            .state
            .pending
            .lock()
            .await
            .iter()
            .find(|j| j.job_id == job_id)
        {
            return Some(job.clone());
        }
        self.state
            .completed
            .read()
            .await
            .iter()
            .find(|j| j.job_id == job_id)
            .cloned()
    }

    /// Queue depth across the job lifecycle
    pub async fn queue_status(&self) -> QueueStatus {
        let queued = self.state.pending.lock().await.len();
        let active = self.in_flight_count().await;
        let completed = self.state.completed.read().await.len();
        QueueStatus {
            queued,
            active,
            completed,
            running: self.is_running(),
        }
    }

    /// Models that currently warrant retraining, after the cooldown gate
    pub async fn check_retraining_needs(&self) -> RetrainingNeeds {
        let now = Utc::now();
        let registry = self.registry.read().await;
        let monitor = self.monitor.read().await;

        let recommendation = registry.retraining_recommendation(now);
        let mut models = Vec::new();
        let mut reasons = Vec::new();

        for model_id in recommendation.affected_models {
            if monitor.cooldown_elapsed(&model_id, now) {
                let alert_count = registry
                    .critical_alerts(now)
                    .iter()
                    .filter(|a| a.model_id == model_id)
                    .count();
                reasons.push(format!(
                    "{model_id}: {alert_count} critical drift alert(s), priority {:?}",
                    recommendation.priority
                ));
                models.push(model_id);
            } else {
                reasons.push(format!("{model_id}: in retraining cooldown"));
            }
        }

        RetrainingNeeds {
            models_needing_retrain: models,
            reasons,
        }
    }

    /// Condensed drift picture for dashboards and operators
    pub async fn drift_summary(&self) -> DriftSummary {
        let now = Utc::now();
        let registry = self.registry.read().await;

        let mut models_with_drift: Vec<String> = Vec::new();
        for alert in registry.active_alerts(now) {
            if !models_with_drift.iter().any(|m| m == &alert.model_id) {
                models_with_drift.push(alert.model_id.clone());
            }
        }

        let recommendation = registry.retraining_recommendation(now);
        let recommended_actions = recommendation
            .affected_models
            .iter()
            .map(|m| format!("retrain {m} (priority {:?})", recommendation.priority))
            .collect();

        DriftSummary {
            models_with_drift,
            critical_alert_count: registry.critical_alerts(now).len(),
            recommended_actions,
        }
    }

    /// NDCG trajectory for one model
    pub async fn ndcg_trend(&self, model_id: &str) -> TrendReport {
        self.monitor.read().await.ndcg_trend(model_id)
    }

    /// Promote the winner of a concluded, significant A/B test.
    ///
    /// The winner takes ensemble weight 0.7 and the loser 0.3. Refusals
    /// (missing, still active, not significant, already promoted) return a
    /// failed outcome with the reason.
    pub async fn promote_ab_test_winner(&self, test_id: &str) -> PromotionOutcome {
        let now = Utc::now();
        let mut registry = self.registry.write().await;

        let Some(test) = registry.ab_test(test_id) else {
            return PromotionOutcome::failure(format!("A/B test {test_id} not found"));
        };
        if test.status != crate::metrics::AbTestStatus::Concluded {
            return PromotionOutcome::failure(format!("A/B test {test_id} is still active"));
        }
        if !test.is_significant {
            return PromotionOutcome::failure(format!(
                "A/B test {test_id} is not statistically significant (p={:.4})",
                test.statistical_significance
            ));
        }
        if test.promoted_at.is_some() {
            return PromotionOutcome::failure(format!("A/B test {test_id} was already promoted"));
        }

        let winner = test.winner().to_string();
        let loser = test.loser().to_string();

        registry.set_weight(&winner, 0.7, true);
        registry.set_weight(&loser, 0.3, true);
        if let Err(e) = registry.mark_ab_test_promoted(test_id, now) {
            warn!(test_id, error = %e, "Failed to mark A/B test promoted");
        }

        info!(test_id, winner = %winner, loser = %loser, "Promoted A/B test winner");
        PromotionOutcome {
            success: true,
            message: format!("promoted {winner} to weight 0.7, {loser} to 0.3"),
            promoted_model: Some(winner),
        }
    }
}

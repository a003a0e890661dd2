//! Integration test: retraining scheduler end-to-end

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use polars::prelude::*;
use tokio::sync::RwLock;

use steward::prelude::*;

struct RaceHistoryProvider;

impl DatasetProvider for RaceHistoryProvider {
    fn fetch(&self, _min_rows: usize) -> Result<DataFrame> {
        let n = 40usize;
        let speed: Vec<f64> = (0..n).map(|i| 65.0 + (i % 30) as f64).collect();
        let post: Vec<f64> = (0..n).map(|i| (i % 12 + 1) as f64).collect();
        let rank: Vec<f64> = (0..n).map(|i| (i % 9 + 1) as f64).collect();
        Ok(df!(
            "speed_rating" => speed,
            "post_position" => post,
            "finish_rank" => rank
        )?)
    }
}

/// Sleeps long enough for concurrency to be observable, then succeeds.
struct SlowTrainer {
    ndcg: f64,
    delay: Duration,
}

impl ModelTrainer for SlowTrainer {
    fn train(&self, spec: &TrainingSpec, _features: &FeatureSet) -> Result<TrainingResult> {
        std::thread::sleep(self.delay);
        Ok(TrainingResult {
            model_id: spec.model_id.clone(),
            ndcg_at_3: self.ndcg,
            ndcg_at_5: self.ndcg,
            win_accuracy: 32.0,
            place_accuracy: 57.0,
            show_accuracy: 73.0,
            training_time_ms: self.delay.as_millis() as u64,
            hyperparameters: HashMap::new(),
            success: true,
            error: None,
        })
    }
}

fn build_scheduler(trainer_delay: Duration, config: SchedulerConfig) -> RetrainingScheduler {
    let registry = Arc::new(RwLock::new(MetricsRegistry::new()));
    let monitor = Arc::new(RwLock::new(DriftMonitor::new(DriftConfig::default())));
    let orchestrator = Arc::new(TrainingOrchestrator::new(
        OrchestratorConfig::default()
            .with_min_data_points(10)
            .with_strategy(TrainingStrategy::Single),
        Arc::clone(&registry),
        Arc::new(RaceHistoryProvider),
        Arc::new(ColumnarFeatureBuilder::new("finish_rank")),
        Arc::new(SlowTrainer {
            ndcg: 0.90,
            delay: trainer_delay,
        }),
    ));
    RetrainingScheduler::new(config, registry, monitor, orchestrator)
}

/// Register a model and make it eligible: a critical alert plus no cooldown.
async fn make_eligible(scheduler: &RetrainingScheduler, model_id: &str) {
    let registry = scheduler.registry();
    let mut registry = registry.write().await;
    registry.register_model(
        ModelMetrics::new(model_id, model_id, "v1")
            .with_ndcg(0.80, 0.82)
            .with_accuracies(30.0, 55.0, 70.0),
    );
    registry.record_drift_alert(DriftAlert::new(
        model_id,
        DriftType::Performance,
        Severity::High,
        0.08,
        0.02,
        "ndcg degraded past the retraining boundary",
        Utc::now(),
        true,
    ));
}

async fn wait_until<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_and_terminality() {
    let config = SchedulerConfig::default()
        .with_max_concurrent_jobs(2)
        .with_poll_interval(Duration::from_millis(10))
        .with_completed_retention(chrono::Duration::zero());
    let scheduler = build_scheduler(Duration::from_millis(250), config);

    for model in ["m1", "m2", "m3"] {
        make_eligible(&scheduler, model).await;
    }

    let mut jobs = Vec::new();
    for model in ["m1", "m2", "m3"] {
        jobs.push(scheduler.queue_retraining_job(model, TriggerReason::DriftDetected).await);
    }

    scheduler.start();

    // Sample the queue while jobs are in flight: the cap must hold
    let mut max_active = 0usize;
    for _ in 0..30 {
        let status = scheduler.queue_status().await;
        max_active = max_active.max(status.active);
        assert!(status.active <= 2, "active {} exceeded cap", status.active);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(max_active >= 1, "jobs never started");

    // Every job reaches a terminal state
    let all_terminal = wait_until(Duration::from_secs(5), || {
        let scheduler = scheduler.clone();
        let ids: Vec<String> = jobs.iter().map(|j| j.job_id.clone()).collect();
        async move {
            for id in &ids {
                match scheduler.job_status(id).await {
                    Some(job) if job.status.is_terminal() => {}
                    _ => return false,
                }
            }
            true
        }
    })
    .await;
    assert!(all_terminal, "jobs stuck without a terminal state");

    for job in &jobs {
        let finished = scheduler.job_status(&job.job_id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert!(finished.new_model_version.is_some());
        assert!(finished.ndcg_improvement.unwrap() > 0.01);
        assert!(finished.end_time.is_some());
    }

    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ineligible_job_fails_fast_without_training() {
    let config = SchedulerConfig::default()
        .with_max_concurrent_jobs(2)
        .with_poll_interval(Duration::from_millis(10))
        .with_completed_retention(chrono::Duration::zero());
    // A long trainer delay: if the gate failed we would notice the stall
    let scheduler = build_scheduler(Duration::from_secs(30), config);

    // No alerts recorded: the drift gate must refuse the job
    let job = scheduler
        .queue_retraining_job("quiet_model", TriggerReason::Manual)
        .await;
    scheduler.start();

    let terminal = wait_until(Duration::from_secs(2), || {
        let scheduler = scheduler.clone();
        let id = job.job_id.clone();
        async move {
            matches!(
                scheduler.job_status(&id).await,
                Some(j) if j.status.is_terminal()
            )
        }
    })
    .await;
    assert!(terminal, "gated job never finished");

    let finished = scheduler.job_status(&job.job_id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished.error.unwrap().contains("cooldown or no critical drift"));

    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cooldown_skips_second_run() {
    let config = SchedulerConfig::default()
        .with_max_concurrent_jobs(1)
        .with_poll_interval(Duration::from_millis(10))
        .with_completed_retention(chrono::Duration::zero());
    let scheduler = build_scheduler(Duration::from_millis(20), config);

    make_eligible(&scheduler, "m1").await;
    let first = scheduler
        .queue_retraining_job("m1", TriggerReason::DriftDetected)
        .await;
    scheduler.start();

    let done = wait_until(Duration::from_secs(3), || {
        let scheduler = scheduler.clone();
        let id = first.job_id.clone();
        async move {
            matches!(
                scheduler.job_status(&id).await,
                Some(j) if j.status == JobStatus::Completed
            )
        }
    })
    .await;
    assert!(done, "first job did not complete");

    // Immediately queue again: the cooldown makes this a fast no-op failure
    let second = scheduler
        .queue_retraining_job("m1", TriggerReason::DriftDetected)
        .await;
    let second_done = wait_until(Duration::from_secs(3), || {
        let scheduler = scheduler.clone();
        let id = second.job_id.clone();
        async move {
            matches!(
                scheduler.job_status(&id).await,
                Some(j) if j.status.is_terminal()
            )
        }
    })
    .await;
    assert!(second_done);

    let finished = scheduler.job_status(&second.job_id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished.error.unwrap().contains("cooldown"));

    scheduler.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completed_job_updates_model_and_cooldown() {
    let config = SchedulerConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_completed_retention(chrono::Duration::zero());
    let scheduler = build_scheduler(Duration::from_millis(20), config);

    make_eligible(&scheduler, "m1").await;
    let job = scheduler
        .queue_retraining_job("m1", TriggerReason::PerformanceDegradation)
        .await;
    scheduler.start();

    let done = wait_until(Duration::from_secs(3), || {
        let scheduler = scheduler.clone();
        let id = job.job_id.clone();
        async move {
            matches!(
                scheduler.job_status(&id).await,
                Some(j) if j.status == JobStatus::Completed
            )
        }
    })
    .await;
    assert!(done);

    // The tracked model gained the improvement and carries the new version
    let finished = scheduler.job_status(&job.job_id).await.unwrap();
    let registry = scheduler.registry();
    let registry = registry.read().await;
    let metrics = registry.metrics("m1").unwrap();
    assert!(metrics.ndcg_at_3 > 0.80);
    assert_eq!(Some(metrics.version.clone()), finished.new_model_version);

    let monitor = scheduler.monitor();
    assert!(monitor.read().await.last_retrained("m1").is_some());

    scheduler.stop();
}

#[tokio::test]
async fn test_drift_summary_and_needs_surface() {
    let scheduler = build_scheduler(
        Duration::from_millis(10),
        SchedulerConfig::default().with_poll_interval(Duration::from_millis(10)),
    );

    make_eligible(&scheduler, "m1").await;
    {
        let registry = scheduler.registry();
        let mut registry = registry.write().await;
        registry.record_drift_alert(DriftAlert::new(
            "m2",
            DriftType::Prediction,
            Severity::Medium,
            0.11,
            0.10,
            "win accuracy slipping",
            Utc::now(),
            false,
        ));
    }

    let summary = scheduler.drift_summary().await;
    assert_eq!(summary.critical_alert_count, 1);
    assert!(summary.models_with_drift.contains(&"m1".to_string()));
    assert!(summary.models_with_drift.contains(&"m2".to_string()));
    assert_eq!(summary.recommended_actions.len(), 1);

    let needs = scheduler.check_retraining_needs().await;
    assert_eq!(needs.models_needing_retrain, vec!["m1".to_string()]);
    assert!(!needs.reasons.is_empty());

    // A cooled-down model drops out of the needs list
    scheduler.monitor().write().await.mark_retrained("m1", Utc::now());
    let needs = scheduler.check_retraining_needs().await;
    assert!(needs.models_needing_retrain.is_empty());
}

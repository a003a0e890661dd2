//! Training orchestration pipeline

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock as SyncRwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task;
use tracing::{info, warn};

use crate::error::{Result, StewardError};
use crate::metrics::{MetricsRegistry, ModelMetrics};

use super::{
    DatasetProvider, FeatureBuilder, FeatureSet, ModelTrainer, TrainingResult, TrainingSpec,
    TriggerReason,
};

/// Fallback reference NDCG@3 when no live baseline is resolvable
const DEFAULT_BASELINE_NDCG: f64 = 0.82;

/// Retained pipeline executions; oldest entries are dropped past this bound
const MAX_EXECUTION_HISTORY: usize = 50;

/// Which candidate families a pipeline run fits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStrategy {
    /// Only the single-model candidate
    Single,
    /// Only the ensemble candidate
    Ensemble,
    /// Both candidates, best NDCG@3 wins
    Both,
}

/// Where the improvement comparison gets its reference NDCG@3.
///
/// `LiveModel` reads the registry at pipeline time and falls back to the
/// fixed default when the model is unknown or has no positive score.
#[derive(Debug, Clone)]
pub enum BaselineSource {
    /// A fixed reference score
    Fixed(f64),
    /// The named model's current registry score
    LiveModel(String),
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Candidate families to fit per run
    pub strategy: TrainingStrategy,
    /// Minimum dataset rows required to start a run
    pub min_data_points: usize,
    /// Relative improvement that auto-registers the winner
    pub auto_promote_threshold: f64,
    /// Reference for the improvement computation
    pub baseline: BaselineSource,
    /// Single-model candidate spec
    pub single_candidate: TrainingSpec,
    /// Ensemble candidate spec
    pub ensemble_candidate: TrainingSpec,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let single_hyper: HashMap<String, f64> = [
            ("learning_rate".to_string(), 0.1),
            ("max_depth".to_string(), 6.0),
            ("n_estimators".to_string(), 200.0),
        ]
        .into_iter()
        .collect();

        let ensemble_hyper: HashMap<String, f64> = [
            ("learning_rate".to_string(), 0.05),
            ("max_depth".to_string(), 4.0),
            ("n_estimators".to_string(), 400.0),
            ("n_members".to_string(), 5.0),
        ]
        .into_iter()
        .collect();

        Self {
            strategy: TrainingStrategy::Both,
            min_data_points: std::env::var("STEWARD_MIN_DATA_POINTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            auto_promote_threshold: 0.01,
            baseline: BaselineSource::Fixed(DEFAULT_BASELINE_NDCG),
            single_candidate: TrainingSpec::new("gradient_ranker", single_hyper),
            ensemble_candidate: TrainingSpec::new("ensemble_ranker", ensemble_hyper),
        }
    }
}

impl OrchestratorConfig {
    /// Set the candidate strategy
    pub fn with_strategy(mut self, strategy: TrainingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the minimum dataset size
    pub fn with_min_data_points(mut self, min: usize) -> Self {
        self.min_data_points = min.max(1);
        self
    }

    /// Set the auto-promotion improvement bar
    pub fn with_auto_promote_threshold(mut self, threshold: f64) -> Self {
        self.auto_promote_threshold = threshold;
        self
    }

    /// Set the improvement baseline source
    pub fn with_baseline(mut self, baseline: BaselineSource) -> Self {
        self.baseline = baseline;
        self
    }

    fn candidate_specs(&self) -> Vec<TrainingSpec> {
        match self.strategy {
            TrainingStrategy::Single => vec![self.single_candidate.clone()],
            TrainingStrategy::Ensemble => vec![self.ensemble_candidate.clone()],
            TrainingStrategy::Both => vec![
                self.single_candidate.clone(),
                self.ensemble_candidate.clone(),
            ],
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Whether a best candidate was selected
    pub success: bool,
    /// Every candidate result, including failed fits
    pub trained_models: Vec<TrainingResult>,
    /// Winning candidate, if any
    pub best_model: Option<String>,
    /// Relative NDCG@3 improvement of the winner over the baseline
    pub improvement: f64,
    /// Wall-clock pipeline duration in milliseconds
    pub execution_time_ms: u64,
    /// Failure description when `success` is false
    pub error: Option<String>,
}

/// One recorded pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Why the run happened
    pub trigger: TriggerReason,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Whether a best candidate was selected
    pub success: bool,
    /// Winning candidate, if any
    pub best_model: Option<String>,
    /// Winner's relative improvement over the baseline
    pub improvement: f64,
    /// Wall-clock duration in milliseconds
    pub execution_time_ms: u64,
    /// Per-candidate results
    pub trained_models: Vec<TrainingResult>,
    /// Failure description for failed runs
    pub error: Option<String>,
}

/// Aggregate statistics over recorded runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub avg_execution_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Runs candidates through fetch -> prepare -> fit -> select -> promote.
///
/// Stages run sequentially with hard failure except candidate fitting,
/// where individual trainer errors are recorded and the pipeline moves on.
/// The dataset, feature, and trainer capabilities are blocking and run on
/// the blocking pool so in-flight pipelines never stall the scheduler.
pub struct TrainingOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<RwLock<MetricsRegistry>>,
    dataset: Arc<dyn DatasetProvider>,
    features: Arc<dyn FeatureBuilder>,
    trainer: Arc<dyn ModelTrainer>,
    history: SyncRwLock<VecDeque<ExecutionRecord>>,
}

impl TrainingOrchestrator {
    /// Create an orchestrator wired to its capabilities
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<RwLock<MetricsRegistry>>,
        dataset: Arc<dyn DatasetProvider>,
        features: Arc<dyn FeatureBuilder>,
        trainer: Arc<dyn ModelTrainer>,
    ) -> Self {
        Self {
            config,
            registry,
            dataset,
            features,
            trainer,
            history: SyncRwLock::new(VecDeque::new()),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the full evaluation pipeline.
    ///
    /// Stage failures (insufficient data, feature preparation errors, all
    /// candidates failing) are returned as errors after being recorded as
    /// failed executions; callers treat them as a failed run, not a crash.
    pub async fn execute_training_pipeline(
        &self,
        trigger: TriggerReason,
    ) -> Result<OrchestrationResult> {
        let started = Instant::now();
        let started_at = Utc::now();
        info!(%trigger, strategy = ?self.config.strategy, "Starting training pipeline");

        match self.run_pipeline(started).await {
            Ok(result) => {
                self.record_execution(ExecutionRecord {
                    trigger,
                    started_at,
                    success: true,
                    best_model: result.best_model.clone(),
                    improvement: result.improvement,
                    execution_time_ms: result.execution_time_ms,
                    trained_models: result.trained_models.clone(),
                    error: None,
                });
                info!(
                    best_model = result.best_model.as_deref().unwrap_or("none"),
                    improvement = result.improvement,
                    elapsed_ms = result.execution_time_ms,
                    "Training pipeline finished"
                );
                Ok(result)
            }
            Err(e) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(%trigger, error = %e, elapsed_ms, "Training pipeline failed");
                self.record_execution(ExecutionRecord {
                    trigger,
                    started_at,
                    success: false,
                    best_model: None,
                    improvement: 0.0,
                    execution_time_ms: elapsed_ms,
                    trained_models: Vec::new(),
                    error: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, started: Instant) -> Result<OrchestrationResult> {
        // Stage 1: fetch the training dataset
        let min_rows = self.config.min_data_points;
        let provider = Arc::clone(&self.dataset);
        let df = task::spawn_blocking(move || provider.fetch(min_rows))
            .await
            .map_err(|e| StewardError::TrainingError(format!("dataset task panicked: {e}")))??;

        if df.height() < min_rows {
            return Err(StewardError::InsufficientData {
                actual: df.height(),
                required: min_rows,
            });
        }

        // Stage 2: feature preparation
        let builder = Arc::clone(&self.features);
        let features = task::spawn_blocking(move || builder.prepare(&df))
            .await
            .map_err(|e| StewardError::TrainingError(format!("feature task panicked: {e}")))??;
        let features = Arc::new(features);

        // Stage 3: fit every enabled candidate; failures are recorded, not fatal
        let mut trained_models = Vec::new();
        for spec in self.config.candidate_specs() {
            trained_models.push(self.fit_candidate(spec, Arc::clone(&features)).await?);
        }

        // Stage 4: pick the best successful fit (ties keep the earlier one)
        let best = trained_models
            .iter()
            .filter(|r| r.success)
            .fold(None::<&TrainingResult>, |best, r| match best {
                Some(b) if b.ndcg_at_3 >= r.ndcg_at_3 => Some(b),
                _ => Some(r),
            })
            .cloned();

        let Some(best) = best else {
            return Err(StewardError::TrainingError(
                "no candidate trained successfully".to_string(),
            ));
        };

        // Stage 5: improvement over the configured baseline
        let improvement = {
            let registry = self.registry.read().await;
            let baseline = self.resolve_baseline(&registry);
            if baseline <= 0.0 {
                return Err(StewardError::ConfigError(
                    "baseline NDCG must be positive".to_string(),
                ));
            }
            (best.ndcg_at_3 - baseline) / baseline
        };

        // Stage 6: auto-promote a clear winner
        if improvement >= self.config.auto_promote_threshold {
            self.register_winner(&best).await;
        }

        Ok(OrchestrationResult {
            success: true,
            best_model: Some(best.model_id.clone()),
            improvement,
            execution_time_ms: started.elapsed().as_millis() as u64,
            trained_models,
            error: None,
        })
    }

    async fn fit_candidate(
        &self,
        spec: TrainingSpec,
        features: Arc<FeatureSet>,
    ) -> Result<TrainingResult> {
        let trainer = Arc::clone(&self.trainer);
        let task_spec = spec.clone();
        let outcome = task::spawn_blocking(move || trainer.train(&task_spec, &features))
            .await
            .map_err(|e| StewardError::TrainingError(format!("trainer task panicked: {e}")))?;

        Ok(match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(candidate = %spec.model_id, error = %e, "Candidate training failed");
                TrainingResult::failed(&spec, e.to_string())
            }
        })
    }

    fn resolve_baseline(&self, registry: &MetricsRegistry) -> f64 {
        match &self.config.baseline {
            BaselineSource::Fixed(value) => *value,
            BaselineSource::LiveModel(model_id) => registry
                .metrics(model_id)
                .map(|m| m.ndcg_at_3)
                .filter(|v| *v > 0.0)
                .unwrap_or(DEFAULT_BASELINE_NDCG),
        }
    }

    async fn register_winner(&self, best: &TrainingResult) {
        let version = format!("v{}", Utc::now().format("%Y%m%d%H%M%S"));
        let metrics = ModelMetrics::new(best.model_id.clone(), best.model_id.clone(), version.clone())
            .with_ndcg(best.ndcg_at_3, best.ndcg_at_5)
            .with_accuracies(best.win_accuracy, best.place_accuracy, best.show_accuracy);

        let mut registry = self.registry.write().await;
        registry.register_model(metrics);
        registry.rebalance_weights_by_performance();
        info!(model_id = %best.model_id, version = %version, "Auto-promoted training winner");
    }

    fn record_execution(&self, record: ExecutionRecord) {
        let mut history = self.history.write();
        history.push_back(record);
        while history.len() > MAX_EXECUTION_HISTORY {
            history.pop_front();
        }
    }

    /// The most recent recorded run
    pub fn latest_execution(&self) -> Option<ExecutionRecord> {
        self.history.read().back().cloned()
    }

    /// Aggregate statistics over all recorded runs
    pub fn statistics(&self) -> OrchestratorStats {
        let history = self.history.read();
        let total = history.len();
        let successful = history.iter().filter(|r| r.success).count();
        let avg = if total > 0 {
            history.iter().map(|r| r.execution_time_ms as f64).sum::<f64>() / total as f64
        } else {
            0.0
        };
        OrchestratorStats {
            total_runs: total,
            successful_runs: successful,
            failed_runs: total - successful,
            avg_execution_ms: avg,
            last_run_at: history.back().map(|r| r.started_at),
        }
    }
}

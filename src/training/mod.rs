//! Training pipeline
//!
//! External capability traits for dataset access, feature preparation, and
//! model fitting, plus the orchestrator that runs candidates through an
//! evaluation pipeline and promotes the winner.

mod data;
mod orchestrator;
mod trainer;

pub use data::{ColumnarFeatureBuilder, DatasetProvider, FeatureBuilder, FeatureSet};
pub use orchestrator::{
    BaselineSource, ExecutionRecord, OrchestrationResult, OrchestratorConfig, OrchestratorStats,
    TrainingOrchestrator, TrainingStrategy,
};
pub use trainer::{ModelTrainer, TrainingResult, TrainingSpec};

use serde::{Deserialize, Serialize};

/// Why a training run was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Statistical drift against the baseline
    DriftDetected,
    /// Sustained metric degradation
    PerformanceDegradation,
    /// Routine scheduled refresh
    Scheduled,
    /// Operator request
    Manual,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TriggerReason::DriftDetected => "drift_detected",
            TriggerReason::PerformanceDegradation => "performance_degradation",
            TriggerReason::Scheduled => "scheduled",
            TriggerReason::Manual => "manual",
        };
        f.write_str(label)
    }
}

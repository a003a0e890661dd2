//! Opaque trainer capability

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::FeatureSet;

/// One candidate to fit: a model family plus its hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSpec {
    /// Identifier the trained model will be tracked under
    pub model_id: String,
    /// Opaque hyperparameters forwarded to the trainer
    pub hyperparameters: HashMap<String, f64>,
}

impl TrainingSpec {
    /// Create a spec with the given hyperparameters
    pub fn new(model_id: impl Into<String>, hyperparameters: HashMap<String, f64>) -> Self {
        Self {
            model_id: model_id.into(),
            hyperparameters,
        }
    }
}

/// Outcome of fitting one candidate.
///
/// Failed fits are regular results with `success = false`; the pipeline
/// records them alongside successful candidates instead of aborting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Candidate this result belongs to
    pub model_id: String,
    /// Ranking quality at cutoff 3
    pub ndcg_at_3: f64,
    /// Ranking quality at cutoff 5
    pub ndcg_at_5: f64,
    /// Win-bet accuracy, percent
    pub win_accuracy: f64,
    /// Place-bet accuracy, percent
    pub place_accuracy: f64,
    /// Show-bet accuracy, percent
    pub show_accuracy: f64,
    /// Wall-clock fit duration in milliseconds
    pub training_time_ms: u64,
    /// Hyperparameters the fit actually used
    pub hyperparameters: HashMap<String, f64>,
    /// Whether the fit produced a usable model
    pub success: bool,
    /// Failure description when `success` is false
    pub error: Option<String>,
}

impl TrainingResult {
    /// A failed fit carrying only the error description
    pub fn failed(spec: &TrainingSpec, error: impl Into<String>) -> Self {
        Self {
            model_id: spec.model_id.clone(),
            ndcg_at_3: 0.0,
            ndcg_at_5: 0.0,
            win_accuracy: 0.0,
            place_accuracy: 0.0,
            show_accuracy: 0.0,
            training_time_ms: 0,
            hyperparameters: spec.hyperparameters.clone(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The numeric model-fitting routine, treated as an opaque capability.
///
/// Implementations run out-of-process training, call into a native
/// library, or fit in-process; the orchestrator only sees the scores.
/// Called from a blocking task, so implementations may block freely.
pub trait ModelTrainer: Send + Sync {
    /// Fit one candidate against the prepared features
    fn train(&self, spec: &TrainingSpec, features: &FeatureSet) -> Result<TrainingResult>;
}

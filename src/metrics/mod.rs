//! Model performance bookkeeping
//!
//! In-memory registry of per-model ranking metrics, ensemble weights,
//! drift alerts, and A/B test records, with derived summaries used by the
//! retraining scheduler.

mod ab_test;
mod registry;

pub use ab_test::{AbTest, AbTestStatus, AbTestUpdate};
pub use registry::MetricsRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Performance metrics for one tracked model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Stable model identifier
    pub model_id: String,
    /// Human-readable name
    pub name: String,
    /// Deployed version string
    pub version: String,
    /// Ranking quality at cutoff 3, in [0, 1]
    pub ndcg_at_3: f64,
    /// Ranking quality at cutoff 5, in [0, 1]
    pub ndcg_at_5: f64,
    /// Win-bet accuracy, percent
    pub win_accuracy: f64,
    /// Place-bet accuracy, percent
    pub place_accuracy: f64,
    /// Show-bet accuracy, percent
    pub show_accuracy: f64,
    /// Total predictions served
    pub total_predictions: u64,
    /// Correct predictions (never exceeds total)
    pub correct_predictions: u64,
    /// Mean confidence of served predictions
    pub average_confidence: f64,
    /// Realized return on investment
    pub roi: f64,
    /// Last mutation timestamp
    pub last_updated: DateTime<Utc>,
}

impl ModelMetrics {
    /// Create metrics for a freshly registered model with zeroed counters
    pub fn new(model_id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            name: name.into(),
            version: version.into(),
            ndcg_at_3: 0.0,
            ndcg_at_5: 0.0,
            win_accuracy: 0.0,
            place_accuracy: 0.0,
            show_accuracy: 0.0,
            total_predictions: 0,
            correct_predictions: 0,
            average_confidence: 0.0,
            roi: 0.0,
            last_updated: Utc::now(),
        }
    }

    /// Set the ranking scores
    pub fn with_ndcg(mut self, ndcg_at_3: f64, ndcg_at_5: f64) -> Self {
        self.ndcg_at_3 = ndcg_at_3.clamp(0.0, 1.0);
        self.ndcg_at_5 = ndcg_at_5.clamp(0.0, 1.0);
        self
    }

    /// Set the outcome accuracies (percent)
    pub fn with_accuracies(mut self, win: f64, place: f64, show: f64) -> Self {
        self.win_accuracy = win;
        self.place_accuracy = place;
        self.show_accuracy = show;
        self
    }
}

/// Partial update applied to an existing [`ModelMetrics`] record.
///
/// Only the populated fields are written; `last_updated` is refreshed on
/// every successful apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub version: Option<String>,
    pub ndcg_at_3: Option<f64>,
    pub ndcg_at_5: Option<f64>,
    pub win_accuracy: Option<f64>,
    pub place_accuracy: Option<f64>,
    pub show_accuracy: Option<f64>,
    pub total_predictions: Option<u64>,
    pub correct_predictions: Option<u64>,
    pub average_confidence: Option<f64>,
    pub roi: Option<f64>,
}

/// One model's share of the live ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeight {
    /// Model this weight applies to
    pub model_id: String,
    /// Contribution in [0, 1]; all stored weights sum to 1
    pub weight: f64,
    /// Whether the weight was computed from performance or set manually
    pub performance_based: bool,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// Aggregate view over all registered models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Model with the highest NDCG@3
    pub best_model: String,
    /// Model with the lowest NDCG@3
    pub worst_model: String,
    /// Mean NDCG@3 across models
    pub mean_ndcg_at_3: f64,
    /// Population variance of NDCG@3
    pub ndcg_variance: f64,
    /// Up to three best (model_id, ndcg_at_3) pairs, best first
    pub top_models: Vec<(String, f64)>,
}

/// Retraining advice derived from the active critical alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainingRecommendation {
    /// Whether any model currently warrants retraining
    pub should_retrain: bool,
    /// Highest severity among the driving alerts
    pub priority: crate::drift::Severity,
    /// Models named by the driving alerts, deduplicated
    pub affected_models: Vec<String>,
}

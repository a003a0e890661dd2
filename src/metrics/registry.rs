//! In-memory metrics registry

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::drift::{DriftAlert, Severity};
use crate::error::{Result, StewardError};

use super::{
    AbTest, AbTestUpdate, MetricsUpdate, ModelMetrics, ModelWeight, PerformanceSummary,
    RetrainingRecommendation,
};

/// Retained drift alerts; oldest entries are dropped past this bound.
const MAX_ALERTS: usize = 1_000;

/// Weight-sum tolerance for the ensemble invariant.
const WEIGHT_EPSILON: f64 = 1e-6;

/// Registry of model metrics, ensemble weights, drift alerts, and A/B tests.
///
/// All operations are synchronous and touch nothing but the registry's own
/// state; hosts that share a registry across tasks wrap it in a single
/// writer lock (`Arc<tokio::sync::RwLock<_>>` in this crate's scheduler).
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    models: HashMap<String, ModelMetrics>,
    weights: HashMap<String, ModelWeight>,
    alerts: Vec<DriftAlert>,
    ab_tests: HashMap<String, AbTest>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------
    // Model metrics
    // -----------------------------------------------------------------

    /// Register a model, replacing any previous record under the same id
    pub fn register_model(&mut self, metrics: ModelMetrics) {
        info!(
            model_id = %metrics.model_id,
            version = %metrics.version,
            ndcg_at_3 = metrics.ndcg_at_3,
            "Registered model"
        );
        self.models.insert(metrics.model_id.clone(), metrics);
    }

    /// Apply a partial update to a registered model.
    ///
    /// Unknown ids and counter-invariant violations are errors the caller
    /// is expected to log and absorb, not fatal conditions.
    pub fn update_metrics(&mut self, model_id: &str, update: MetricsUpdate) -> Result<()> {
        let metrics = self
            .models
            .get_mut(model_id)
            .ok_or_else(|| StewardError::UnknownModel(model_id.to_string()))?;

        let total = update.total_predictions.unwrap_or(metrics.total_predictions);
        let correct = update
            .correct_predictions
            .unwrap_or(metrics.correct_predictions);
        if correct > total {
            return Err(StewardError::ValidationError(format!(
                "correct_predictions ({correct}) exceeds total_predictions ({total}) for {model_id}"
            )));
        }

        if let Some(version) = update.version {
            metrics.version = version;
        }
        if let Some(v) = update.ndcg_at_3 {
            metrics.ndcg_at_3 = v.clamp(0.0, 1.0);
        }
        if let Some(v) = update.ndcg_at_5 {
            metrics.ndcg_at_5 = v.clamp(0.0, 1.0);
        }
        if let Some(v) = update.win_accuracy {
            metrics.win_accuracy = v;
        }
        if let Some(v) = update.place_accuracy {
            metrics.place_accuracy = v;
        }
        if let Some(v) = update.show_accuracy {
            metrics.show_accuracy = v;
        }
        metrics.total_predictions = total;
        metrics.correct_predictions = correct;
        if let Some(v) = update.average_confidence {
            metrics.average_confidence = v;
        }
        if let Some(v) = update.roi {
            metrics.roi = v;
        }
        metrics.last_updated = Utc::now();

        Ok(())
    }

    /// Look up one model's metrics
    pub fn metrics(&self, model_id: &str) -> Option<&ModelMetrics> {
        self.models.get(model_id)
    }

    /// All registered models, unordered
    pub fn all_models(&self) -> impl Iterator<Item = &ModelMetrics> {
        self.models.values()
    }

    /// Number of registered models
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// All models sorted by NDCG@3, best first
    pub fn models_by_ndcg(&self) -> Vec<&ModelMetrics> {
        let mut models: Vec<&ModelMetrics> = self.models.values().collect();
        models.sort_by(|a, b| {
            b.ndcg_at_3
                .partial_cmp(&a.ndcg_at_3)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        models
    }

    // -----------------------------------------------------------------
    // Ensemble weights
    // -----------------------------------------------------------------

    /// Set one model's ensemble weight, renormalizing the others so the
    /// stored weights keep summing to 1.
    ///
    /// A sole participant is pinned to weight 1.0 regardless of the
    /// requested value.
    pub fn set_weight(&mut self, model_id: &str, weight: f64, performance_based: bool) {
        let weight = weight.clamp(0.0, 1.0);
        self.weights.remove(model_id);

        // With no other mass to renormalize, the sum invariant forces 1.0.
        let others_sum: f64 = self.weights.values().map(|w| w.weight).sum();
        let weight = if others_sum > 0.0 { weight } else { 1.0 };

        if others_sum > 0.0 {
            let scale = (1.0 - weight) / others_sum;
            for other in self.weights.values_mut() {
                other.weight *= scale;
            }
        }

        self.weights.insert(
            model_id.to_string(),
            ModelWeight {
                model_id: model_id.to_string(),
                weight,
                performance_based,
                updated_at: Utc::now(),
            },
        );
        debug!(model_id, weight, performance_based, "Set ensemble weight");
    }

    /// Recompute every model's weight as its NDCG@3 share of the total.
    ///
    /// No-op when the scores sum to zero (nothing meaningful to split).
    pub fn rebalance_weights_by_performance(&mut self) {
        let total: f64 = self.models.values().map(|m| m.ndcg_at_3).sum();
        if total <= 0.0 {
            debug!("Skipping weight rebalance: no positive NDCG mass");
            return;
        }

        let now = Utc::now();
        for metrics in self.models.values() {
            self.weights.insert(
                metrics.model_id.clone(),
                ModelWeight {
                    model_id: metrics.model_id.clone(),
                    weight: metrics.ndcg_at_3 / total,
                    performance_based: true,
                    updated_at: now,
                },
            );
        }
        info!(models = self.models.len(), "Rebalanced ensemble weights by performance");
    }

    /// Current ensemble weights, unordered
    pub fn weights(&self) -> impl Iterator<Item = &ModelWeight> {
        self.weights.values()
    }

    /// One model's current ensemble weight
    pub fn weight(&self, model_id: &str) -> Option<&ModelWeight> {
        self.weights.get(model_id)
    }

    /// Sum of all stored weights; 1 ± 1e-6 whenever any weight exists
    pub fn total_weight(&self) -> f64 {
        self.weights.values().map(|w| w.weight).sum()
    }

    /// Whether the weight-sum invariant currently holds
    pub fn weights_consistent(&self) -> bool {
        self.weights.is_empty() || (self.total_weight() - 1.0).abs() < WEIGHT_EPSILON
    }

    // -----------------------------------------------------------------
    // Drift alerts
    // -----------------------------------------------------------------

    /// Append a drift alert to the bounded log
    pub fn record_drift_alert(&mut self, alert: DriftAlert) {
        if alert.severity >= Severity::High {
            warn!(
                model_id = %alert.model_id,
                alert_type = ?alert.alert_type,
                severity = ?alert.severity,
                magnitude = alert.drift_magnitude,
                "{}", alert.message
            );
        } else {
            debug!(
                model_id = %alert.model_id,
                alert_type = ?alert.alert_type,
                "{}", alert.message
            );
        }

        self.alerts.push(alert);
        if self.alerts.len() > MAX_ALERTS {
            let excess = self.alerts.len() - MAX_ALERTS;
            self.alerts.drain(..excess);
        }
    }

    /// Alerts raised within the last 24 hours of `now`
    pub fn active_alerts(&self, now: DateTime<Utc>) -> Vec<&DriftAlert> {
        self.alerts.iter().filter(|a| a.is_active(now)).collect()
    }

    /// Active alerts that on their own justify retraining
    pub fn critical_alerts(&self, now: DateTime<Utc>) -> Vec<&DriftAlert> {
        self.alerts
            .iter()
            .filter(|a| a.is_active(now) && a.requires_retraining)
            .collect()
    }

    /// Total alerts retained in the log
    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    // -----------------------------------------------------------------
    // A/B tests
    // -----------------------------------------------------------------

    /// Store a new A/B test record
    pub fn create_ab_test(&mut self, test: AbTest) {
        info!(
            test_id = %test.test_id,
            control = %test.control_model_id,
            treatment = %test.treatment_model_id,
            "Created A/B test"
        );
        self.ab_tests.insert(test.test_id.clone(), test);
    }

    /// Apply a partial update to an existing A/B test
    pub fn update_ab_test(&mut self, test_id: &str, update: AbTestUpdate) -> Result<()> {
        let test = self
            .ab_tests
            .get_mut(test_id)
            .ok_or_else(|| StewardError::ValidationError(format!("unknown A/B test: {test_id}")))?;

        if let Some(v) = update.control_ndcg {
            test.control_ndcg = v;
        }
        if let Some(v) = update.treatment_ndcg {
            test.treatment_ndcg = v;
        }
        if let Some(v) = update.improvement {
            test.improvement = v;
        }
        if let Some(v) = update.statistical_significance {
            test.statistical_significance = v;
        }
        if let Some(v) = update.is_significant {
            test.is_significant = v;
        }
        if let Some(v) = update.status {
            test.status = v;
        }
        Ok(())
    }

    /// Look up one A/B test
    pub fn ab_test(&self, test_id: &str) -> Option<&AbTest> {
        self.ab_tests.get(test_id)
    }

    /// All tests still splitting traffic
    pub fn active_ab_tests(&self) -> Vec<&AbTest> {
        self.ab_tests
            .values()
            .filter(|t| t.status == super::AbTestStatus::Active)
            .collect()
    }

    /// Record that a test's winner has been promoted
    pub fn mark_ab_test_promoted(&mut self, test_id: &str, now: DateTime<Utc>) -> Result<()> {
        let test = self
            .ab_tests
            .get_mut(test_id)
            .ok_or_else(|| StewardError::ValidationError(format!("unknown A/B test: {test_id}")))?;
        test.promoted_at = Some(now);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Derived summaries
    // -----------------------------------------------------------------

    /// Aggregate NDCG@3 statistics; `None` when no model is registered
    pub fn performance_summary(&self) -> Option<PerformanceSummary> {
        if self.models.is_empty() {
            return None;
        }

        let ranked = self.models_by_ndcg();
        let n = ranked.len() as f64;
        let mean = ranked.iter().map(|m| m.ndcg_at_3).sum::<f64>() / n;
        let variance = ranked
            .iter()
            .map(|m| (m.ndcg_at_3 - mean).powi(2))
            .sum::<f64>()
            / n;

        Some(PerformanceSummary {
            best_model: ranked.first().map(|m| m.model_id.clone())?,
            worst_model: ranked.last().map(|m| m.model_id.clone())?,
            mean_ndcg_at_3: mean,
            ndcg_variance: variance,
            top_models: ranked
                .iter()
                .take(3)
                .map(|m| (m.model_id.clone(), m.ndcg_at_3))
                .collect(),
        })
    }

    /// Retraining advice derived purely from the active critical alerts
    pub fn retraining_recommendation(&self, now: DateTime<Utc>) -> RetrainingRecommendation {
        let critical = self.critical_alerts(now);

        let priority = critical
            .iter()
            .map(|a| a.severity)
            .max()
            .unwrap_or(Severity::Low);

        let mut affected: Vec<String> = Vec::new();
        for alert in &critical {
            if !affected.iter().any(|m| m == &alert.model_id) {
                affected.push(alert.model_id.clone());
            }
        }

        RetrainingRecommendation {
            should_retrain: !critical.is_empty(),
            priority,
            affected_models: affected,
        }
    }
}

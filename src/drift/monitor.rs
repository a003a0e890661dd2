//! Baseline-relative drift monitoring

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::drift::{statistics, DriftAlert, DriftType, Severity};
use crate::metrics::{MetricsRegistry, ModelMetrics};

/// Thresholds and windows for drift detection
#[derive(Debug, Clone)]
pub struct DriftConfig {
    /// Relative NDCG@3 drop that raises a performance alert
    pub ndcg_drift_threshold: f64,
    /// NDCG drift above this escalates to Medium severity
    pub ndcg_medium_boundary: f64,
    /// NDCG drift above this escalates to High severity and requires retraining
    pub ndcg_high_boundary: f64,
    /// Relative win-accuracy drop that raises a prediction alert
    pub win_accuracy_threshold: f64,
    /// Relative place-accuracy drop that raises a prediction alert
    pub place_accuracy_threshold: f64,
    /// KS statistic that raises a concept-drift alert
    pub concept_drift_threshold: f64,
    /// KS statistic above this escalates to High severity
    pub concept_high_boundary: f64,
    /// KS statistic above this escalates to Critical severity
    pub concept_critical_boundary: f64,
    /// KS statistic above this requires retraining
    pub concept_retrain_boundary: f64,
    /// Rolling metrics history retained per model
    pub history_window: usize,
    /// Minimum time between retraining runs for one model
    pub cooldown: Duration,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            ndcg_drift_threshold: env_f64("STEWARD_NDCG_DRIFT_THRESHOLD", 0.02),
            ndcg_medium_boundary: 0.03,
            ndcg_high_boundary: 0.05,
            win_accuracy_threshold: 0.10,
            place_accuracy_threshold: 0.08,
            concept_drift_threshold: 0.15,
            concept_high_boundary: 0.20,
            concept_critical_boundary: 0.30,
            concept_retrain_boundary: 0.25,
            history_window: env_usize("STEWARD_HISTORY_WINDOW", 100),
            cooldown: Duration::seconds(env_i64("STEWARD_COOLDOWN_SECS", 3600)),
        }
    }
}

impl DriftConfig {
    /// Set the retraining cooldown
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the relative NDCG drift threshold
    pub fn with_ndcg_threshold(mut self, threshold: f64) -> Self {
        self.ndcg_drift_threshold = threshold.max(0.0);
        self
    }

    /// Set the concept-drift (KS) threshold
    pub fn with_concept_threshold(mut self, threshold: f64) -> Self {
        self.concept_drift_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the rolling history window
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window.max(2);
        self
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Direction of a model's recent NDCG trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
}

/// Least-squares trend over a model's rolling NDCG@3 history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    /// Classified direction at a ±0.001 slope threshold
    pub trend: Trend,
    /// OLS slope of NDCG@3 per observation
    pub slope: f64,
    /// Percent change from the first to the last sample
    pub change_percent: f64,
    /// Observations behind the fit
    pub n_samples: usize,
}

/// Watches live metrics against frozen baselines and decides when a model
/// has degraded enough to justify retraining.
///
/// Baselines are deliberate checkpoints: they are set explicitly and never
/// auto-updated, so drift is always measured against the same reference
/// until an operator (or a completed retraining run) moves it.
#[derive(Debug, Default)]
pub struct DriftMonitor {
    config: DriftConfig,
    baselines: HashMap<String, ModelMetrics>,
    history: HashMap<String, VecDeque<ModelMetrics>>,
    scores: HashMap<String, VecDeque<f64>>,
    last_retrained: HashMap<String, DateTime<Utc>>,
}

impl DriftMonitor {
    /// Create a monitor with the given thresholds
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            baselines: HashMap::new(),
            history: HashMap::new(),
            scores: HashMap::new(),
            last_retrained: HashMap::new(),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Freeze `metrics` as the drift-comparison reference for a model
    pub fn set_baseline(&mut self, model_id: &str, metrics: ModelMetrics) {
        info!(model_id, ndcg_at_3 = metrics.ndcg_at_3, "Set drift baseline");
        self.baselines.insert(model_id.to_string(), metrics);
    }

    /// The frozen baseline for a model, if one was set
    pub fn baseline(&self, model_id: &str) -> Option<&ModelMetrics> {
        self.baselines.get(model_id)
    }

    /// Compare `current` against the model's baseline, recording any alerts
    /// into `registry` and appending `current` to the rolling history.
    ///
    /// Returns the alerts raised by this comparison. Without a baseline no
    /// comparison happens (the sample is still retained for trend analysis).
    pub fn monitor_performance(
        &mut self,
        registry: &mut MetricsRegistry,
        model_id: &str,
        current: &ModelMetrics,
        now: DateTime<Utc>,
    ) -> Vec<DriftAlert> {
        let mut alerts = Vec::new();

        if let Some(baseline) = self.baselines.get(model_id) {
            if let Some(alert) = self.check_ndcg_drift(model_id, baseline, current, now) {
                alerts.push(alert);
            }
            if let Some(alert) = self.check_accuracy_drift(
                model_id,
                "win accuracy",
                baseline.win_accuracy,
                current.win_accuracy,
                self.config.win_accuracy_threshold,
                now,
            ) {
                alerts.push(alert);
            }
            if let Some(alert) = self.check_accuracy_drift(
                model_id,
                "place accuracy",
                baseline.place_accuracy,
                current.place_accuracy,
                self.config.place_accuracy_threshold,
                now,
            ) {
                alerts.push(alert);
            }
        } else {
            debug!(model_id, "No baseline set; skipping drift comparison");
        }

        self.push_history(model_id, current.clone());

        for alert in &alerts {
            registry.record_drift_alert(alert.clone());
        }
        alerts
    }

    fn check_ndcg_drift(
        &self,
        model_id: &str,
        baseline: &ModelMetrics,
        current: &ModelMetrics,
        now: DateTime<Utc>,
    ) -> Option<DriftAlert> {
        if baseline.ndcg_at_3 <= 0.0 {
            return None;
        }
        let drift = (baseline.ndcg_at_3 - current.ndcg_at_3) / baseline.ndcg_at_3;
        if drift <= self.config.ndcg_drift_threshold {
            return None;
        }

        let severity = if drift > self.config.ndcg_high_boundary {
            Severity::High
        } else if drift > self.config.ndcg_medium_boundary {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(DriftAlert::new(
            model_id,
            DriftType::Performance,
            severity,
            drift,
            self.config.ndcg_drift_threshold,
            format!(
                "NDCG@3 dropped {:.1}% against baseline ({:.4} -> {:.4})",
                drift * 100.0,
                baseline.ndcg_at_3,
                current.ndcg_at_3
            ),
            now,
            drift > self.config.ndcg_high_boundary,
        ))
    }

    fn check_accuracy_drift(
        &self,
        model_id: &str,
        metric_name: &str,
        baseline: f64,
        current: f64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Option<DriftAlert> {
        if baseline <= 0.0 {
            return None;
        }
        let drift = (baseline - current) / baseline;
        if drift <= threshold {
            return None;
        }

        // Well past the threshold the drop is no longer noise.
        let escalated = drift > threshold * 1.5;
        Some(DriftAlert::new(
            model_id,
            DriftType::Prediction,
            if escalated { Severity::High } else { Severity::Medium },
            drift,
            threshold,
            format!(
                "{metric_name} dropped {:.1}% against baseline ({:.2} -> {:.2})",
                drift * 100.0,
                baseline,
                current
            ),
            now,
            escalated,
        ))
    }

    /// Two-sample KS test between recent and baseline score distributions.
    ///
    /// Raises (and records) a concept-drift alert when the statistic clears
    /// the configured threshold. Empty samples never alert.
    pub fn detect_concept_drift(
        &mut self,
        registry: &mut MetricsRegistry,
        model_id: &str,
        recent: &Array1<f64>,
        baseline: &Array1<f64>,
        now: DateTime<Utc>,
    ) -> Option<DriftAlert> {
        let recent_vec: Vec<f64> = recent.iter().copied().collect();
        let baseline_vec: Vec<f64> = baseline.iter().copied().collect();
        let statistic = statistics::ks_statistic(&recent_vec, &baseline_vec);

        if statistic <= self.config.concept_drift_threshold {
            return None;
        }

        let severity = if statistic > self.config.concept_critical_boundary {
            Severity::Critical
        } else if statistic > self.config.concept_high_boundary {
            Severity::High
        } else {
            Severity::Medium
        };

        let alert = DriftAlert::new(
            model_id,
            DriftType::Concept,
            severity,
            statistic,
            self.config.concept_drift_threshold,
            format!(
                "KS statistic {:.4} between recent ({}) and baseline ({}) score samples",
                statistic,
                recent_vec.len(),
                baseline_vec.len()
            ),
            now,
            statistic > self.config.concept_retrain_boundary,
        );
        registry.record_drift_alert(alert.clone());
        Some(alert)
    }

    /// Append a prediction score to the model's rolling sample buffer.
    ///
    /// The buffer feeds [`Self::recent_scores`] so hosts can run
    /// [`Self::detect_concept_drift`] against live traffic.
    pub fn record_score(&mut self, model_id: &str, score: f64) {
        let window = self.config.history_window;
        let scores = self.scores.entry(model_id.to_string()).or_default();
        scores.push_back(score);
        while scores.len() > window {
            scores.pop_front();
        }
    }

    /// The model's buffered prediction scores, oldest first
    pub fn recent_scores(&self, model_id: &str) -> Array1<f64> {
        let values: Vec<f64> = self
            .scores
            .get(model_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        Array1::from_vec(values)
    }

    /// Whether a model should retrain right now: the registry's
    /// recommendation must name it AND its cooldown must have elapsed.
    ///
    /// This is the sole gate preventing retraining storms.
    pub fn should_retrain(
        &self,
        registry: &MetricsRegistry,
        model_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let recommendation = registry.retraining_recommendation(now);
        if !recommendation.should_retrain
            || !recommendation.affected_models.iter().any(|m| m == model_id)
        {
            return false;
        }
        self.cooldown_elapsed(model_id, now)
    }

    /// Whether the model's retraining cooldown has elapsed at `now`
    pub fn cooldown_elapsed(&self, model_id: &str, now: DateTime<Utc>) -> bool {
        match self.last_retrained.get(model_id) {
            Some(last) => now.signed_duration_since(*last) >= self.config.cooldown,
            None => true,
        }
    }

    /// Record that a model finished retraining, starting its cooldown
    pub fn mark_retrained(&mut self, model_id: &str, now: DateTime<Utc>) {
        debug!(model_id, "Marked retrained; cooldown started");
        self.last_retrained.insert(model_id.to_string(), now);
    }

    /// When a model last finished retraining, if ever
    pub fn last_retrained(&self, model_id: &str) -> Option<DateTime<Utc>> {
        self.last_retrained.get(model_id).copied()
    }

    /// OLS trend of NDCG@3 over the model's rolling history
    pub fn ndcg_trend(&self, model_id: &str) -> TrendReport {
        let series: Vec<f64> = self
            .history
            .get(model_id)
            .map(|h| h.iter().map(|m| m.ndcg_at_3).collect())
            .unwrap_or_default();

        if series.len() < 2 {
            return TrendReport {
                trend: Trend::Stable,
                slope: 0.0,
                change_percent: 0.0,
                n_samples: series.len(),
            };
        }

        let slope = statistics::ols_slope(&series);
        let first = series[0];
        let last = series[series.len() - 1];
        let change_percent = if first.abs() > 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };

        let trend = if slope > 0.001 {
            Trend::Improving
        } else if slope < -0.001 {
            Trend::Degrading
        } else {
            Trend::Stable
        };

        TrendReport {
            trend,
            slope,
            change_percent,
            n_samples: series.len(),
        }
    }

    /// Rolling history length for a model
    pub fn history_len(&self, model_id: &str) -> usize {
        self.history.get(model_id).map_or(0, |h| h.len())
    }

    fn push_history(&mut self, model_id: &str, metrics: ModelMetrics) {
        let window = self.config.history_window;
        let history = self.history.entry(model_id.to_string()).or_default();
        history.push_back(metrics);
        while history.len() > window {
            history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_with_ndcg(id: &str, ndcg: f64) -> ModelMetrics {
        ModelMetrics::new(id, id, "v1")
            .with_ndcg(ndcg, ndcg)
            .with_accuracies(30.0, 55.0, 70.0)
    }

    fn monitor() -> DriftMonitor {
        DriftMonitor::new(DriftConfig::default())
    }

    #[test]
    fn test_ndcg_drop_raises_high_severity_alert() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        monitor.set_baseline("m1", metrics_with_ndcg("m1", 0.85));
        let current = metrics_with_ndcg("m1", 0.80);
        let alerts = monitor.monitor_performance(&mut registry, "m1", &current, now);

        // (0.85 - 0.80) / 0.85 ~= 5.88% > 5% boundary
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, DriftType::Performance);
        assert_eq!(alerts[0].severity, Severity::High);
        assert!(alerts[0].requires_retraining);
        assert!((alerts[0].drift_magnitude - 0.0588).abs() < 0.001);
        assert_eq!(registry.active_alerts(now).len(), 1);
    }

    #[test]
    fn test_improvement_never_alerts() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        monitor.set_baseline("m1", metrics_with_ndcg("m1", 0.80));
        let current = metrics_with_ndcg("m1", 0.85);
        let alerts = monitor.monitor_performance(&mut registry, "m1", &current, now);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_unchanged_win_accuracy_raises_nothing() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        let baseline = metrics_with_ndcg("m1", 0.85);
        monitor.set_baseline("m1", baseline.clone());
        let alerts = monitor.monitor_performance(&mut registry, "m1", &baseline, now);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_win_accuracy_drop_raises_prediction_alert() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        monitor.set_baseline("m1", metrics_with_ndcg("m1", 0.85));
        let mut current = metrics_with_ndcg("m1", 0.85);
        current.win_accuracy = 24.0; // 20% relative drop

        let alerts = monitor.monitor_performance(&mut registry, "m1", &current, now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, DriftType::Prediction);
        assert_eq!(alerts[0].severity, Severity::High);
        assert!(alerts[0].requires_retraining);
    }

    #[test]
    fn test_no_baseline_no_alerts_history_still_grows() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        let current = metrics_with_ndcg("m1", 0.80);
        let alerts = monitor.monitor_performance(&mut registry, "m1", &current, now);
        assert!(alerts.is_empty());
        assert_eq!(monitor.history_len("m1"), 1);
    }

    #[test]
    fn test_concept_drift_on_shifted_samples() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        let baseline = Array1::from_vec((1..=9).map(|i| i as f64 * 0.1).collect());
        let recent = Array1::from_vec((1..=9).map(|i| 0.4 + i as f64 * 0.1).collect());

        let alert = monitor
            .detect_concept_drift(&mut registry, "m1", &recent, &baseline, now)
            .expect("shifted samples should alert");
        assert_eq!(alert.alert_type, DriftType::Concept);
        assert!(alert.drift_magnitude > 0.15);
        assert!(alert.requires_retraining);
        assert_eq!(registry.active_alerts(now).len(), 1);
    }

    #[test]
    fn test_concept_drift_empty_samples() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        let empty = Array1::from_vec(vec![]);
        let baseline = Array1::from_vec(vec![0.1, 0.2, 0.3]);
        assert!(monitor
            .detect_concept_drift(&mut registry, "m1", &empty, &baseline, now)
            .is_none());
    }

    #[test]
    fn test_cooldown_gates_retraining() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        // Drive a retraining-required alert into the registry
        monitor.set_baseline("m1", metrics_with_ndcg("m1", 0.85));
        let degraded = metrics_with_ndcg("m1", 0.78);
        monitor.monitor_performance(&mut registry, "m1", &degraded, now);
        assert!(monitor.should_retrain(&registry, "m1", now));

        monitor.mark_retrained("m1", now);
        assert!(!monitor.should_retrain(&registry, "m1", now));

        // After the cooldown the same drift conditions re-qualify
        let later = now + Duration::hours(2);
        assert!(monitor.should_retrain(&registry, "m1", later));
    }

    #[test]
    fn test_should_retrain_requires_recommendation() {
        let registry = MetricsRegistry::new();
        let monitor = monitor();
        assert!(!monitor.should_retrain(&registry, "m1", Utc::now()));
    }

    #[test]
    fn test_ndcg_trend_classification() {
        let mut registry = MetricsRegistry::new();
        let mut monitor = monitor();
        let now = Utc::now();

        for i in 0..10 {
            let current = metrics_with_ndcg("up", 0.70 + i as f64 * 0.01);
            monitor.monitor_performance(&mut registry, "up", &current, now);
        }
        let report = monitor.ndcg_trend("up");
        assert_eq!(report.trend, Trend::Improving);
        assert!(report.slope > 0.001);
        assert!(report.change_percent > 0.0);
        assert_eq!(report.n_samples, 10);

        for i in 0..10 {
            let current = metrics_with_ndcg("down", 0.85 - i as f64 * 0.01);
            monitor.monitor_performance(&mut registry, "down", &current, now);
        }
        assert_eq!(monitor.ndcg_trend("down").trend, Trend::Degrading);

        assert_eq!(monitor.ndcg_trend("unknown").trend, Trend::Stable);
    }

    #[test]
    fn test_score_buffer_bounded_and_ordered() {
        let mut registry = MetricsRegistry::new();
        let config = DriftConfig::default().with_history_window(4);
        let mut monitor = DriftMonitor::new(config);
        let now = Utc::now();

        for i in 0..6 {
            monitor.record_score("m1", i as f64);
        }
        let scores = monitor.recent_scores("m1");
        assert_eq!(scores.len(), 4);
        assert!((scores[0] - 2.0).abs() < 1e-12);
        assert!((scores[3] - 5.0).abs() < 1e-12);

        // Buffered scores feed the concept-drift test directly
        let recent = monitor.recent_scores("m1");
        let baseline = Array1::from_vec(vec![2.0, 3.0, 4.0, 5.0]);
        assert!(monitor
            .detect_concept_drift(&mut registry, "m1", &recent, &baseline, now)
            .is_none());
        assert_eq!(monitor.recent_scores("unknown").len(), 0);
    }

    #[test]
    fn test_history_window_bounded() {
        let mut registry = MetricsRegistry::new();
        let config = DriftConfig::default().with_history_window(5);
        let mut monitor = DriftMonitor::new(config);
        let now = Utc::now();

        for i in 0..12 {
            let current = metrics_with_ndcg("m1", 0.70 + i as f64 * 0.001);
            monitor.monitor_performance(&mut registry, "m1", &current, now);
        }
        assert_eq!(monitor.history_len("m1"), 5);
    }
}

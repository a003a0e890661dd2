//! Drift detection
//!
//! Compares live model performance against frozen baselines, runs a
//! two-sample Kolmogorov-Smirnov test for concept drift, and gates
//! retraining behind a per-model cooldown.

mod monitor;
pub mod statistics;

pub use monitor::{DriftConfig, DriftMonitor, Trend, TrendReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of drift an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    /// Input data distribution shifted
    Data,
    /// Model output quality (accuracy) shifted
    Prediction,
    /// Input-output relationship shifted (KS test)
    Concept,
    /// Realized ranking quality degraded
    Performance,
}

/// Alert severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Immutable drift event raised by the monitor.
///
/// Alerts soft-expire from active views 24 hours after `timestamp`; they
/// are never mutated or deleted individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftAlert {
    /// Unique alert identifier
    pub alert_id: String,
    /// Model the alert concerns
    pub model_id: String,
    /// Kind of drift detected
    pub alert_type: DriftType,
    /// How urgent the drift is
    pub severity: Severity,
    /// Measured drift statistic
    pub drift_magnitude: f64,
    /// Threshold the statistic was compared against
    pub threshold: f64,
    /// Human-readable description
    pub message: String,
    /// When the drift was observed
    pub timestamp: DateTime<Utc>,
    /// Whether this alert alone justifies retraining
    pub requires_retraining: bool,
}

impl DriftAlert {
    /// Create a new alert with a fresh id
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_id: impl Into<String>,
        alert_type: DriftType,
        severity: Severity,
        drift_magnitude: f64,
        threshold: f64,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        requires_retraining: bool,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4().to_string(),
            model_id: model_id.into(),
            alert_type,
            severity,
            drift_magnitude,
            threshold,
            message: message.into(),
            timestamp,
            requires_retraining,
        }
    }

    /// Whether the alert is still active at `now` (24 hour window)
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) <= chrono::Duration::hours(24)
    }
}

//! A/B test records for candidate model rollouts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an A/B test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbTestStatus {
    /// Traffic is still split between control and treatment
    Active,
    /// The test has been stopped and its numbers are final
    Concluded,
}

/// Comparison of a control model against a treatment candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTest {
    /// Stable test identifier
    pub test_id: String,
    /// Currently deployed model
    pub control_model_id: String,
    /// Candidate model
    pub treatment_model_id: String,
    /// Control NDCG@3 measured during the test
    pub control_ndcg: f64,
    /// Treatment NDCG@3 measured during the test
    pub treatment_ndcg: f64,
    /// Relative improvement of treatment over control, percent
    pub improvement: f64,
    /// P-value of the comparison
    pub statistical_significance: f64,
    /// Whether the comparison cleared the significance bar
    pub is_significant: bool,
    /// Fraction of traffic routed to the treatment
    pub traffic_split: f64,
    /// Lifecycle state
    pub status: AbTestStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Set once the winner has been promoted; a promoted test cannot be
    /// promoted again
    pub promoted_at: Option<DateTime<Utc>>,
}

impl AbTest {
    /// Create a new active test
    pub fn new(
        test_id: impl Into<String>,
        control_model_id: impl Into<String>,
        treatment_model_id: impl Into<String>,
        traffic_split: f64,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            control_model_id: control_model_id.into(),
            treatment_model_id: treatment_model_id.into(),
            control_ndcg: 0.0,
            treatment_ndcg: 0.0,
            improvement: 0.0,
            statistical_significance: 1.0,
            is_significant: false,
            traffic_split: traffic_split.clamp(0.0, 1.0),
            status: AbTestStatus::Active,
            created_at: Utc::now(),
            promoted_at: None,
        }
    }

    /// The side with the higher measured NDCG@3
    pub fn winner(&self) -> &str {
        if self.treatment_ndcg > self.control_ndcg {
            &self.treatment_model_id
        } else {
            &self.control_model_id
        }
    }

    /// The side [`Self::winner`] did not pick
    pub fn loser(&self) -> &str {
        if self.treatment_ndcg > self.control_ndcg {
            &self.control_model_id
        } else {
            &self.treatment_model_id
        }
    }
}

/// Partial update applied to an existing [`AbTest`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbTestUpdate {
    pub control_ndcg: Option<f64>,
    pub treatment_ndcg: Option<f64>,
    pub improvement: Option<f64>,
    pub statistical_significance: Option<f64>,
    pub is_significant: Option<bool>,
    pub status: Option<AbTestStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_picks_higher_ndcg() {
        let mut test = AbTest::new("t1", "champion", "challenger", 0.5);
        test.control_ndcg = 0.80;
        test.treatment_ndcg = 0.85;
        assert_eq!(test.winner(), "challenger");
        assert_eq!(test.loser(), "champion");
    }

    #[test]
    fn test_control_wins_ties() {
        let mut test = AbTest::new("t2", "champion", "challenger", 0.5);
        test.control_ndcg = 0.80;
        test.treatment_ndcg = 0.80;
        assert_eq!(test.winner(), "champion");
    }
}

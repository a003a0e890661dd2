//! Steward - Model lifecycle management for horse-race ranking models
//!
//! This crate provides the control plane that keeps a stable of ranking
//! models healthy in production:
//! - Per-model performance tracking and ensemble weighting
//! - Statistical drift detection against frozen baselines
//! - Automated retraining with bounded concurrency and cooldowns
//! - A/B-test winner promotion
//!
//! # Modules
//!
//! ## Core
//! - [`metrics`] - Model metrics registry, ensemble weights, A/B tests
//! - [`drift`] - Drift monitoring, KS test, retraining eligibility
//! - [`training`] - Training capabilities and the orchestration pipeline
//! - [`scheduler`] - The retraining control loop and its API surface
//!
//! Everything is held in memory: a restart loses the job queue, alert log,
//! and execution history. Durability, transport, and authentication belong
//! to the host wrapping this crate.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::RwLock;
//! use steward::prelude::*;
//!
//! # fn capabilities() -> (Arc<dyn DatasetProvider>, Arc<dyn ModelTrainer>) { unimplemented!() }
//! # async fn demo() {
//! let (dataset, trainer) = capabilities();
//! let registry = Arc::new(RwLock::new(MetricsRegistry::new()));
//! let monitor = Arc::new(RwLock::new(DriftMonitor::new(DriftConfig::default())));
//! let orchestrator = Arc::new(TrainingOrchestrator::new(
//!     OrchestratorConfig::default(),
//!     Arc::clone(&registry),
//!     dataset,
//!     Arc::new(ColumnarFeatureBuilder::new("finish_rank")),
//!     trainer,
//! ));
//!
//! let scheduler = RetrainingScheduler::new(
//!     SchedulerConfig::default(),
//!     registry,
//!     monitor,
//!     orchestrator,
//! );
//! scheduler.start();
//! scheduler.queue_retraining_job("gradient_ranker", TriggerReason::Manual).await;
//! # }
//! ```

// Core error handling
pub mod error;

// Core lifecycle modules
pub mod drift;
pub mod metrics;
pub mod scheduler;
pub mod training;

pub use error::{Result, StewardError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, StewardError};

    // Metrics
    pub use crate::metrics::{
        AbTest, AbTestStatus, AbTestUpdate, MetricsRegistry, MetricsUpdate, ModelMetrics,
        ModelWeight, PerformanceSummary, RetrainingRecommendation,
    };

    // Drift detection
    pub use crate::drift::{
        DriftAlert, DriftConfig, DriftMonitor, DriftType, Severity, Trend, TrendReport,
    };

    // Training
    pub use crate::training::{
        BaselineSource, ColumnarFeatureBuilder, DatasetProvider, FeatureBuilder, FeatureSet,
        ModelTrainer, OrchestrationResult, OrchestratorConfig, TrainingOrchestrator,
        TrainingResult, TrainingSpec, TrainingStrategy, TriggerReason,
    };

    // Scheduler
    pub use crate::scheduler::{
        DriftSummary, JobStatus, PromotionOutcome, QueueStatus, RetrainingJob, RetrainingNeeds,
        RetrainingScheduler, SchedulerConfig,
    };
}

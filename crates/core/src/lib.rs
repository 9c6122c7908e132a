//! Shared domain model for the compliance forecasting autopilot.
//!
//! Closed enums for every status/operator concept, entity structs for the
//! pipeline's rows, and the engine error taxonomy.

pub mod error;
pub mod model;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use model::{
    CheckResult, EnsembleForecast, EnsembleWeights, ExperimentAssignment, ExplainabilitySignal,
    ForecastAccuracyRecord, ForecastModelMetrics, ForecastPrediction, InsightRecord,
    ModelExperiment, PlaybookCondition, PlaybookEntry, Recommendation, RemediationRun,
    SignalWeight, SloAdjustment, TenantSettings, TrainingJob, WeightHistoryEntry,
};
pub use types::{
    ActionKind, ConditionOperator, ExperimentStatus, FeedbackKind, Outcome, RecommendationStatus,
    RiskLevel, RunStatus, Severity, TrainingStatus,
};

// core/model.rs
// Entity structs shared between the engine stages and the store.
// All rows are tenant-scoped; timestamps are UTC.

use crate::types::{
    ActionKind, ConditionOperator, ExperimentStatus, Outcome, RecommendationStatus, RiskLevel,
    RunStatus, Severity, TrainingStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single compliance check result. Append-only, produced externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub tenant_id: String,
    pub outcome: Outcome,
    pub rule_id: String,
    pub rule_group: String,
    pub ts: DateTime<Utc>,
}

/// Per-tenant settings: SLO target plus feature-flag toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: String,
    pub slo_target: f64,
    pub self_tuning_enabled: bool,
    pub canary_opt_in: bool,
    pub recommendations_enabled: bool,
    pub explainability_enabled: bool,
}

impl TenantSettings {
    pub fn with_defaults(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            slo_target: 95.0,
            self_tuning_enabled: false,
            canary_opt_in: false,
            recommendations_enabled: true,
            explainability_enabled: true,
        }
    }
}

/// Ensemble model weights. Invariant: each in [0.2, 0.6], sum == 1 (±1e-6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EnsembleWeights {
    pub trend: f64,
    pub conservative: f64,
    pub optimistic: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            trend: 0.33,
            conservative: 0.33,
            optimistic: 0.34,
        }
    }
}

impl EnsembleWeights {
    pub fn sum(&self) -> f64 {
        self.trend + self.conservative + self.optimistic
    }

    pub fn is_valid(&self) -> bool {
        let in_bounds = |w: f64| (0.2..=0.6).contains(&w);
        in_bounds(self.trend)
            && in_bounds(self.conservative)
            && in_bounds(self.optimistic)
            && (self.sum() - 1.0).abs() < 1e-6
    }
}

/// One ensemble blend per tenant per forecast cycle.
/// Weights here are a read-only snapshot of the controller's last decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleForecast {
    pub id: String,
    pub tenant_id: String,
    pub trend_prediction: f64,
    pub conservative_prediction: f64,
    pub optimistic_prediction: f64,
    pub weights: EnsembleWeights,
    pub blended_sr: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub generated_at: DateTime<Utc>,
}

/// Forecast published to the rest of the product. Immutable after creation,
/// except for the `applied` marker set once by the weight controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPrediction {
    pub id: String,
    pub tenant_id: String,
    pub risk_level: RiskLevel,
    pub breach_probability_7d: f64,
    pub confidence_score: f64,
    pub predicted_sr_7d: f64,
    pub volatility_index: f64,
    pub current_slo_target: f64,
    pub suggested_slo_target: f64,
    pub advisories: Vec<String>,
    pub model_version: String,
    pub applied: bool,
    pub generated_at: DateTime<Utc>,
}

/// Backtest record, written exactly once per eligible forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastAccuracyRecord {
    pub id: String,
    pub forecast_id: String,
    pub tenant_id: String,
    pub predicted_breach: bool,
    pub actual_breach: bool,
    pub predicted_sr: f64,
    pub actual_sr: f64,
    pub evaluation_date: DateTime<Utc>,
    pub days_ahead: i64,
}

/// Rolling 30-day forecast quality aggregate. Append-only time series;
/// "latest" resolves by most recent `computed_at`.
/// Precision/recall/reliability are on a 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastModelMetrics {
    pub id: String,
    pub tenant_id: String,
    pub precision: f64,
    pub recall: f64,
    pub mae: f64,
    /// Mean signed error (predicted - actual). Input to the retrain planner.
    pub bias: f64,
    pub reliability: f64,
    pub sample_size: i64,
    pub computed_at: DateTime<Utc>,
}

/// One mined explanatory signal per (feature, key, metric) per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainabilitySignal {
    pub id: String,
    pub tenant_id: String,
    pub day: DateTime<Utc>,
    pub feature: String,
    pub key: String,
    pub metric: String,
    pub value: f64,
    pub sample_size: i64,
    pub p_value: Option<f64>,
}

/// Emitted when a mining run's single strongest signal clears the insight
/// gate. Append-only; surfaced in the digest notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightRecord {
    pub id: String,
    pub tenant_id: String,
    pub signal_id: String,
    pub feature: String,
    pub key: String,
    pub metric: String,
    pub value: f64,
    pub p_value: Option<f64>,
    pub detected_at: DateTime<Utc>,
}

/// Feedback-accumulated weighting for a signal family. The only mutable,
/// accumulating entity in the explainability subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWeight {
    pub tenant_id: String,
    pub feature: String,
    pub key: String,
    pub metric: String,
    pub weight: f64,
    pub confidence: f64,
    pub sample: i64,
}

/// Trigger predicate for a playbook. `feature` may carry pipe-separated
/// alternatives ("rule_group|day_of_week").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookCondition {
    pub feature: String,
    pub key: Option<String>,
    pub metric: String,
    pub operator: ConditionOperator,
    pub threshold: f64,
}

/// Curated remediation template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookEntry {
    pub code: String,
    pub title: String,
    pub condition: PlaybookCondition,
    pub action: ActionKind,
    pub action_params: serde_json::Value,
    pub severity: Severity,
    pub default_impact: f64,
    pub trusted: bool,
}

/// Scored recommendation produced by matching weighted signals against the
/// playbook catalog. At most one `open` row per
/// (tenant, playbook_code, signal feature+key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub tenant_id: String,
    pub playbook_code: String,
    pub signal_feature: String,
    pub signal_key: String,
    pub signal_value: f64,
    pub weight: f64,
    pub confidence: f64,
    pub expected_impact: f64,
    pub priority: i64,
    pub status: RecommendationStatus,
    pub snooze_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Execution record for one remediation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRun {
    pub id: String,
    pub tenant_id: String,
    pub playbook_code: String,
    pub recommendation_id: String,
    pub auto_triggered: bool,
    pub parameters: serde_json::Value,
    pub confidence_before: f64,
    pub confidence_after: Option<f64>,
    pub impact: Option<f64>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Audit row for every committed SLO-target adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloAdjustment {
    pub id: String,
    pub tenant_id: String,
    pub old_target: f64,
    pub new_target: f64,
    pub delta: f64,
    pub risk_level: RiskLevel,
    pub breach_probability: f64,
    pub confidence: f64,
    pub forecast_id: String,
    pub adjusted_at: DateTime<Utc>,
}

/// Canary experiment over a tenant subset. At most one draft/running
/// experiment per model family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelExperiment {
    pub id: String,
    pub name: String,
    pub family: String,
    pub variant: serde_json::Value,
    pub allocation: f64,
    pub status: ExperimentStatus,
    pub owner: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Sticky tenant assignment to an experiment. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub experiment_id: String,
    pub tenant_id: String,
    pub sticky: bool,
    pub assigned_at: DateTime<Utc>,
}

/// Queued/executed retraining job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJob {
    pub id: String,
    pub family: String,
    pub target_version: String,
    pub status: TrainingStatus,
    pub trigger_reason: String,
    pub metrics_before: serde_json::Value,
    pub metrics_after: Option<serde_json::Value>,
    pub logs: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persisted weight decision, one row per controller commit or training
/// rollout. "Latest weights" for a tenant resolves by most recent row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightHistoryEntry {
    pub id: String,
    pub tenant_id: String,
    pub weights: EnsembleWeights,
    pub model_version: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

// engine/retrain.rs
// Retraining Planner & Trainer: detects systemic forecast degradation,
// launches one canary experiment per model family, and executes queued
// training jobs that rewrite ensemble weights.

use crate::controller;
use autopilot_core::{
    EnsembleWeights, ExperimentAssignment, ExperimentStatus, ForecastModelMetrics, ModelExperiment,
    TenantSettings, TrainingJob, TrainingStatus,
};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

/// Candidate-detection thresholds.
pub const MIN_RELIABILITY: f64 = 70.0;
pub const MAX_MAE: f64 = 5.0;
pub const MAX_ABS_BIAS: f64 = 2.5;
pub const MIN_SAMPLE: i64 = 10;

/// Canary allocation fraction.
pub const CANARY_ALLOCATION: f64 = 0.2;

/// Jobs drained per trainer run.
pub const JOBS_PER_RUN: usize = 5;

pub const MODEL_FAMILY: &str = "sr-ensemble";

/// A tenant whose forecasts have degraded enough to retrain against.
pub fn is_candidate(metrics: &ForecastModelMetrics, settings: &TenantSettings) -> bool {
    if metrics.sample_size < MIN_SAMPLE {
        return false;
    }
    if !settings.self_tuning_enabled || !settings.canary_opt_in {
        return false;
    }
    metrics.reliability < MIN_RELIABILITY
        || metrics.mae > MAX_MAE
        || metrics.bias.abs() > MAX_ABS_BIAS
}

/// Everything the planner wants persisted when it fires.
#[derive(Debug, Clone)]
pub struct RetrainPlan {
    pub experiment: ModelExperiment,
    pub assignments: Vec<ExperimentAssignment>,
    pub job: TrainingJob,
}

/// Plan a retraining round. No-op (None) when an experiment for the family
/// is already draft or running, or when there are no candidates.
pub fn plan(
    candidates: &[(ForecastModelMetrics, TenantSettings)],
    active_experiment: Option<&ModelExperiment>,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Option<RetrainPlan> {
    if let Some(experiment) = active_experiment {
        if matches!(
            experiment.status,
            ExperimentStatus::Draft | ExperimentStatus::Running
        ) {
            return None;
        }
    }
    if candidates.is_empty() {
        return None;
    }

    let experiment_id = uuid::Uuid::new_v4().to_string();
    let target_version = format!("{}-{}", MODEL_FAMILY, now.format("%Y%m%d%H%M%S"));

    // Randomly assign ~20% of candidates (at least one) as canary tenants.
    let mut tenant_ids: Vec<&str> = candidates
        .iter()
        .map(|(m, _)| m.tenant_id.as_str())
        .collect();
    tenant_ids.shuffle(rng);
    let canary_count = ((tenant_ids.len() as f64 * CANARY_ALLOCATION).ceil() as usize)
        .clamp(1, tenant_ids.len());
    let assignments: Vec<ExperimentAssignment> = tenant_ids[..canary_count]
        .iter()
        .map(|tenant_id| ExperimentAssignment {
            experiment_id: experiment_id.clone(),
            tenant_id: tenant_id.to_string(),
            sticky: true,
            assigned_at: now,
        })
        .collect();

    let n = candidates.len() as f64;
    let avg_reliability = candidates.iter().map(|(m, _)| m.reliability).sum::<f64>() / n;
    let avg_mae = candidates.iter().map(|(m, _)| m.mae).sum::<f64>() / n;
    let avg_bias = candidates.iter().map(|(m, _)| m.bias).sum::<f64>() / n;

    let trigger_reason = format!(
        "{} degraded tenants: avg reliability {:.1}, avg mae {:.2}, avg bias {:.2}",
        candidates.len(),
        avg_reliability,
        avg_mae,
        avg_bias
    );

    let experiment = ModelExperiment {
        id: experiment_id.clone(),
        name: format!("retrain-{}", now.format("%Y-%m-%d")),
        family: MODEL_FAMILY.to_string(),
        variant: serde_json::json!({ "target_version": target_version }),
        allocation: CANARY_ALLOCATION,
        // Activated by the caller once assignments and the job are stored.
        status: ExperimentStatus::Draft,
        owner: "autopilot".to_string(),
        notes: trigger_reason.clone(),
        created_at: now,
    };

    let job = TrainingJob {
        id: uuid::Uuid::new_v4().to_string(),
        family: MODEL_FAMILY.to_string(),
        target_version,
        status: TrainingStatus::Queued,
        trigger_reason,
        metrics_before: serde_json::json!({
            "avg_reliability": avg_reliability,
            "avg_mae": avg_mae,
            "avg_bias": avg_bias,
            "candidates": candidates.len(),
        }),
        metrics_after: None,
        logs: String::new(),
        created_at: now,
        completed_at: None,
    };

    Some(RetrainPlan {
        experiment,
        assignments,
        job,
    })
}

/// Result of executing one training job.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// New weights per canary tenant, from the bounded-adjustment rule.
    pub tenant_weights: Vec<(String, EnsembleWeights)>,
    pub metrics_after: serde_json::Value,
    pub logs: String,
}

/// Execute a training job against the canary tenants' current weights and
/// latest metrics. Pure computation; the caller persists weight-history
/// rows and flips the job status.
pub fn train(
    canaries: &[(String, EnsembleWeights, ForecastModelMetrics)],
) -> TrainingOutcome {
    let mut tenant_weights = Vec::with_capacity(canaries.len());
    let mut logs = String::new();
    let mut mae_sum = 0.0;
    let mut reliability_sum = 0.0;

    for (tenant_id, current, metrics) in canaries {
        let updated = controller::retune_weights(*current, metrics.reliability, metrics.mae);
        logs.push_str(&format!(
            "tenant {}: weights ({:.3},{:.3},{:.3}) -> ({:.3},{:.3},{:.3})\n",
            tenant_id,
            current.trend,
            current.conservative,
            current.optimistic,
            updated.trend,
            updated.conservative,
            updated.optimistic,
        ));
        mae_sum += metrics.mae;
        reliability_sum += metrics.reliability;
        tenant_weights.push((tenant_id.clone(), updated));
    }

    let n = canaries.len().max(1) as f64;
    let metrics_after = serde_json::json!({
        "tenants_retrained": canaries.len(),
        "avg_mae_in": mae_sum / n,
        "avg_reliability_in": reliability_sum / n,
        // Heuristic expectation: the conservative shift trims MAE modestly.
        "expected_mae_delta": -(mae_sum / n * 0.1),
    });

    TrainingOutcome {
        tenant_weights,
        metrics_after,
        logs,
    }
}

// engine/controller.rs
// Self-Tuning Weight Controller: the one bounded-update primitive shared by
// the per-cycle nudge, the threshold-gated tuner, and the trainer.
//
// Two policies exist because the product has two entry points: an
// unconditional nudge that runs every cycle, and an adaptive tuner that only
// commits an SLO change when the forecast's suggested delta is material.
// Both share the same bounding rules.

use autopilot_core::{EnsembleWeights, ForecastPrediction, SloAdjustment};
use chrono::{DateTime, Utc};

/// Per-weight hard bounds.
pub const WEIGHT_MIN: f64 = 0.2;
pub const WEIGHT_MAX: f64 = 0.6;

/// Base learning rate for reliability-driven deltas.
const LEARNING_RATE: f64 = 0.05;

/// Reliability pivot: above this the trend model gains weight, below it
/// loses weight.
const RELIABILITY_PIVOT: f64 = 75.0;

/// MAE above this shifts weight from the trend model to the conservative
/// model, up to 0.1 per cycle.
const MAE_SHIFT_THRESHOLD: f64 = 3.0;
const MAE_SHIFT_CAP: f64 = 0.1;

/// Largest SLO-target move a single cycle may commit.
pub const SLO_MAX_STEP: f64 = 5.0;
pub const SLO_MIN: f64 = 70.0;
pub const SLO_MAX: f64 = 98.0;

/// When to commit an SLO-target adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NudgePolicy {
    /// Commit any nonzero suggested delta (bounded).
    Always,
    /// Commit only when the suggested delta exceeds `min_delta` points and
    /// forecast confidence is at least `min_confidence`.
    ThresholdGated { min_delta: f64, min_confidence: f64 },
}

impl NudgePolicy {
    pub fn adaptive() -> Self {
        NudgePolicy::ThresholdGated {
            min_delta: 0.5,
            min_confidence: 50.0,
        }
    }
}

/// Project a weight vector onto {each in [0.2, 0.6], sum == 1}.
/// Distributes the residual over weights that still have slack; with three
/// weights and these bounds a feasible projection always exists.
fn project(mut weights: [f64; 3]) -> [f64; 3] {
    for _ in 0..8 {
        for w in weights.iter_mut() {
            *w = w.clamp(WEIGHT_MIN, WEIGHT_MAX);
        }
        let residual = 1.0 - weights.iter().sum::<f64>();
        if residual.abs() < 1e-9 {
            break;
        }
        let slack: Vec<usize> = (0..3)
            .filter(|&i| {
                if residual > 0.0 {
                    weights[i] < WEIGHT_MAX - 1e-12
                } else {
                    weights[i] > WEIGHT_MIN + 1e-12
                }
            })
            .collect();
        if slack.is_empty() {
            break;
        }
        let share = residual / slack.len() as f64;
        for i in slack {
            weights[i] += share;
        }
    }
    weights
}

/// The bounded-update primitive: nudge ensemble weights from reliability and
/// MAE feedback. Deterministic; result always satisfies the weight
/// invariants.
pub fn retune_weights(current: EnsembleWeights, reliability: f64, mae: f64) -> EnsembleWeights {
    let delta = (reliability - RELIABILITY_PIVOT) / 100.0 * LEARNING_RATE;

    let mut trend = current.trend + delta;
    let mut conservative = current.conservative - delta / 2.0;
    let optimistic = current.optimistic - delta / 2.0;

    if mae > MAE_SHIFT_THRESHOLD {
        let shift = ((mae - MAE_SHIFT_THRESHOLD) * 0.02).min(MAE_SHIFT_CAP);
        trend -= shift;
        conservative += shift;
    }

    let projected = project([trend, conservative, optimistic]);

    EnsembleWeights {
        trend: projected[0],
        conservative: projected[1],
        optimistic: projected[2],
    }
}

/// Decide whether a forecast's suggested target becomes a committed SLO
/// adjustment. Returns the audit record to persist, or None when no change
/// should be committed. The caller marks the source forecast as applied.
pub fn plan_slo_adjustment(
    policy: NudgePolicy,
    forecast: &ForecastPrediction,
    now: DateTime<Utc>,
) -> Option<SloAdjustment> {
    let suggested_delta = forecast.suggested_slo_target - forecast.current_slo_target;
    if suggested_delta == 0.0 {
        return None;
    }

    if let NudgePolicy::ThresholdGated {
        min_delta,
        min_confidence,
    } = policy
    {
        if suggested_delta.abs() <= min_delta || forecast.confidence_score < min_confidence {
            return None;
        }
    }

    let bounded_delta = suggested_delta.clamp(-SLO_MAX_STEP, SLO_MAX_STEP);
    let new_target = (forecast.current_slo_target + bounded_delta).clamp(SLO_MIN, SLO_MAX);
    let delta = new_target - forecast.current_slo_target;
    if delta == 0.0 {
        return None;
    }

    Some(SloAdjustment {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: forecast.tenant_id.clone(),
        old_target: forecast.current_slo_target,
        new_target,
        delta,
        risk_level: forecast.risk_level,
        breach_probability: forecast.breach_probability_7d,
        confidence: forecast.confidence_score,
        forecast_id: forecast.id.clone(),
        adjusted_at: now,
    })
}

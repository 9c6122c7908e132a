// engine/forecast.rs
// Ensemble Forecaster: blends three heuristic predictors into one forecast
// with a reliability-scaled confidence interval.
//
// The reliability-based weight nudge here is a per-cycle adjustment applied
// to the snapshot of weights read at generation time. It is never persisted;
// only the weight controller commits weight updates.

use autopilot_core::{EnsembleForecast, EnsembleWeights};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Reliability assumed for tenants with no accuracy history yet.
pub const DEFAULT_RELIABILITY: f64 = 80.0;

/// Jitter half-width applied to each base model (percentage points).
const NOISE: f64 = 0.4;

/// Outputs of the three base heuristic models.
#[derive(Debug, Clone, Copy)]
pub struct ModelOutputs {
    pub trend: f64,
    pub conservative: f64,
    pub optimistic: f64,
}

/// Run the three base models against the observed success rate.
pub fn base_predictions(observed_sr: f64, rng: &mut impl Rng) -> ModelOutputs {
    let mut jitter = || rng.gen_range(-NOISE..=NOISE);
    ModelOutputs {
        trend: (observed_sr + jitter()).clamp(0.0, 100.0),
        conservative: (observed_sr - 1.0 + jitter()).clamp(0.0, 100.0),
        optimistic: (observed_sr + 0.5 + jitter()).clamp(0.0, 100.0),
    }
}

/// Apply the per-cycle reliability nudge to a weight snapshot.
///
/// High reliability biases the trend (ARIMA-style) weight toward
/// `min(0.5, reliability / 300)`; the remainder is split between the other
/// two models in their snapshot proportion, then the vector is renormalized.
pub fn reliability_adjusted(snapshot: EnsembleWeights, reliability: f64) -> EnsembleWeights {
    let trend = snapshot.trend.max((reliability / 300.0).min(0.5));
    let rest = snapshot.conservative + snapshot.optimistic;
    let remaining = (1.0 - trend).max(0.0);
    let (conservative, optimistic) = if rest > 0.0 {
        (
            remaining * snapshot.conservative / rest,
            remaining * snapshot.optimistic / rest,
        )
    } else {
        (remaining / 2.0, remaining / 2.0)
    };

    let mut adjusted = EnsembleWeights {
        trend,
        conservative,
        optimistic,
    };
    let sum = adjusted.sum();
    if sum > 0.0 {
        adjusted.trend /= sum;
        adjusted.conservative /= sum;
        adjusted.optimistic /= sum;
    }
    adjusted
}

/// Confidence-interval half-width: grows as reliability falls.
pub fn ci_half_width(reliability: f64) -> f64 {
    1.5 + (100.0 - reliability.clamp(0.0, 100.0)) * 0.02
}

/// Produce one ensemble forecast for a tenant cycle.
pub fn generate(
    tenant_id: &str,
    observed_sr: f64,
    snapshot_weights: EnsembleWeights,
    reliability: f64,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> EnsembleForecast {
    let outputs = base_predictions(observed_sr, rng);
    let weights = reliability_adjusted(snapshot_weights, reliability);

    let blended = (outputs.trend * weights.trend
        + outputs.conservative * weights.conservative
        + outputs.optimistic * weights.optimistic)
        .clamp(0.0, 100.0);

    let half_width = ci_half_width(reliability);

    EnsembleForecast {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        trend_prediction: outputs.trend,
        conservative_prediction: outputs.conservative,
        optimistic_prediction: outputs.optimistic,
        weights,
        blended_sr: blended,
        ci_lower: (blended - half_width).max(0.0),
        ci_upper: (blended + half_width).min(100.0),
        generated_at: now,
    }
}

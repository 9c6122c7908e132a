// engine/accuracy.rs
// Forecast Accuracy Evaluator: backtests forecasts once their 7-day horizon
// has elapsed and maintains rolling 30-day model-quality metrics.
//
// Look-ahead guard: a forecast is eligible only when `generated_at` falls in
// [now - 14d, now - 7d). Evaluating earlier would leak future data into the
// reliability loop, which is a correctness bug, not noise.

use autopilot_core::{ForecastAccuracyRecord, ForecastModelMetrics, ForecastPrediction};
use chrono::{DateTime, Duration, Utc};

/// Forecast horizon in days.
pub const HORIZON_DAYS: i64 = 7;

/// Eligibility window for evaluation: exactly one full horizon elapsed,
/// and not so old that it would be evaluated twice.
pub fn eligibility_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - Duration::days(14), now - Duration::days(HORIZON_DAYS))
}

pub fn is_eligible(forecast: &ForecastPrediction, now: DateTime<Utc>) -> bool {
    let (start, end) = eligibility_window(now);
    forecast.generated_at >= start && forecast.generated_at < end
}

/// Score one forecast against the realized SR for its horizon window.
/// Breach on either side means `sr < target` at the time of the forecast.
pub fn evaluate_forecast(
    forecast: &ForecastPrediction,
    actual_sr: f64,
    now: DateTime<Utc>,
) -> ForecastAccuracyRecord {
    let target = forecast.current_slo_target;
    ForecastAccuracyRecord {
        id: uuid::Uuid::new_v4().to_string(),
        forecast_id: forecast.id.clone(),
        tenant_id: forecast.tenant_id.clone(),
        predicted_breach: forecast.predicted_sr_7d < target,
        actual_breach: actual_sr < target,
        predicted_sr: forecast.predicted_sr_7d,
        actual_sr,
        evaluation_date: now,
        days_ahead: HORIZON_DAYS,
    }
}

/// Recompute rolling metrics from a tenant's accuracy records.
/// Precision/recall/reliability are on a 0-100 scale; an undefined ratio
/// (no positive predictions / no actual breaches) scores as 0.
pub fn rolling_metrics(
    tenant_id: &str,
    records: &[ForecastAccuracyRecord],
    now: DateTime<Utc>,
) -> ForecastModelMetrics {
    let mut tp = 0u32;
    let mut fp = 0u32;
    let mut fn_ = 0u32;
    let mut abs_err_sum = 0.0;
    let mut signed_err_sum = 0.0;

    for r in records {
        match (r.predicted_breach, r.actual_breach) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
        abs_err_sum += (r.predicted_sr - r.actual_sr).abs();
        signed_err_sum += r.predicted_sr - r.actual_sr;
    }

    let n = records.len();
    let precision = ratio_pct(tp, tp + fp);
    let recall = ratio_pct(tp, tp + fn_);
    let (mae, bias) = if n == 0 {
        (0.0, 0.0)
    } else {
        (abs_err_sum / n as f64, signed_err_sum / n as f64)
    };

    let reliability =
        (0.5 * precision + 0.3 * recall + 0.2 * (100.0 - mae).max(0.0)).clamp(0.0, 100.0);

    ForecastModelMetrics {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        precision,
        recall,
        mae,
        bias,
        reliability,
        sample_size: n as i64,
        computed_at: now,
    }
}

fn ratio_pct(num: u32, denom: u32) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_core::RiskLevel;

    fn forecast_at(generated_at: DateTime<Utc>, predicted_sr: f64, target: f64) -> ForecastPrediction {
        ForecastPrediction {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: "t1".to_string(),
            risk_level: RiskLevel::Low,
            breach_probability_7d: 10.0,
            confidence_score: 80.0,
            predicted_sr_7d: predicted_sr,
            volatility_index: 2.0,
            current_slo_target: target,
            suggested_slo_target: target,
            advisories: vec![],
            model_version: "test".to_string(),
            applied: false,
            generated_at,
        }
    }

    #[test]
    fn test_horizon_guard() {
        let now = Utc::now();
        // Too fresh: horizon not elapsed.
        assert!(!is_eligible(&forecast_at(now - Duration::days(3), 90.0, 95.0), now));
        assert!(!is_eligible(
            &forecast_at(now - Duration::days(7) + Duration::seconds(1), 90.0, 95.0),
            now
        ));
        // In window.
        assert!(is_eligible(&forecast_at(now - Duration::days(8), 90.0, 95.0), now));
        assert!(is_eligible(&forecast_at(now - Duration::days(13), 90.0, 95.0), now));
        // Too old: already had its evaluation pass.
        assert!(!is_eligible(&forecast_at(now - Duration::days(15), 90.0, 95.0), now));
    }

    #[test]
    fn test_breach_classification() {
        let now = Utc::now();
        let f = forecast_at(now - Duration::days(8), 92.0, 95.0);
        let record = evaluate_forecast(&f, 96.0, now);
        assert!(record.predicted_breach);
        assert!(!record.actual_breach);
        assert_eq!(record.days_ahead, 7);
    }

    #[test]
    fn test_rolling_metrics_perfect_model() {
        let now = Utc::now();
        let records: Vec<_> = (0..10)
            .map(|i| {
                let f = forecast_at(now - Duration::days(8), 90.0, 95.0);
                let mut r = evaluate_forecast(&f, 90.0, now);
                // Alternate breach/non-breach, always predicted correctly.
                r.predicted_breach = i % 2 == 0;
                r.actual_breach = i % 2 == 0;
                r
            })
            .collect();
        let m = rolling_metrics("t1", &records, now);
        assert!((m.precision - 100.0).abs() < 1e-9);
        assert!((m.recall - 100.0).abs() < 1e-9);
        assert!(m.mae < 1e-9);
        assert!((m.reliability - 100.0).abs() < 1e-9);
        assert_eq!(m.sample_size, 10);
    }

    #[test]
    fn test_rolling_metrics_empty_and_undefined_ratios() {
        let now = Utc::now();
        let m = rolling_metrics("t1", &[], now);
        assert_eq!(m.sample_size, 0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert!((m.reliability - 20.0).abs() < 1e-9); // 0.2 * (100 - 0)
    }

    #[test]
    fn test_bias_is_signed() {
        let now = Utc::now();
        let f = forecast_at(now - Duration::days(8), 95.0, 90.0);
        let over = evaluate_forecast(&f, 90.0, now); // predicted 5 high
        let m = rolling_metrics("t1", &[over], now);
        assert!((m.bias - 5.0).abs() < 1e-9);
        assert!((m.mae - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_reliability_clamped() {
        let now = Utc::now();
        let f = forecast_at(now - Duration::days(8), 10.0, 90.0);
        let r = evaluate_forecast(&f, 95.0, now); // mae 85
        let m = rolling_metrics("t1", &[r], now);
        assert!((0.0..=100.0).contains(&m.reliability));
    }
}

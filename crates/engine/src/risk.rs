// engine/risk.rs
// Breach-Risk Scorer: derives risk level, breach probability, advisories,
// and a suggested SLO target from the feature vector and forecast output.

use crate::features::TenantFeatures;
use autopilot_core::RiskLevel;

/// Minimum checks in the trailing 30 days for a tenant to be scored.
/// Tenants below this are skipped for the cycle, not errored.
pub const MIN_CHECKS_30D: i64 = 200;

/// Days of data a shortfall must persist before the target is lowered.
const SUSTAINED_DAYS: i64 = 14;

pub const MODEL_VERSION: &str = "heuristic-ensemble-v2";

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub breach_probability: f64,
    pub confidence_score: f64,
    pub suggested_slo_target: f64,
    pub advisories: Vec<String>,
}

/// True when the tenant has enough trailing data to score this cycle.
pub fn has_sufficient_data(features: &TenantFeatures) -> bool {
    features.total_checks >= MIN_CHECKS_30D
}

/// Breach probability: clamped sum of four independent components.
pub fn breach_probability(features: &TenantFeatures, predicted_sr: f64, target: f64) -> f64 {
    let distance = ((target - predicted_sr).max(0.0) * 2.5).min(50.0);
    let volatility_risk = (features.volatility * 1.5).min(20.0);
    let density_risk = (features.alert_density * 5.0).min(15.0);
    let burn_penalty = if features.burn_rate >= 2.0 {
        15.0
    } else if features.burn_rate >= 1.5 {
        10.0
    } else {
        0.0
    };

    (distance + volatility_risk + density_risk + burn_penalty).clamp(0.0, 100.0)
}

pub fn risk_level(breach_probability: f64) -> RiskLevel {
    if breach_probability >= 60.0 {
        RiskLevel::High
    } else if breach_probability >= 30.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Confidence: 70% inverse volatility, 30% data completeness.
pub fn confidence_score(features: &TenantFeatures) -> f64 {
    let inverse_volatility = (100.0 - features.volatility * 5.0).max(0.0);
    let completeness = (features.days_with_data as f64 / 30.0).min(1.0) * 100.0;
    (0.7 * inverse_volatility + 0.3 * completeness).clamp(0.0, 100.0)
}

/// Suggested target: lowered by 5 (floor 70) under sustained high-risk
/// shortfall, raised by 5 (cap 98) when stably overperforming, else
/// unchanged.
pub fn suggest_slo_target(features: &TenantFeatures, target: f64, risk: RiskLevel) -> f64 {
    let sustained_shortfall = features.avg_sr < target - 5.0
        && features.days_with_data >= SUSTAINED_DAYS;

    if risk == RiskLevel::High && sustained_shortfall {
        (target - 5.0).max(70.0)
    } else if risk == RiskLevel::Low
        && features.avg_sr > target + 5.0
        && features.volatility < 5.0
    {
        (target + 5.0).min(98.0)
    } else {
        target
    }
}

/// Advisories from independent thresholds; several may co-occur.
pub fn advisories(features: &TenantFeatures, risk: RiskLevel) -> Vec<String> {
    let mut out = Vec::new();

    if features.trend_7d < -5.0 {
        out.push(format!(
            "Success rate declining: {:.1} points over the last 7 days",
            features.trend_7d
        ));
    }
    if features.volatility > 15.0 {
        out.push(format!(
            "High volatility ({:.1} points stddev): results are unstable day to day",
            features.volatility
        ));
    }
    if features.alert_density > 2.0 {
        out.push(format!(
            "Elevated alert density: {:.1} failing/warning checks per day",
            features.alert_density
        ));
    }
    if features.burn_rate >= 1.5 {
        out.push(format!(
            "Error budget burning at {:.1}x the sustainable pace",
            features.burn_rate
        ));
    }
    if risk == RiskLevel::High {
        out.push("High breach risk: review failing rule groups before the window closes".into());
    }
    if out.is_empty() {
        out.push("Compliance posture stable: no corrective action indicated".into());
    }
    out
}

/// Full assessment for one tenant cycle. Returns None when the tenant lacks
/// the minimum trailing sample.
pub fn assess(features: &TenantFeatures, predicted_sr: f64, target: f64) -> Option<RiskAssessment> {
    if !has_sufficient_data(features) {
        return None;
    }

    let probability = breach_probability(features, predicted_sr, target);
    let level = risk_level(probability);

    Some(RiskAssessment {
        risk_level: level,
        breach_probability: probability,
        confidence_score: confidence_score(features),
        suggested_slo_target: suggest_slo_target(features, target, level),
        advisories: advisories(features, level),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::synthetic_history;
    use chrono::{Duration, Utc};

    fn features_for(avg_sr: f64, sr_7d: f64, volatility: f64) -> TenantFeatures {
        TenantFeatures {
            avg_sr,
            sr_7d,
            volatility,
            trend_7d: 0.0,
            alert_density: 0.0,
            burn_rate: 0.0,
            days_with_data: 30,
            total_checks: 300,
        }
    }

    #[test]
    fn test_breach_components_clamped() {
        let f = TenantFeatures {
            volatility: 100.0,
            alert_density: 50.0,
            burn_rate: 5.0,
            ..features_for(10.0, 10.0, 100.0)
        };
        // 50 + 20 + 15 + 15 = 100, clamp holds.
        let p = breach_probability(&f, 0.0, 99.0);
        assert!((p - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_risk_level_cutoffs() {
        assert_eq!(risk_level(59.9), RiskLevel::Medium);
        assert_eq!(risk_level(60.0), RiskLevel::High);
        assert_eq!(risk_level(30.0), RiskLevel::Medium);
        assert_eq!(risk_level(29.9), RiskLevel::Low);
    }

    #[test]
    fn test_confidence_in_range() {
        for vol in [0.0, 5.0, 25.0, 80.0] {
            let c = confidence_score(&features_for(90.0, 90.0, vol));
            assert!((0.0..=100.0).contains(&c), "confidence={}", c);
        }
    }

    #[test]
    fn test_target_lowered_under_sustained_shortfall() {
        let f = features_for(70.0, 68.0, 10.0);
        assert_eq!(suggest_slo_target(&f, 80.0, RiskLevel::High), 75.0);
        // Floor at 70.
        assert_eq!(suggest_slo_target(&f, 72.0, RiskLevel::High), 70.0);
    }

    #[test]
    fn test_target_raised_when_overperforming() {
        let f = features_for(96.0, 96.5, 2.0);
        assert_eq!(suggest_slo_target(&f, 90.0, RiskLevel::Low), 95.0);
        // Cap at 98.
        assert_eq!(suggest_slo_target(&f, 96.0, RiskLevel::Low), 98.0);
        // Volatile tenants do not get a raise.
        let volatile = features_for(96.0, 96.5, 8.0);
        assert_eq!(suggest_slo_target(&volatile, 90.0, RiskLevel::Low), 90.0);
    }

    #[test]
    fn test_stable_advisory_when_nothing_fires() {
        let f = features_for(95.0, 95.0, 2.0);
        let advice = advisories(&f, RiskLevel::Low);
        assert_eq!(advice.len(), 1);
        assert!(advice[0].contains("stable"));
    }

    #[test]
    fn test_multiple_advisories_co_occur() {
        let f = TenantFeatures {
            trend_7d: -8.0,
            volatility: 20.0,
            alert_density: 3.0,
            burn_rate: 2.1,
            ..features_for(70.0, 65.0, 20.0)
        };
        let advice = advisories(&f, RiskLevel::High);
        assert_eq!(advice.len(), 5);
    }

    #[test]
    fn test_insufficient_data_skips() {
        let mut f = features_for(90.0, 90.0, 5.0);
        f.total_checks = 199;
        assert!(assess(&f, 90.0, 95.0).is_none());
        f.total_checks = 200;
        assert!(assess(&f, 90.0, 95.0).is_some());
    }

    // A tenant whose SR declines from 90% to 60% over 7 days against a
    // target of 80 must escalate low -> medium -> high as the decline moves
    // through the trailing window, with breach probability strictly rising.
    #[test]
    fn test_declining_tenant_escalates_low_medium_high() {
        let final_now = Utc::now();
        // 46 days of history: steady 90% through day 29, linear decline to
        // 60% over days 30..36, flat 60% afterwards.
        let history = synthetic_history(
            "t-a",
            final_now,
            46,
            |day_idx| {
                if day_idx < 30 {
                    0.90
                } else if day_idx <= 36 {
                    0.90 - 0.30 * (day_idx - 30) as f64 / 6.0
                } else {
                    0.60
                }
            },
            100,
        );

        let mut probabilities = Vec::new();
        let mut levels = Vec::new();
        // Score at the start of the decline, mid-decline, and after the
        // decline has filled the trailing 7 days.
        for days_back in [15i64, 9, 0] {
            let as_of = final_now - Duration::days(days_back);
            let features = TenantFeatures::from_history(&history, 30, 80.0, as_of);
            let assessment =
                assess(&features, features.sr_7d, 80.0).expect("above sample floor");
            probabilities.push(assessment.breach_probability);
            levels.push(assessment.risk_level);
        }

        assert!(
            probabilities[0] < probabilities[1] && probabilities[1] < probabilities[2],
            "probabilities={:?}",
            probabilities
        );
        assert_eq!(levels[0], RiskLevel::Low, "levels={:?}", levels);
        assert_eq!(levels[1], RiskLevel::Medium, "levels={:?}", levels);
        assert_eq!(levels[2], RiskLevel::High, "levels={:?}", levels);
    }
}

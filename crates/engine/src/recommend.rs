// engine/recommend.rs
// Recommendation Engine: matches weighted explainability signals against the
// playbook catalog and emits scored, deduplicated recommendations.

use autopilot_core::{
    ActionKind, ConditionOperator, ExplainabilitySignal, PlaybookCondition, PlaybookEntry,
    Recommendation, RecommendationStatus, Severity,
};
use chrono::{DateTime, Utc};

/// A tenant never holds more than this many open recommendations.
pub const MAX_OPEN_RECOMMENDATIONS: usize = 10;

/// Signals with fewer samples than this are ignored by the matcher.
pub const MIN_SIGNAL_SAMPLE: i64 = 5;

/// A mined signal joined with its feedback-derived weighting. Tenants with
/// no feedback history get the neutral defaults.
#[derive(Debug, Clone)]
pub struct WeightedSignal {
    pub signal: ExplainabilitySignal,
    pub weight: f64,
    pub confidence: f64,
}

impl WeightedSignal {
    pub fn unweighted(signal: ExplainabilitySignal) -> Self {
        Self {
            signal,
            weight: 1.0,
            confidence: 50.0,
        }
    }
}

/// The curated playbook catalog. Externally maintained in the product;
/// compiled in here.
pub fn catalog() -> Vec<PlaybookEntry> {
    vec![
        PlaybookEntry {
            code: "rule-group-triage".to_string(),
            title: "Triage dominant failing rule group".to_string(),
            condition: PlaybookCondition {
                feature: "rule_group".to_string(),
                key: None,
                metric: "fail_share".to_string(),
                operator: ConditionOperator::Gt,
                threshold: 0.4,
            },
            action: ActionKind::CreateTask,
            action_params: serde_json::json!({ "queue": "compliance-triage" }),
            severity: Severity::High,
            default_impact: 7.5,
            trusted: true,
        },
        PlaybookEntry {
            code: "rule-group-rollback".to_string(),
            title: "Roll back last policy change for failing group".to_string(),
            condition: PlaybookCondition {
                feature: "rule_group".to_string(),
                key: None,
                metric: "fail_share".to_string(),
                operator: ConditionOperator::Gt,
                threshold: 0.7,
            },
            action: ActionKind::Rollback,
            action_params: serde_json::json!({ "scope": "rule_group" }),
            severity: Severity::Critical,
            default_impact: 8.5,
            trusted: true,
        },
        PlaybookEntry {
            code: "weekday-schedule-shift".to_string(),
            title: "Shift maintenance off the weak weekday".to_string(),
            condition: PlaybookCondition {
                feature: "day_of_week".to_string(),
                key: None,
                metric: "sr_delta".to_string(),
                operator: ConditionOperator::Lt,
                threshold: -3.0,
            },
            action: ActionKind::NotifyTeam,
            action_params: serde_json::json!({ "channel": "compliance-ops" }),
            severity: Severity::Medium,
            default_impact: 4.0,
            trusted: false,
        },
        PlaybookEntry {
            code: "weekday-anomaly-review".to_string(),
            title: "Review weekday scheduling anomaly".to_string(),
            condition: PlaybookCondition {
                feature: "day_of_week".to_string(),
                key: None,
                metric: "sr_delta".to_string(),
                operator: ConditionOperator::AbsGt,
                threshold: 5.0,
            },
            action: ActionKind::CreateTask,
            action_params: serde_json::json!({ "queue": "compliance-review" }),
            severity: Severity::Medium,
            default_impact: 5.0,
            trusted: false,
        },
        PlaybookEntry {
            code: "noisy-signal-flag".to_string(),
            title: "Flag noisy signal source for tuning".to_string(),
            condition: PlaybookCondition {
                feature: "rule_group|day_of_week".to_string(),
                key: None,
                metric: "fail_share".to_string(),
                operator: ConditionOperator::Gt,
                threshold: 0.25,
            },
            action: ActionKind::UpdateFlag,
            action_params: serde_json::json!({ "flag": "signal_noise_review" }),
            severity: Severity::Low,
            default_impact: 3.0,
            trusted: false,
        },
        PlaybookEntry {
            code: "signal-digest".to_string(),
            title: "Include signal in weekly compliance digest".to_string(),
            condition: PlaybookCondition {
                feature: "rule_group|day_of_week".to_string(),
                key: None,
                metric: "sr_delta".to_string(),
                operator: ConditionOperator::In,
                threshold: 0.0,
            },
            action: ActionKind::InvokeFunction,
            action_params: serde_json::json!({ "function": "digest_append" }),
            severity: Severity::Low,
            default_impact: 1.5,
            trusted: false,
        },
    ]
}

/// Does this condition match the signal? Feature may list pipe-separated
/// alternatives; a missing key matches any key.
pub fn condition_matches(condition: &PlaybookCondition, signal: &ExplainabilitySignal) -> bool {
    let feature_matches = condition
        .feature
        .split('|')
        .any(|alt| alt == signal.feature);
    if !feature_matches {
        return false;
    }
    if let Some(key) = &condition.key {
        if key != &signal.key {
            return false;
        }
    }
    if condition.metric != signal.metric {
        return false;
    }
    match condition.operator {
        ConditionOperator::Gt => signal.value > condition.threshold,
        ConditionOperator::Lt => signal.value < condition.threshold,
        ConditionOperator::AbsGt => signal.value.abs() > condition.threshold,
        ConditionOperator::In => true,
    }
}

/// Match score: signal magnitude scaled by feedback weight, confidence, and
/// the playbook's expected impact.
pub fn score(weighted: &WeightedSignal, playbook: &PlaybookEntry) -> f64 {
    weighted.signal.value.abs() * weighted.weight * (weighted.confidence / 100.0)
        * playbook.default_impact
}

pub fn priority_for(score: f64) -> i64 {
    if score >= 6.0 {
        1
    } else if score >= 3.0 {
        2
    } else {
        3
    }
}

/// Generate new recommendations for one tenant.
///
/// `open` is the tenant's currently-open recommendations; the duplicate
/// check suppresses re-insertion for the same
/// (playbook_code, signal feature+key), and the open cap is enforced
/// against existing plus newly generated rows.
pub fn build_recommendations(
    tenant_id: &str,
    weighted_signals: &[WeightedSignal],
    playbooks: &[PlaybookEntry],
    open: &[Recommendation],
    now: DateTime<Utc>,
) -> Vec<Recommendation> {
    if open.len() >= MAX_OPEN_RECOMMENDATIONS {
        return Vec::new();
    }

    let mut generated: Vec<Recommendation> = Vec::new();

    for weighted in weighted_signals {
        if weighted.signal.sample_size < MIN_SIGNAL_SAMPLE {
            continue;
        }
        for playbook in playbooks {
            if open.len() + generated.len() >= MAX_OPEN_RECOMMENDATIONS {
                return generated;
            }
            if !condition_matches(&playbook.condition, &weighted.signal) {
                continue;
            }
            let duplicate = open
                .iter()
                .map(|r| (&r.playbook_code, &r.signal_feature, &r.signal_key))
                .chain(
                    generated
                        .iter()
                        .map(|r| (&r.playbook_code, &r.signal_feature, &r.signal_key)),
                )
                .any(|(code, feature, key)| {
                    code == &playbook.code
                        && feature == &weighted.signal.feature
                        && key == &weighted.signal.key
                });
            if duplicate {
                continue;
            }

            let match_score = score(weighted, playbook);
            generated.push(Recommendation {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: tenant_id.to_string(),
                playbook_code: playbook.code.clone(),
                signal_feature: weighted.signal.feature.clone(),
                signal_key: weighted.signal.key.clone(),
                signal_value: weighted.signal.value,
                weight: weighted.weight,
                confidence: weighted.confidence,
                expected_impact: playbook.default_impact,
                priority: priority_for(match_score),
                status: RecommendationStatus::Open,
                snooze_until: None,
                created_at: now,
                updated_at: now,
            });
        }
    }

    generated
}

// engine/remediation.rs
// Remediation Orchestrator rules: auto-trigger eligibility and the run
// state machine. The 24h recent-run guard itself lives in the store as a
// conditional insert; this module only expresses the decision logic.

use autopilot_core::{
    PlaybookEntry, Recommendation, RecommendationStatus, RemediationRun, RunStatus, Severity,
};
use chrono::{DateTime, Duration, Utc};

/// Auto-trigger thresholds.
pub const AUTO_MIN_CONFIDENCE: f64 = 80.0;
pub const AUTO_MIN_IMPACT: f64 = 6.0;

/// Rate-limit window for repeat runs of the same (tenant, playbook).
pub const RERUN_COOLDOWN_HOURS: i64 = 24;

/// Why a recommendation was not auto-triggered. Used for decision logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoTriggerVerdict {
    Eligible,
    NotOpen,
    LowConfidence,
    LowImpact,
    SeverityTooLow,
    Untrusted,
}

/// Evaluate every auto-trigger precondition except the 24h recent-run guard,
/// which must be checked transactionally at insert time.
pub fn auto_trigger_verdict(
    recommendation: &Recommendation,
    playbook: &PlaybookEntry,
) -> AutoTriggerVerdict {
    if recommendation.status != RecommendationStatus::Open {
        AutoTriggerVerdict::NotOpen
    } else if recommendation.confidence < AUTO_MIN_CONFIDENCE {
        AutoTriggerVerdict::LowConfidence
    } else if recommendation.expected_impact < AUTO_MIN_IMPACT {
        AutoTriggerVerdict::LowImpact
    } else if !matches!(playbook.severity, Severity::High | Severity::Critical) {
        AutoTriggerVerdict::SeverityTooLow
    } else if !playbook.trusted {
        AutoTriggerVerdict::Untrusted
    } else {
        AutoTriggerVerdict::Eligible
    }
}

/// Earliest start time still inside the cooldown for a run starting `now`.
pub fn cooldown_floor(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(RERUN_COOLDOWN_HOURS)
}

/// Create a run in `pending` for a recommendation.
pub fn new_run(
    recommendation: &Recommendation,
    playbook: &PlaybookEntry,
    auto_triggered: bool,
    now: DateTime<Utc>,
) -> RemediationRun {
    RemediationRun {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: recommendation.tenant_id.clone(),
        playbook_code: playbook.code.clone(),
        recommendation_id: recommendation.id.clone(),
        auto_triggered,
        parameters: playbook.action_params.clone(),
        confidence_before: recommendation.confidence,
        confidence_after: None,
        impact: None,
        status: RunStatus::Pending,
        started_at: now,
        completed_at: None,
    }
}

/// Move a pending run to executing. Returns false (and leaves the run
/// untouched) on an invalid transition.
pub fn begin_execution(run: &mut RemediationRun) -> bool {
    if !run.status.can_transition_to(RunStatus::Executing) {
        return false;
    }
    run.status = RunStatus::Executing;
    true
}

/// Terminal transition from the action handler's result.
pub fn complete(run: &mut RemediationRun, success: bool, now: DateTime<Utc>) -> bool {
    let terminal = if success {
        RunStatus::Success
    } else {
        RunStatus::Failed
    };
    if !run.status.can_transition_to(terminal) {
        return false;
    }
    run.status = terminal;
    run.completed_at = Some(now);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::catalog;

    fn open_recommendation(confidence: f64, impact: f64) -> Recommendation {
        Recommendation {
            id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            playbook_code: "rule-group-triage".to_string(),
            signal_feature: "rule_group".to_string(),
            signal_key: "net".to_string(),
            signal_value: 0.6,
            weight: 1.0,
            confidence,
            expected_impact: impact,
            priority: 1,
            status: RecommendationStatus::Open,
            snooze_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn trusted_high_playbook() -> PlaybookEntry {
        catalog()
            .into_iter()
            .find(|p| p.code == "rule-group-triage")
            .unwrap()
    }

    #[test]
    fn test_auto_trigger_requires_all_gates() {
        let playbook = trusted_high_playbook();
        assert_eq!(
            auto_trigger_verdict(&open_recommendation(85.0, 7.0), &playbook),
            AutoTriggerVerdict::Eligible
        );
        assert_eq!(
            auto_trigger_verdict(&open_recommendation(79.9, 7.0), &playbook),
            AutoTriggerVerdict::LowConfidence
        );
        assert_eq!(
            auto_trigger_verdict(&open_recommendation(85.0, 5.9), &playbook),
            AutoTriggerVerdict::LowImpact
        );

        let mut dismissed = open_recommendation(85.0, 7.0);
        dismissed.status = RecommendationStatus::Dismissed;
        assert_eq!(
            auto_trigger_verdict(&dismissed, &playbook),
            AutoTriggerVerdict::NotOpen
        );

        let mut untrusted = playbook.clone();
        untrusted.trusted = false;
        assert_eq!(
            auto_trigger_verdict(&open_recommendation(85.0, 7.0), &untrusted),
            AutoTriggerVerdict::Untrusted
        );

        let mut low_severity = playbook.clone();
        low_severity.severity = Severity::Medium;
        assert_eq!(
            auto_trigger_verdict(&open_recommendation(85.0, 7.0), &low_severity),
            AutoTriggerVerdict::SeverityTooLow
        );
    }

    #[test]
    fn test_run_lifecycle() {
        let now = Utc::now();
        let playbook = trusted_high_playbook();
        let mut run = new_run(&open_recommendation(85.0, 7.0), &playbook, true, now);
        assert_eq!(run.status, RunStatus::Pending);

        assert!(begin_execution(&mut run));
        assert_eq!(run.status, RunStatus::Executing);

        assert!(complete(&mut run, true, now));
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.completed_at.is_some());

        // Terminal states refuse further transitions.
        assert!(!begin_execution(&mut run));
        assert!(!complete(&mut run, false, now));
    }

    #[test]
    fn test_cannot_complete_before_executing() {
        let now = Utc::now();
        let playbook = trusted_high_playbook();
        let mut run = new_run(&open_recommendation(85.0, 7.0), &playbook, false, now);
        assert!(!complete(&mut run, true, now));
        assert_eq!(run.status, RunStatus::Pending);
    }
}

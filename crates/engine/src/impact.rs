// engine/impact.rs
// Impact Evaluator: before/after SR deltas for executed remediations, and
// the confidence/impact feedback they produce.

use autopilot_core::{CheckResult, Outcome, SignalWeight};
use chrono::{DateTime, Duration, Utc};

/// Hours of history compared on each side of a run.
pub const BEFORE_WINDOW_HOURS: i64 = 48;
pub const AFTER_WINDOW_HOURS: i64 = 24;

/// A run younger than this is not yet scored.
pub const MIN_RUN_AGE_HOURS: i64 = 24;

/// Minimum samples on each side for a meaningful comparison.
pub const MIN_WINDOW_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImpactOutcome {
    /// Either window was too thin; impact recorded as 0, not an error.
    Unscored,
    /// srAfter - srBefore, percentage points.
    Scored(f64),
}

impl ImpactOutcome {
    pub fn value(&self) -> f64 {
        match self {
            ImpactOutcome::Unscored => 0.0,
            ImpactOutcome::Scored(delta) => *delta,
        }
    }
}

fn pass_rate(checks: &[&CheckResult]) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    let passes = checks.iter().filter(|c| c.outcome == Outcome::Pass).count();
    passes as f64 / checks.len() as f64 * 100.0
}

/// Compare the 48h before a run against the 24h after it.
pub fn score_run(
    history: &[CheckResult],
    run_started_at: DateTime<Utc>,
) -> ImpactOutcome {
    let before_start = run_started_at - Duration::hours(BEFORE_WINDOW_HOURS);
    let after_end = run_started_at + Duration::hours(AFTER_WINDOW_HOURS);

    let before: Vec<&CheckResult> = history
        .iter()
        .filter(|c| c.ts >= before_start && c.ts < run_started_at)
        .collect();
    let after: Vec<&CheckResult> = history
        .iter()
        .filter(|c| c.ts >= run_started_at && c.ts < after_end)
        .collect();

    if before.len() < MIN_WINDOW_SAMPLES || after.len() < MIN_WINDOW_SAMPLES {
        return ImpactOutcome::Unscored;
    }

    ImpactOutcome::Scored(pass_rate(&after) - pass_rate(&before))
}

/// Whether a successful run is old enough to score.
pub fn ready_to_score(run_started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - run_started_at >= Duration::hours(MIN_RUN_AGE_HOURS)
}

/// Confidence adjustment on the originating signal weight from the measured
/// delta.
pub fn confidence_delta(delta: f64) -> f64 {
    if delta > 2.0 {
        5.0
    } else if delta > 0.0 {
        2.0
    } else if delta < -2.0 {
        -5.0
    } else {
        -1.0
    }
}

/// Apply the confidence adjustment to a signal weight row.
pub fn adjust_signal_confidence(mut row: SignalWeight, delta: f64) -> SignalWeight {
    row.confidence = (row.confidence + confidence_delta(delta)).clamp(0.0, 100.0);
    row
}

/// Nudge a playbook's default impact from the measured delta, bounded [1, 10].
pub fn nudge_playbook_impact(current_impact: f64, delta: f64) -> f64 {
    (current_impact + delta * 0.1).clamp(1.0, 10.0)
}

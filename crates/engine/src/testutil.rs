// engine/testutil.rs
// Deterministic synthetic check-result histories for tests.

use autopilot_core::{CheckResult, Outcome};
use chrono::{DateTime, Duration, Utc};

/// Build `days` days of history ending at `now`, with `checks_per_day`
/// results per day. `sr_for_day(day_idx)` returns the target success-rate
/// fraction for that day (day_idx 0 is the oldest day). Pass/fail counts are
/// rounded deterministically, no randomness.
pub fn synthetic_history(
    tenant_id: &str,
    now: DateTime<Utc>,
    days: i64,
    sr_for_day: impl Fn(i64) -> f64,
    checks_per_day: usize,
) -> Vec<CheckResult> {
    let mut out = Vec::with_capacity(days as usize * checks_per_day);
    for day_idx in 0..days {
        let day_ts = now - Duration::days(days - 1 - day_idx);
        let sr = sr_for_day(day_idx).clamp(0.0, 1.0);
        for check_idx in 0..checks_per_day {
            // Bresenham-style interleave keeps the pass/fail mix even across
            // the day, so calendar-bucket edges see the same rate.
            let passes_before = (check_idx as f64 * sr).floor();
            let passes_after = ((check_idx + 1) as f64 * sr).floor();
            let outcome = if passes_after > passes_before {
                Outcome::Pass
            } else {
                Outcome::Fail
            };
            out.push(CheckResult {
                tenant_id: tenant_id.to_string(),
                outcome,
                rule_id: format!("rule-{}", check_idx % 4),
                rule_group: format!("group-{}", check_idx % 3),
                ts: day_ts - Duration::minutes(check_idx as i64),
            });
        }
    }
    out
}

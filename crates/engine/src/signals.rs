// engine/signals.rs
// Explainability Signal Miner: extracts statistical signals from 30-day
// history, plus the human-feedback weighting loop over SignalWeight rows.

use autopilot_core::{CheckResult, ExplainabilitySignal, FeedbackKind, Outcome, SignalWeight};
use chrono::{DateTime, Datelike, Utc, Weekday};
use std::collections::BTreeMap;

/// Minimum samples behind a signal before it is written.
pub const MIN_SAMPLE: i64 = 30;

/// Minimum observations of a given weekday before its delta is computed.
const MIN_WEEKDAY_OBS: usize = 3;

/// Insight gate: strongest signal magnitude and significance.
const INSIGHT_MIN_VALUE: f64 = 0.2;
const INSIGHT_MAX_P: f64 = 0.05;

pub const FEATURE_RULE_GROUP: &str = "rule_group";
pub const FEATURE_DAY_OF_WEEK: &str = "day_of_week";
pub const METRIC_FAIL_SHARE: &str = "fail_share";
pub const METRIC_SR_DELTA: &str = "sr_delta";

/// Mine both signal families from a tenant's 30-day history.
pub fn mine(
    tenant_id: &str,
    history: &[CheckResult],
    now: DateTime<Utc>,
) -> Vec<ExplainabilitySignal> {
    let mut out = mine_rule_group_shares(tenant_id, history, now);
    out.extend(mine_weekday_deltas(tenant_id, history, now));
    out
}

/// Family 1: each rule group's share of total failures. Value is a fraction
/// in [0, 1]; sample_size is the group's check count.
pub fn mine_rule_group_shares(
    tenant_id: &str,
    history: &[CheckResult],
    now: DateTime<Utc>,
) -> Vec<ExplainabilitySignal> {
    let total_failures = history
        .iter()
        .filter(|c| c.outcome == Outcome::Fail)
        .count();
    if total_failures == 0 {
        return Vec::new();
    }

    let mut groups: BTreeMap<&str, (i64, i64)> = BTreeMap::new(); // (checks, fails)
    for check in history {
        let entry = groups.entry(check.rule_group.as_str()).or_default();
        entry.0 += 1;
        if check.outcome == Outcome::Fail {
            entry.1 += 1;
        }
    }

    groups
        .into_iter()
        .filter(|(_, (checks, _))| *checks >= MIN_SAMPLE)
        .map(|(group, (checks, fails))| ExplainabilitySignal {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            day: now,
            feature: FEATURE_RULE_GROUP.to_string(),
            key: group.to_string(),
            metric: METRIC_FAIL_SHARE.to_string(),
            value: fails as f64 / total_failures as f64,
            sample_size: checks,
            p_value: None,
        })
        .collect()
}

/// Family 2: per-weekday average SR delta vs. the 30-day overall average
/// (percentage points). Significance from a two-sided normal approximation
/// over that weekday's daily SR observations.
pub fn mine_weekday_deltas(
    tenant_id: &str,
    history: &[CheckResult],
    now: DateTime<Utc>,
) -> Vec<ExplainabilitySignal> {
    // Daily SR per calendar day.
    let mut days: BTreeMap<chrono::NaiveDate, (u32, u32)> = BTreeMap::new(); // (pass, total)
    for check in history {
        let entry = days.entry(check.ts.date_naive()).or_default();
        if check.outcome == Outcome::Pass {
            entry.0 += 1;
        }
        entry.1 += 1;
    }
    if days.is_empty() {
        return Vec::new();
    }

    let daily: Vec<(Weekday, f64)> = days
        .iter()
        .filter(|(_, (_, total))| *total > 0)
        .map(|(day, (pass, total))| (day.weekday(), *pass as f64 / *total as f64 * 100.0))
        .collect();
    let overall = daily.iter().map(|(_, sr)| sr).sum::<f64>() / daily.len() as f64;

    let mut by_weekday: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for (weekday, sr) in &daily {
        by_weekday
            .entry(weekday.num_days_from_monday())
            .or_default()
            .push(*sr);
    }

    let total_checks: i64 = days.values().map(|(_, total)| *total as i64).sum();

    by_weekday
        .into_iter()
        .filter(|(_, observations)| observations.len() >= MIN_WEEKDAY_OBS)
        .filter_map(|(weekday_idx, observations)| {
            // Sample behind this signal: checks observed on that weekday.
            let weekday = weekday_from_index(weekday_idx);
            let sample: i64 = days
                .iter()
                .filter(|(day, _)| day.weekday() == weekday)
                .map(|(_, (_, total))| *total as i64)
                .sum();
            if sample < MIN_SAMPLE || total_checks == 0 {
                return None;
            }

            let n = observations.len() as f64;
            let mean = observations.iter().sum::<f64>() / n;
            let delta = mean - overall;
            let variance = observations
                .iter()
                .map(|sr| (sr - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0).max(1.0);
            let std_err = (variance / n).sqrt();
            let p_value = if std_err > 0.0 {
                Some(two_sided_p(delta / std_err))
            } else {
                None
            };

            Some(ExplainabilitySignal {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: tenant_id.to_string(),
                day: now,
                feature: FEATURE_DAY_OF_WEEK.to_string(),
                key: weekday_name(weekday).to_string(),
                metric: METRIC_SR_DELTA.to_string(),
                value: delta,
                sample_size: sample,
                p_value,
            })
        })
        .collect()
}

fn weekday_from_index(idx: u32) -> Weekday {
    match idx {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Two-sided p-value under the standard normal, Abramowitz & Stegun 7.1.26.
fn two_sided_p(z: f64) -> f64 {
    let z = z.abs();
    let t = 1.0 / (1.0 + 0.3275911 * z / std::f64::consts::SQRT_2);
    let erf = 1.0
        - (0.254829592 * t - 0.284496736 * t.powi(2) + 1.421413741 * t.powi(3)
            - 1.453152027 * t.powi(4)
            + 1.061405429 * t.powi(5))
            * (-z * z / 2.0).exp();
    (1.0 - erf).clamp(0.0, 1.0)
}

/// The single strongest signal, if it clears the insight gate:
/// |value| >= 0.2 and (no p-value or p <= 0.05).
pub fn strongest_insight<'a>(
    signals: &'a [ExplainabilitySignal],
) -> Option<&'a ExplainabilitySignal> {
    signals
        .iter()
        .filter(|s| s.value.abs() >= INSIGHT_MIN_VALUE)
        .filter(|s| s.p_value.map_or(true, |p| p <= INSIGHT_MAX_P))
        .max_by(|a, b| a.value.abs().total_cmp(&b.value.abs()))
}

/// Bayesian-style update of a signal weight from one piece of human
/// feedback. Creates the row on first feedback.
pub fn apply_feedback(
    existing: Option<SignalWeight>,
    signal: &ExplainabilitySignal,
    kind: FeedbackKind,
) -> SignalWeight {
    let mut row = existing.unwrap_or(SignalWeight {
        tenant_id: signal.tenant_id.clone(),
        feature: signal.feature.clone(),
        key: signal.key.clone(),
        metric: signal.metric.clone(),
        weight: 1.0,
        confidence: 50.0,
        sample: 0,
    });

    let delta = match kind {
        FeedbackKind::Useful => 1.0,
        FeedbackKind::NotUseful => -1.0,
        FeedbackKind::Irrelevant => -0.5,
    };
    let learning_rate = 0.2 / ((row.sample + 1) as f64).sqrt();

    row.weight = (row.weight + delta * learning_rate).clamp(0.5, 2.0);
    row.sample += 1;
    row.confidence = (50.0 + row.sample as f64 * 2.0).clamp(0.0, 100.0);
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn check(tenant: &str, group: &str, outcome: Outcome, ts: DateTime<Utc>) -> CheckResult {
        CheckResult {
            tenant_id: tenant.to_string(),
            outcome,
            rule_id: format!("{}-rule", group),
            rule_group: group.to_string(),
            ts,
        }
    }

    fn sig(feature: &str, key: &str, value: f64, p: Option<f64>) -> ExplainabilitySignal {
        ExplainabilitySignal {
            id: "s".to_string(),
            tenant_id: "t1".to_string(),
            day: Utc::now(),
            feature: feature.to_string(),
            key: key.to_string(),
            metric: METRIC_FAIL_SHARE.to_string(),
            value,
            sample_size: 100,
            p_value: p,
        }
    }

    #[test]
    fn test_rule_group_fail_shares() {
        let now = Utc::now();
        let mut history = Vec::new();
        // Group "net": 40 checks, 30 fails. Group "iam": 40 checks, 10 fails.
        for i in 0..40 {
            let ts = now - Duration::hours(i);
            history.push(check(
                "t1",
                "net",
                if i < 30 { Outcome::Fail } else { Outcome::Pass },
                ts,
            ));
            history.push(check(
                "t1",
                "iam",
                if i < 10 { Outcome::Fail } else { Outcome::Pass },
                ts,
            ));
        }
        let signals = mine_rule_group_shares("t1", &history, now);
        assert_eq!(signals.len(), 2);
        let net = signals.iter().find(|s| s.key == "net").unwrap();
        assert!((net.value - 0.75).abs() < 1e-9);
        assert_eq!(net.sample_size, 40);
    }

    #[test]
    fn test_small_groups_not_written() {
        let now = Utc::now();
        // 29 checks in the group: below the floor even though all fail.
        let history: Vec<_> = (0..29)
            .map(|i| check("t1", "tiny", Outcome::Fail, now - Duration::hours(i)))
            .collect();
        assert!(mine_rule_group_shares("t1", &history, now).is_empty());
    }

    #[test]
    fn test_no_failures_no_share_signals() {
        let now = Utc::now();
        let history: Vec<_> = (0..50)
            .map(|i| check("t1", "net", Outcome::Pass, now - Duration::hours(i)))
            .collect();
        assert!(mine_rule_group_shares("t1", &history, now).is_empty());
    }

    #[test]
    fn test_weekday_delta_flags_bad_monday() {
        // Fixed noon anchor keeps every check inside its intended day.
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2026, 8, 12, 12, 0, 0).unwrap();
        let mut history = Vec::new();
        // 28 days, 12 checks per day: Mondays near 50% SR (varying a little
        // week to week so the weekday variance is nonzero), others at 100%.
        for day in 0..28i64 {
            let ts = now - Duration::days(day);
            let is_monday = ts.weekday() == Weekday::Mon;
            let monday_fails = if (day / 7) % 2 == 0 { 6 } else { 5 };
            for i in 0..12 {
                let outcome = if is_monday && i < monday_fails {
                    Outcome::Fail
                } else {
                    Outcome::Pass
                };
                history.push(check("t1", "net", outcome, ts - Duration::minutes(i)));
            }
        }
        let signals = mine_weekday_deltas("t1", &history, now);
        let monday = signals
            .iter()
            .find(|s| s.key == "monday")
            .expect("monday signal");
        assert!(monday.value < -20.0, "delta={}", monday.value);
        assert!(monday.p_value.is_some());
        // Non-monday weekdays sit slightly above the overall average.
        let tuesday = signals.iter().find(|s| s.key == "tuesday").unwrap();
        assert!(tuesday.value > 0.0);
    }

    #[test]
    fn test_insight_gate() {
        // Significant and strong: emitted.
        let strong = sig(FEATURE_RULE_GROUP, "net", 0.6, None);
        let weak = sig(FEATURE_RULE_GROUP, "iam", 0.1, None);
        let insignificant = sig(FEATURE_DAY_OF_WEEK, "monday", -4.0, Some(0.2));
        let signals = vec![weak.clone(), strong.clone(), insignificant.clone()];
        let insight = strongest_insight(&signals).unwrap();
        assert_eq!(insight.key, "net");

        // Only sub-threshold or insignificant signals: nothing emitted.
        assert!(strongest_insight(&[weak]).is_none());
        assert!(strongest_insight(&[insignificant]).is_none());
    }

    #[test]
    fn test_feedback_creates_then_updates() {
        let signal = sig(FEATURE_RULE_GROUP, "net", 0.6, None);
        let first = apply_feedback(None, &signal, FeedbackKind::Useful);
        assert_eq!(first.sample, 1);
        assert!((first.weight - 1.2).abs() < 1e-9); // 1.0 + 1.0 * 0.2/sqrt(1)
        assert!((first.confidence - 52.0).abs() < 1e-9);

        let second = apply_feedback(Some(first), &signal, FeedbackKind::NotUseful);
        assert_eq!(second.sample, 2);
        assert!(second.weight < 1.2);
        assert!((second.confidence - 54.0).abs() < 1e-9);
    }

    #[test]
    fn test_feedback_learning_rate_decays_and_clamps() {
        let signal = sig(FEATURE_RULE_GROUP, "net", 0.6, None);
        let mut row: Option<SignalWeight> = None;
        for _ in 0..200 {
            row = Some(apply_feedback(row, &signal, FeedbackKind::Useful));
        }
        let row = row.unwrap();
        assert!(row.weight <= 2.0);
        assert!((row.confidence - 100.0).abs() < 1e-9);
        assert_eq!(row.sample, 200);

        let mut row: Option<SignalWeight> = None;
        for _ in 0..200 {
            row = Some(apply_feedback(row, &signal, FeedbackKind::Irrelevant));
        }
        assert!(row.unwrap().weight >= 0.5);
    }

    #[test]
    fn test_two_sided_p_sanity() {
        assert!(two_sided_p(0.0) > 0.9);
        assert!(two_sided_p(1.96) < 0.06);
        assert!(two_sided_p(4.0) < 0.001);
    }
}

// engine/features.rs
// Feature Aggregator: turns a rolling window of check results into the
// per-tenant numeric features every downstream stage consumes.

use autopilot_core::{CheckResult, Outcome};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Per-day bucket of check outcomes.
#[derive(Debug, Clone, Copy, Default)]
struct DayBucket {
    pass: u32,
    fail: u32,
    warn: u32,
}

impl DayBucket {
    fn total(&self) -> u32 {
        self.pass + self.fail + self.warn
    }

    fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.pass as f64 / total as f64 * 100.0
        }
    }

    fn alerts(&self) -> u32 {
        self.fail + self.warn
    }
}

/// Rolling-window feature vector for one tenant.
#[derive(Debug, Clone, Copy)]
pub struct TenantFeatures {
    /// Average SR over the full window (percent).
    pub avg_sr: f64,
    /// Average SR over the trailing 7 days (percent).
    pub sr_7d: f64,
    /// Standard deviation of daily SR (percentage points).
    pub volatility: f64,
    /// Trailing-7-day average minus the prior-7-day average.
    pub trend_7d: f64,
    /// (fail + warn) per day over the window.
    pub alert_density: f64,
    /// Error-budget consumption vs. allotted pace over the trailing 7 days.
    /// >= 1.0 means burning faster than sustainable for the current target.
    pub burn_rate: f64,
    /// Days in the window with at least one check.
    pub days_with_data: i64,
    /// Total checks observed in the window.
    pub total_checks: i64,
}

impl TenantFeatures {
    /// Aggregate `history` over `[now - window_days, now]` against the
    /// tenant's current SLO target. History outside the window is ignored.
    pub fn from_history(
        history: &[CheckResult],
        window_days: i64,
        slo_target: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let window_start = now - Duration::days(window_days);
        let mut buckets: BTreeMap<NaiveDate, DayBucket> = BTreeMap::new();
        let mut total_checks = 0i64;

        for check in history {
            if check.ts < window_start || check.ts > now {
                continue;
            }
            total_checks += 1;
            let bucket = buckets.entry(check.ts.date_naive()).or_default();
            match check.outcome {
                Outcome::Pass => bucket.pass += 1,
                Outcome::Fail => bucket.fail += 1,
                Outcome::Warn => bucket.warn += 1,
            }
        }

        let days_with_data = buckets.len() as i64;
        if days_with_data == 0 {
            return Self {
                avg_sr: 0.0,
                sr_7d: 0.0,
                volatility: 0.0,
                trend_7d: 0.0,
                alert_density: 0.0,
                burn_rate: 0.0,
                days_with_data: 0,
                total_checks: 0,
            };
        }

        let daily_sr: Vec<f64> = buckets.values().map(|b| b.success_rate()).collect();
        let avg_sr = mean(&daily_sr);
        let volatility = stddev(&daily_sr, avg_sr);

        let seven_days_ago = (now - Duration::days(7)).date_naive();
        let fourteen_days_ago = (now - Duration::days(14)).date_naive();

        let last7: Vec<f64> = buckets
            .iter()
            .filter(|(day, _)| **day >= seven_days_ago)
            .map(|(_, b)| b.success_rate())
            .collect();
        let prior7: Vec<f64> = buckets
            .iter()
            .filter(|(day, _)| **day >= fourteen_days_ago && **day < seven_days_ago)
            .map(|(_, b)| b.success_rate())
            .collect();

        let sr_7d = if last7.is_empty() { avg_sr } else { mean(&last7) };
        let trend_7d = if last7.is_empty() || prior7.is_empty() {
            0.0
        } else {
            mean(&last7) - mean(&prior7)
        };

        let total_alerts: u32 = buckets.values().map(|b| b.alerts()).sum();
        let alert_density = total_alerts as f64 / days_with_data as f64;

        // Burn rate: observed error rate over the trailing 7 days relative
        // to the error budget the target allows.
        let budget = (100.0 - slo_target).max(0.1);
        let burn_rate = ((100.0 - sr_7d) / budget).max(0.0);

        Self {
            avg_sr,
            sr_7d,
            volatility,
            trend_7d,
            alert_density,
            burn_rate,
            days_with_data,
            total_checks,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::synthetic_history;

    #[test]
    fn test_empty_history() {
        let f = TenantFeatures::from_history(&[], 30, 95.0, Utc::now());
        assert_eq!(f.days_with_data, 0);
        assert_eq!(f.total_checks, 0);
        assert_eq!(f.avg_sr, 0.0);
    }

    #[test]
    fn test_steady_history_has_low_volatility() {
        let now = Utc::now();
        let history = synthetic_history("t1", now, 30, |_| 0.90, 10);
        let f = TenantFeatures::from_history(&history, 30, 95.0, now);
        assert_eq!(f.days_with_data, 30);
        assert!(f.avg_sr > 80.0 && f.avg_sr <= 100.0);
        assert!(f.volatility < 15.0, "volatility={}", f.volatility);
    }

    #[test]
    fn test_declining_history_has_negative_trend() {
        let now = Utc::now();
        // 90% SR for the first 23 days, dropping linearly to 60% over the
        // last 7 days.
        let history = synthetic_history(
            "t1",
            now,
            30,
            |day_idx| {
                if day_idx < 23 {
                    0.90
                } else {
                    0.90 - 0.30 * ((day_idx - 23) as f64 / 6.0)
                }
            },
            10,
        );
        let f = TenantFeatures::from_history(&history, 30, 80.0, now);
        assert!(f.trend_7d < -5.0, "trend={}", f.trend_7d);
        assert!(f.sr_7d < f.avg_sr);
        assert!(f.burn_rate > 1.0, "burn={}", f.burn_rate);
    }

    #[test]
    fn test_window_filtering() {
        let now = Utc::now();
        let mut history = synthetic_history("t1", now, 30, |_| 0.90, 5);
        // Stale rows outside the window must be ignored.
        let stale = CheckResult {
            tenant_id: "t1".to_string(),
            outcome: Outcome::Fail,
            rule_id: "r-old".to_string(),
            rule_group: "legacy".to_string(),
            ts: now - Duration::days(60),
        };
        for _ in 0..50 {
            history.push(stale.clone());
        }
        let f = TenantFeatures::from_history(&history, 30, 95.0, now);
        assert_eq!(f.total_checks, 150);
    }
}

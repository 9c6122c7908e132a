// End-to-end job-runner tests against an in-memory store.

use autopilot_core::{
    CheckResult, EngineError, EnsembleWeights, ForecastModelMetrics, ForecastPrediction, Outcome,
    RecommendationStatus, RiskLevel, RunStatus, TenantSettings, TrainingStatus,
};
use autopilot_engine::testutil::synthetic_history;
use autopilot_server::{jobs, AppState, Database, SharedState};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn test_state() -> SharedState {
    Arc::new(AppState::new(Database::open_in_memory().unwrap()))
}

fn seed_tenant(state: &SharedState, tenant_id: &str, days: i64, sr: f64, per_day: usize) {
    let settings = TenantSettings::with_defaults(tenant_id);
    state.db.upsert_tenant(&settings).unwrap();
    let history = synthetic_history(tenant_id, Utc::now(), days, |_| sr, per_day);
    state.db.insert_check_results(&history).unwrap();
}

fn metrics_row(tenant_id: &str, reliability: f64, mae: f64, bias: f64) -> ForecastModelMetrics {
    ForecastModelMetrics {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        precision: 70.0,
        recall: 70.0,
        mae,
        bias,
        reliability,
        sample_size: 15,
        computed_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_forecast_then_risk_produces_prediction() {
    let state = test_state();
    seed_tenant(&state, "t1", 30, 0.92, 10);

    let summary = jobs::run_forecast(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);

    let ensemble = state.db.latest_ensemble_forecast("t1").unwrap().unwrap();
    assert!(ensemble.ci_lower <= ensemble.blended_sr);
    assert!(ensemble.blended_sr <= ensemble.ci_upper);

    let summary = jobs::run_risk(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);

    let prediction = state.db.latest_prediction("t1").unwrap().unwrap();
    assert_eq!(prediction.model_version, "heuristic-ensemble-v2");
    assert!(!prediction.applied);
    assert!(!prediction.advisories.is_empty());
    // A steady 92% tenant against a 95 target carries some breach risk but
    // stays in bounds.
    assert!((0.0..=100.0).contains(&prediction.breach_probability_7d));
}

#[tokio::test]
async fn test_thin_tenants_are_skipped_not_failed() {
    let state = test_state();
    seed_tenant(&state, "thick", 30, 0.95, 10); // 300 checks
    seed_tenant(&state, "thin", 5, 0.95, 5); // 25 checks, below the floor

    let summary = jobs::run_forecast(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(state.db.latest_ensemble_forecast("thin").unwrap().is_none());
}

#[tokio::test]
async fn test_forecast_blends_from_quarter_history_not_last_week() {
    let state = test_state();
    state
        .db
        .upsert_tenant(&TenantSettings::with_defaults("t1"))
        .unwrap();
    // 90 days: a bad first two months around 50% SR, then a recovery to 90%.
    // The blend must reflect the whole quarter, not just the recent week.
    let history = synthetic_history(
        "t1",
        Utc::now(),
        90,
        |day| if day < 60 { 0.5 } else { 0.9 },
        10,
    );
    state.db.insert_check_results(&history).unwrap();

    let summary = jobs::run_forecast(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);

    let ensemble = state.db.latest_ensemble_forecast("t1").unwrap().unwrap();
    // Quarter average is about 63%; anchoring on the recent week alone would
    // put the blend near 90.
    assert!(
        ensemble.blended_sr < 75.0,
        "blended_sr={}",
        ensemble.blended_sr
    );
    assert!(ensemble.blended_sr > 50.0);
}

#[tokio::test]
async fn test_scoped_job_touches_only_named_tenant() {
    let state = test_state();
    seed_tenant(&state, "t1", 30, 0.92, 10);
    seed_tenant(&state, "t2", 30, 0.92, 10);

    let summary = jobs::run_forecast(Arc::clone(&state), Some("t1".to_string()))
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 0);
    assert!(state.db.latest_ensemble_forecast("t1").unwrap().is_some());
    assert!(state.db.latest_ensemble_forecast("t2").unwrap().is_none());

    let err = jobs::run_forecast(Arc::clone(&state), Some("ghost".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_mine_signals_records_strongest_insight() {
    let state = test_state();
    let now = Utc::now();
    state
        .db
        .upsert_tenant(&TenantSettings::with_defaults("t1"))
        .unwrap();

    // Group "net" owns three quarters of all failures; "iam" is mostly fine.
    let mut checks = Vec::new();
    for i in 0..40i64 {
        let ts = now - Duration::hours(i);
        checks.push(CheckResult {
            tenant_id: "t1".to_string(),
            outcome: if i < 30 { Outcome::Fail } else { Outcome::Pass },
            rule_id: "net-rule".to_string(),
            rule_group: "net".to_string(),
            ts,
        });
        checks.push(CheckResult {
            tenant_id: "t1".to_string(),
            outcome: if i < 10 { Outcome::Fail } else { Outcome::Pass },
            rule_id: "iam-rule".to_string(),
            rule_group: "iam".to_string(),
            ts,
        });
    }
    state.db.insert_check_results(&checks).unwrap();

    let summary = jobs::run_mine_signals(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);

    let insights = state.db.insights_for_tenant("t1").unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].feature, "rule_group");
    assert_eq!(insights[0].key, "net");
    assert!((insights[0].value - 0.75).abs() < 1e-9);
    let signals = state.db.latest_signals("t1").unwrap();
    assert!(signals.iter().any(|s| s.id == insights[0].signal_id));

    // A rerun mines a fresh batch and records at most one more insight.
    jobs::run_mine_signals(Arc::clone(&state), None).await.unwrap();
    assert_eq!(state.db.insights_for_tenant("t1").unwrap().len(), 2);
}

#[tokio::test]
async fn test_accuracy_evaluation_writes_record_and_metrics() {
    let state = test_state();
    let now = Utc::now();
    seed_tenant(&state, "t1", 30, 0.90, 10);

    // A forecast generated 8 days ago whose horizon is fully observed.
    let prediction = ForecastPrediction {
        id: "f-due".to_string(),
        tenant_id: "t1".to_string(),
        risk_level: RiskLevel::Low,
        breach_probability_7d: 20.0,
        confidence_score: 80.0,
        predicted_sr_7d: 91.0,
        volatility_index: 2.0,
        current_slo_target: 95.0,
        suggested_slo_target: 95.0,
        advisories: vec![],
        model_version: "heuristic-ensemble-v2".to_string(),
        applied: false,
        generated_at: now - Duration::days(8),
    };
    state.db.insert_prediction(&prediction).unwrap();

    let summary = jobs::run_evaluate_accuracy(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);

    let records = state
        .db
        .accuracy_records_since("t1", now - Duration::days(30))
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].forecast_id, "f-due");
    // 90% realized against a 95 target: both sides call it a breach.
    assert!(records[0].predicted_breach);
    assert!(records[0].actual_breach);
    assert!((records[0].actual_sr - 90.0).abs() < 3.0);

    let metrics = state.db.latest_model_metrics("t1").unwrap().unwrap();
    assert_eq!(metrics.sample_size, 1);

    // A second pass finds nothing left to evaluate.
    let summary = jobs::run_evaluate_accuracy(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn test_tune_weights_commits_bounded_history_and_slo_once() {
    let state = test_state();
    let now = Utc::now();
    let mut settings = TenantSettings::with_defaults("t1");
    settings.self_tuning_enabled = true;
    settings.slo_target = 95.0;
    state.db.upsert_tenant(&settings).unwrap();
    state
        .db
        .insert_model_metrics(&metrics_row("t1", 40.0, 6.0, 0.0))
        .unwrap();

    let prediction = ForecastPrediction {
        id: "f1".to_string(),
        tenant_id: "t1".to_string(),
        risk_level: RiskLevel::High,
        breach_probability_7d: 70.0,
        confidence_score: 90.0,
        predicted_sr_7d: 85.0,
        volatility_index: 4.0,
        current_slo_target: 95.0,
        suggested_slo_target: 90.0,
        advisories: vec![],
        model_version: "heuristic-ensemble-v2".to_string(),
        applied: false,
        generated_at: now,
    };
    state.db.insert_prediction(&prediction).unwrap();

    let summary = jobs::run_tune_weights(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);

    // Unreliable, high-error model: weight shifted off the trend model.
    let weights = state.db.latest_weights("t1").unwrap();
    assert!(weights.is_valid());
    assert!(weights.trend < EnsembleWeights::default().trend);

    // SLO adjustment committed once and bound to the forecast.
    let adjustments = state.db.slo_adjustments("t1").unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].new_target, 90.0);
    assert_eq!(adjustments[0].forecast_id, "f1");
    assert_eq!(state.db.get_tenant("t1").unwrap().unwrap().slo_target, 90.0);
    assert!(state.db.latest_prediction("t1").unwrap().unwrap().applied);

    // Re-running tunes weights again but never re-applies the forecast.
    jobs::run_tune_weights(Arc::clone(&state), None).await.unwrap();
    assert_eq!(state.db.slo_adjustments("t1").unwrap().len(), 1);
}

#[tokio::test]
async fn test_recommend_then_auto_remediate_applies_once() {
    let state = test_state();
    let now = Utc::now();
    state
        .db
        .upsert_tenant(&TenantSettings::with_defaults("t1"))
        .unwrap();

    // One dominant failing rule group, pre-weighted by feedback so the
    // recommendation clears the auto-trigger confidence gate.
    state
        .db
        .insert_signals(&[autopilot_core::ExplainabilitySignal {
            id: "s1".to_string(),
            tenant_id: "t1".to_string(),
            day: now,
            feature: "rule_group".to_string(),
            key: "net".to_string(),
            metric: "fail_share".to_string(),
            value: 0.6,
            sample_size: 40,
            p_value: None,
        }])
        .unwrap();
    state
        .db
        .upsert_signal_weight(&autopilot_core::SignalWeight {
            tenant_id: "t1".to_string(),
            feature: "rule_group".to_string(),
            key: "net".to_string(),
            metric: "fail_share".to_string(),
            weight: 1.2,
            confidence: 85.0,
            sample: 20,
        })
        .unwrap();

    let summary = jobs::run_recommend(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);
    let open = state
        .db
        .recommendations_by_status("t1", RecommendationStatus::Open)
        .unwrap();
    assert!(!open.is_empty());
    let triage = open
        .iter()
        .find(|r| r.playbook_code == "rule-group-triage")
        .expect("triage recommendation");
    assert_eq!(triage.confidence, 85.0);

    let summary = jobs::run_auto_remediate(Arc::clone(&state), None).await.unwrap();
    assert_eq!(summary.processed, 1);

    let runs = state.db.runs_for_tenant("t1").unwrap();
    let triage_runs: Vec<_> = runs
        .iter()
        .filter(|r| r.playbook_code == "rule-group-triage")
        .collect();
    assert_eq!(triage_runs.len(), 1);
    assert!(triage_runs[0].auto_triggered);
    assert_eq!(triage_runs[0].status, RunStatus::Success);
    assert_eq!(
        state
            .db
            .get_recommendation(&triage.id)
            .unwrap()
            .unwrap()
            .status,
        RecommendationStatus::Applied
    );
    assert!(state.db.audit_count(&triage.id).unwrap() >= 1);

    // Second scan: the recommendation is no longer open, so nothing fires.
    jobs::run_auto_remediate(Arc::clone(&state), None).await.unwrap();
    let runs_after: Vec<_> = state
        .db
        .runs_for_tenant("t1")
        .unwrap()
        .into_iter()
        .filter(|r| r.playbook_code == "rule-group-triage")
        .collect();
    assert_eq!(runs_after.len(), 1);

    // Even force-reopened, the 24h cooldown suppresses a repeat run.
    state
        .db
        .update_recommendation_status(&triage.id, RecommendationStatus::Open, None, now)
        .unwrap();
    jobs::run_auto_remediate(Arc::clone(&state), None).await.unwrap();
    let runs_after: Vec<_> = state
        .db
        .runs_for_tenant("t1")
        .unwrap()
        .into_iter()
        .filter(|r| r.playbook_code == "rule-group-triage")
        .collect();
    assert_eq!(runs_after.len(), 1);
}

#[tokio::test]
async fn test_on_disk_database_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("autopilot.db");

    {
        let state = Arc::new(AppState::new(Database::open(&path).unwrap()));
        seed_tenant(&state, "t1", 30, 0.92, 10);
        jobs::run_forecast(Arc::clone(&state), None).await.unwrap();
        jobs::run_risk(Arc::clone(&state), None).await.unwrap();
    }

    let reopened = Database::open(&path).unwrap();
    assert_eq!(reopened.list_tenants().unwrap().len(), 1);
    assert!(reopened.latest_prediction("t1").unwrap().is_some());
}

#[tokio::test]
async fn test_plan_retraining_and_train_round_trip() {
    let state = test_state();
    for tenant_id in ["t1", "t2", "t3"] {
        let mut settings = TenantSettings::with_defaults(tenant_id);
        settings.self_tuning_enabled = true;
        settings.canary_opt_in = true;
        state.db.upsert_tenant(&settings).unwrap();
        state
            .db
            .insert_model_metrics(&metrics_row(tenant_id, 55.0, 7.0, 3.0))
            .unwrap();
    }

    let plan = jobs::run_plan_retraining(Arc::clone(&state), None).await.unwrap();
    assert!(plan.planned);
    assert!(plan.canary_tenants >= 1);
    let experiment_id = plan.experiment_id.clone().unwrap();

    // A second planning pass is a no-op while the experiment runs.
    let replan = jobs::run_plan_retraining(Arc::clone(&state), None).await.unwrap();
    assert!(!replan.planned);

    let train = jobs::run_train(Arc::clone(&state), None).await.unwrap();
    assert_eq!(train.executed, 1);
    assert_eq!(train.succeeded, 1);

    let job = state
        .db
        .get_training_job(&plan.job_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(job.status, TrainingStatus::Succeeded);
    assert!(job.metrics_after.is_some());
    assert!(job.logs.contains("tenant"));

    // Experiment ended; canary tenants carry the rolled-out weights.
    let assignments = state
        .db
        .assignments_for_experiment(&experiment_id)
        .unwrap();
    assert_eq!(assignments.len(), plan.canary_tenants);
    for assignment in &assignments {
        let weights = state.db.latest_weights(&assignment.tenant_id).unwrap();
        assert!(weights.is_valid());
    }
    assert!(state
        .db
        .active_experiment("sr-ensemble")
        .unwrap()
        .is_none());

    // With the experiment ended and metrics still degraded, planning may
    // fire again.
    let plan_again = jobs::run_plan_retraining(Arc::clone(&state), None).await.unwrap();
    assert!(plan_again.planned);
}

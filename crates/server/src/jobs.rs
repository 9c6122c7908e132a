// Pipeline job runners, one per stage. Each job iterates every tenant with
// bounded concurrency; a tenant that fails is counted and logged without
// aborting the rest of the scan.

use crate::executor;
use crate::state::{AppState, SharedState};
use autopilot_core::{
    CheckResult, EngineError, EngineResult, ForecastPrediction, InsightRecord, Outcome,
    PlaybookEntry, RecommendationStatus, TrainingStatus, WeightHistoryEntry,
};
use autopilot_engine::{
    accuracy, controller, forecast, impact, recommend, remediation, retrain, risk, signals,
    NudgePolicy, TenantFeatures, WeightedSignal,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Tenants processed in parallel per job.
const MAX_CONCURRENT_TENANTS: usize = 4;

/// Feature/history window in days for the risk scorer and the miners.
const WINDOW_DAYS: i64 = 30;

/// History window in days feeding the ensemble forecaster.
const FORECAST_WINDOW_DAYS: i64 = 90;

/// Outcome of one tenant's cycle within a job.
pub enum TenantOutcome {
    Processed,
    /// Below a data floor or feature-flagged off. Not an error.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct JobSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

fn store_err(e: rusqlite::Error) -> EngineError {
    EngineError::Store(e.to_string())
}

/// Resolve a job's tenant set: every tenant, or just the scoped one.
fn tenants_in_scope(
    state: &AppState,
    scope: Option<&str>,
) -> EngineResult<Vec<autopilot_core::TenantSettings>> {
    match scope {
        Some(tenant_id) => {
            let tenant = state
                .db
                .get_tenant(tenant_id)
                .map_err(store_err)?
                .ok_or_else(|| EngineError::NotFound(format!("tenant {}", tenant_id)))?;
            Ok(vec![tenant])
        }
        None => state.db.list_tenants().map_err(store_err),
    }
}

/// Drive a per-tenant stage function over every tenant in scope. Per-tenant
/// failures are isolated: logged, counted, and the scan continues.
async fn run_over_tenants(
    state: SharedState,
    job: &'static str,
    scope: Option<String>,
    per_tenant: fn(&AppState, &autopilot_core::TenantSettings, DateTime<Utc>) -> EngineResult<TenantOutcome>,
) -> EngineResult<JobSummary> {
    let tenants = tenants_in_scope(&state, scope.as_deref())?;
    let now = Utc::now();
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TENANTS));
    let mut tasks = JoinSet::new();

    for tenant in tenants {
        let state = Arc::clone(&state);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let lock = state.tenant_lock(&tenant.tenant_id).await;
            let _guard = lock.lock().await;
            let result = per_tenant(&state, &tenant, now);
            (tenant.tenant_id, result)
        });
    }

    let mut summary = JobSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(TenantOutcome::Processed))) => summary.processed += 1,
            Ok((_, Ok(TenantOutcome::Skipped))) => summary.skipped += 1,
            Ok((tenant_id, Err(e))) => {
                tracing::warn!(job, tenant = %tenant_id, error = %e, "tenant cycle failed");
                summary.failed += 1;
                summary.errors.push(format!("{}: {}", tenant_id, e));
            }
            Err(e) => {
                summary.failed += 1;
                summary.errors.push(format!("task panicked: {}", e));
            }
        }
    }

    tracing::info!(
        job,
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        "job finished"
    );
    Ok(summary)
}

fn history_30d(
    state: &AppState,
    tenant_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<Vec<CheckResult>> {
    state
        .db
        .check_history(tenant_id, now - Duration::days(WINDOW_DAYS))
        .map_err(store_err)
}

/// Playbook catalog with persisted impact nudges applied.
pub fn effective_catalog(state: &AppState) -> EngineResult<Vec<PlaybookEntry>> {
    let mut playbooks = recommend::catalog();
    for playbook in &mut playbooks {
        if let Some(impact) = state
            .db
            .playbook_impact_override(&playbook.code)
            .map_err(store_err)?
        {
            playbook.default_impact = impact;
        }
    }
    Ok(playbooks)
}

// ============================================================================
// Forecast & risk
// ============================================================================

fn forecast_tenant(
    state: &AppState,
    tenant: &autopilot_core::TenantSettings,
    now: DateTime<Utc>,
) -> EngineResult<TenantOutcome> {
    let history = state
        .db
        .check_history(&tenant.tenant_id, now - Duration::days(FORECAST_WINDOW_DAYS))
        .map_err(store_err)?;
    // The data floor is judged on the trailing 30 days so a tenant with only
    // stale history does not qualify on volume alone.
    let recent = TenantFeatures::from_history(&history, WINDOW_DAYS, tenant.slo_target, now);
    if !risk::has_sufficient_data(&recent) {
        return Ok(TenantOutcome::Skipped);
    }
    let observed =
        TenantFeatures::from_history(&history, FORECAST_WINDOW_DAYS, tenant.slo_target, now);

    let weights = state.db.latest_weights(&tenant.tenant_id).map_err(store_err)?;
    let reliability = state
        .db
        .latest_model_metrics(&tenant.tenant_id)
        .map_err(store_err)?
        .map(|m| m.reliability)
        .unwrap_or(forecast::DEFAULT_RELIABILITY);

    let ensemble = forecast::generate(
        &tenant.tenant_id,
        observed.avg_sr,
        weights,
        reliability,
        now,
        &mut rand::thread_rng(),
    );
    state.db.insert_ensemble_forecast(&ensemble).map_err(store_err)?;
    Ok(TenantOutcome::Processed)
}

pub async fn run_forecast(state: SharedState, scope: Option<String>) -> EngineResult<JobSummary> {
    run_over_tenants(state, "forecast", scope, forecast_tenant).await
}

fn risk_tenant(
    state: &AppState,
    tenant: &autopilot_core::TenantSettings,
    now: DateTime<Utc>,
) -> EngineResult<TenantOutcome> {
    let Some(ensemble) = state
        .db
        .latest_ensemble_forecast(&tenant.tenant_id)
        .map_err(store_err)?
    else {
        return Ok(TenantOutcome::Skipped);
    };

    let history = history_30d(state, &tenant.tenant_id, now)?;
    let features = TenantFeatures::from_history(&history, WINDOW_DAYS, tenant.slo_target, now);
    let Some(assessment) = risk::assess(&features, ensemble.blended_sr, tenant.slo_target) else {
        return Ok(TenantOutcome::Skipped);
    };

    let prediction = ForecastPrediction {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant.tenant_id.clone(),
        risk_level: assessment.risk_level,
        breach_probability_7d: assessment.breach_probability,
        confidence_score: assessment.confidence_score,
        predicted_sr_7d: ensemble.blended_sr,
        volatility_index: features.volatility,
        current_slo_target: tenant.slo_target,
        suggested_slo_target: assessment.suggested_slo_target,
        advisories: assessment.advisories,
        model_version: risk::MODEL_VERSION.to_string(),
        applied: false,
        generated_at: now,
    };
    state.db.insert_prediction(&prediction).map_err(store_err)?;
    Ok(TenantOutcome::Processed)
}

pub async fn run_risk(state: SharedState, scope: Option<String>) -> EngineResult<JobSummary> {
    run_over_tenants(state, "risk", scope, risk_tenant).await
}

// ============================================================================
// Accuracy & weight tuning
// ============================================================================

fn evaluate_accuracy_tenant(
    state: &AppState,
    tenant: &autopilot_core::TenantSettings,
    now: DateTime<Utc>,
) -> EngineResult<TenantOutcome> {
    let (window_start, window_end) = accuracy::eligibility_window(now);
    let due = state
        .db
        .predictions_awaiting_evaluation(&tenant.tenant_id, window_start, window_end)
        .map_err(store_err)?;
    if due.is_empty() {
        return Ok(TenantOutcome::Skipped);
    }

    // One history fetch covers every due forecast's horizon window.
    let history = state
        .db
        .check_history(&tenant.tenant_id, window_start)
        .map_err(store_err)?;

    for prediction in &due {
        let horizon_end = prediction.generated_at + Duration::days(accuracy::HORIZON_DAYS);
        let window: Vec<&CheckResult> = history
            .iter()
            .filter(|c| c.ts >= prediction.generated_at && c.ts < horizon_end)
            .collect();
        if window.is_empty() {
            continue;
        }
        let passes = window.iter().filter(|c| c.outcome == Outcome::Pass).count();
        let actual_sr = passes as f64 / window.len() as f64 * 100.0;

        let record = accuracy::evaluate_forecast(prediction, actual_sr, now);
        state.db.insert_accuracy_record(&record).map_err(store_err)?;
    }

    let records = state
        .db
        .accuracy_records_since(&tenant.tenant_id, now - Duration::days(WINDOW_DAYS))
        .map_err(store_err)?;
    let metrics = accuracy::rolling_metrics(&tenant.tenant_id, &records, now);
    state.db.insert_model_metrics(&metrics).map_err(store_err)?;
    Ok(TenantOutcome::Processed)
}

pub async fn run_evaluate_accuracy(
    state: SharedState,
    scope: Option<String>,
) -> EngineResult<JobSummary> {
    run_over_tenants(state, "evaluate-accuracy", scope, evaluate_accuracy_tenant).await
}

fn tune_weights_tenant(
    state: &AppState,
    tenant: &autopilot_core::TenantSettings,
    now: DateTime<Utc>,
) -> EngineResult<TenantOutcome> {
    let Some(metrics) = state
        .db
        .latest_model_metrics(&tenant.tenant_id)
        .map_err(store_err)?
    else {
        return Ok(TenantOutcome::Skipped);
    };

    let current = state.db.latest_weights(&tenant.tenant_id).map_err(store_err)?;
    let updated = controller::retune_weights(current, metrics.reliability, metrics.mae);
    if updated != current {
        state
            .db
            .insert_weight_history(&WeightHistoryEntry {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: tenant.tenant_id.clone(),
                weights: updated,
                model_version: risk::MODEL_VERSION.to_string(),
                reason: format!(
                    "reliability {:.1}, mae {:.2}",
                    metrics.reliability, metrics.mae
                ),
                recorded_at: now,
            })
            .map_err(store_err)?;
    }

    // SLO self-tuning: commit the latest forecast's suggestion at most once.
    if tenant.self_tuning_enabled {
        if let Some(prediction) = state
            .db
            .latest_prediction(&tenant.tenant_id)
            .map_err(store_err)?
        {
            if !prediction.applied {
                if let Some(adjustment) =
                    controller::plan_slo_adjustment(NudgePolicy::adaptive(), &prediction, now)
                {
                    // Claim the forecast first so a concurrent tuner cannot
                    // commit the same suggestion twice.
                    if state
                        .db
                        .mark_prediction_applied(&prediction.id)
                        .map_err(store_err)?
                    {
                        state
                            .db
                            .commit_slo_adjustment(&adjustment)
                            .map_err(store_err)?;
                        tracing::info!(
                            tenant = %tenant.tenant_id,
                            old = adjustment.old_target,
                            new = adjustment.new_target,
                            "slo target adjusted"
                        );
                    }
                }
            }
        }
    }

    Ok(TenantOutcome::Processed)
}

pub async fn run_tune_weights(
    state: SharedState,
    scope: Option<String>,
) -> EngineResult<JobSummary> {
    run_over_tenants(state, "tune-weights", scope, tune_weights_tenant).await
}

// ============================================================================
// Signals & recommendations
// ============================================================================

fn mine_signals_tenant(
    state: &AppState,
    tenant: &autopilot_core::TenantSettings,
    now: DateTime<Utc>,
) -> EngineResult<TenantOutcome> {
    if !tenant.explainability_enabled {
        return Ok(TenantOutcome::Skipped);
    }
    let history = history_30d(state, &tenant.tenant_id, now)?;
    let mined = signals::mine(&tenant.tenant_id, &history, now);
    if mined.is_empty() {
        return Ok(TenantOutcome::Skipped);
    }
    state.db.insert_signals(&mined).map_err(store_err)?;

    // One insight per run at most: the strongest signal, and only when it
    // clears the magnitude/significance gate.
    if let Some(strongest) = signals::strongest_insight(&mined) {
        let insight = InsightRecord {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.tenant_id.clone(),
            signal_id: strongest.id.clone(),
            feature: strongest.feature.clone(),
            key: strongest.key.clone(),
            metric: strongest.metric.clone(),
            value: strongest.value,
            p_value: strongest.p_value,
            detected_at: now,
        };
        state.db.insert_insight(&insight).map_err(store_err)?;
        executor::notify_team(
            "compliance-digest",
            &tenant.tenant_id,
            &format!(
                "insight: {} {} {} at {:.2}",
                insight.feature, insight.key, insight.metric, insight.value
            ),
        );
    }
    Ok(TenantOutcome::Processed)
}

pub async fn run_mine_signals(
    state: SharedState,
    scope: Option<String>,
) -> EngineResult<JobSummary> {
    run_over_tenants(state, "mine-signals", scope, mine_signals_tenant).await
}

fn recommend_tenant(
    state: &AppState,
    tenant: &autopilot_core::TenantSettings,
    now: DateTime<Utc>,
) -> EngineResult<TenantOutcome> {
    if !tenant.recommendations_enabled {
        return Ok(TenantOutcome::Skipped);
    }

    // Expired snoozes re-enter the open pool before matching.
    state
        .db
        .expire_snoozes(&tenant.tenant_id, now)
        .map_err(store_err)?;

    let mined = state.db.latest_signals(&tenant.tenant_id).map_err(store_err)?;
    if mined.is_empty() {
        return Ok(TenantOutcome::Skipped);
    }

    let mut weighted = Vec::with_capacity(mined.len());
    for signal in mined {
        let row = state
            .db
            .get_signal_weight(&signal.tenant_id, &signal.feature, &signal.key, &signal.metric)
            .map_err(store_err)?;
        weighted.push(match row {
            Some(w) => WeightedSignal {
                signal,
                weight: w.weight,
                confidence: w.confidence,
            },
            None => WeightedSignal::unweighted(signal),
        });
    }

    let playbooks = effective_catalog(state)?;
    let open = state
        .db
        .recommendations_by_status(&tenant.tenant_id, RecommendationStatus::Open)
        .map_err(store_err)?;

    let generated =
        recommend::build_recommendations(&tenant.tenant_id, &weighted, &playbooks, &open, now);
    for recommendation in &generated {
        state
            .db
            .insert_recommendation(recommendation)
            .map_err(store_err)?;
    }
    Ok(TenantOutcome::Processed)
}

pub async fn run_recommend(state: SharedState, scope: Option<String>) -> EngineResult<JobSummary> {
    run_over_tenants(state, "recommend", scope, recommend_tenant).await
}

// ============================================================================
// Remediation & impact
// ============================================================================

fn auto_remediate_tenant(
    state: &AppState,
    tenant: &autopilot_core::TenantSettings,
    now: DateTime<Utc>,
) -> EngineResult<TenantOutcome> {
    let open = state
        .db
        .recommendations_by_status(&tenant.tenant_id, RecommendationStatus::Open)
        .map_err(store_err)?;
    if open.is_empty() {
        return Ok(TenantOutcome::Skipped);
    }
    let playbooks = effective_catalog(state)?;

    let mut triggered = 0usize;
    for recommendation in &open {
        let Some(playbook) = playbooks
            .iter()
            .find(|p| p.code == recommendation.playbook_code)
        else {
            continue;
        };
        if remediation::auto_trigger_verdict(recommendation, playbook)
            != autopilot_engine::AutoTriggerVerdict::Eligible
        {
            continue;
        }

        let run = remediation::new_run(recommendation, playbook, true, now);
        // The conditional insert is the 24h rate-limit guard; a false return
        // means another scan already ran this playbook for the tenant.
        if !state.db.try_insert_run(&run).map_err(store_err)? {
            continue;
        }
        triggered += 1;
        execute_run(state, run, playbook, recommendation.id.clone(), now)?;
    }

    if triggered == 0 {
        Ok(TenantOutcome::Skipped)
    } else {
        executor::notify_team(
            "compliance-digest",
            &tenant.tenant_id,
            &format!("{} remediation runs auto-triggered", triggered),
        );
        Ok(TenantOutcome::Processed)
    }
}

/// Drive one inserted run through its state machine and record the outcome
/// on the recommendation and the audit trail.
pub fn execute_run(
    state: &AppState,
    mut run: autopilot_core::RemediationRun,
    playbook: &PlaybookEntry,
    recommendation_id: String,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    remediation::begin_execution(&mut run);
    state
        .db
        .set_run_status(&run.id, run.status, None)
        .map_err(store_err)?;

    let execution = state.executor.execute(playbook, &run);
    let success = execution.is_ok();
    remediation::complete(&mut run, success, now);
    state
        .db
        .set_run_status(&run.id, run.status, run.completed_at)
        .map_err(store_err)?;

    let detail = match &execution {
        Ok(report) => report.detail.clone(),
        Err(e) => e.to_string(),
    };
    // Audit writes are best effort; a failed audit row never fails the run.
    if let Err(e) = state.db.append_audit(
        &run.tenant_id,
        &recommendation_id,
        if success { "executed" } else { "execution_failed" },
        &detail,
        now,
    ) {
        tracing::warn!(run_id = %run.id, error = %e, "audit write failed");
    }

    if success {
        state
            .db
            .update_recommendation_status(
                &recommendation_id,
                RecommendationStatus::Applied,
                None,
                now,
            )
            .map_err(store_err)?;
    }
    Ok(())
}

pub async fn run_auto_remediate(
    state: SharedState,
    scope: Option<String>,
) -> EngineResult<JobSummary> {
    run_over_tenants(state, "auto-remediate", scope, auto_remediate_tenant).await
}

fn evaluate_impact_tenant(
    state: &AppState,
    tenant: &autopilot_core::TenantSettings,
    now: DateTime<Utc>,
) -> EngineResult<TenantOutcome> {
    let runs = state
        .db
        .unscored_success_runs(
            &tenant.tenant_id,
            now - Duration::hours(impact::MIN_RUN_AGE_HOURS),
        )
        .map_err(store_err)?;
    if runs.is_empty() {
        return Ok(TenantOutcome::Skipped);
    }

    let history = history_30d(state, &tenant.tenant_id, now)?;
    let playbooks = effective_catalog(state)?;

    for run in &runs {
        let delta = impact::score_run(&history, run.started_at).value();

        // Feed the measured delta back into the originating signal weight.
        let mut confidence_after = run.confidence_before + impact::confidence_delta(delta);
        if let Some(recommendation) = state
            .db
            .get_recommendation(&run.recommendation_id)
            .map_err(store_err)?
        {
            let metric = playbooks
                .iter()
                .find(|p| p.code == run.playbook_code)
                .map(|p| p.condition.metric.clone());
            if let Some(metric) = metric {
                if let Some(row) = state
                    .db
                    .get_signal_weight(
                        &tenant.tenant_id,
                        &recommendation.signal_feature,
                        &recommendation.signal_key,
                        &metric,
                    )
                    .map_err(store_err)?
                {
                    let adjusted = impact::adjust_signal_confidence(row, delta);
                    confidence_after = adjusted.confidence;
                    state.db.upsert_signal_weight(&adjusted).map_err(store_err)?;
                }
            }
        }

        state
            .db
            .set_run_impact(&run.id, delta, confidence_after.clamp(0.0, 100.0))
            .map_err(store_err)?;

        // And into the playbook's expected impact.
        if let Some(playbook) = playbooks.iter().find(|p| p.code == run.playbook_code) {
            let nudged = impact::nudge_playbook_impact(playbook.default_impact, delta);
            state
                .db
                .set_playbook_impact_override(&playbook.code, nudged)
                .map_err(store_err)?;
        }
    }
    Ok(TenantOutcome::Processed)
}

pub async fn run_evaluate_impact(
    state: SharedState,
    scope: Option<String>,
) -> EngineResult<JobSummary> {
    run_over_tenants(state, "evaluate-impact", scope, evaluate_impact_tenant).await
}

// ============================================================================
// Retraining
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RetrainSummary {
    pub planned: bool,
    pub experiment_id: Option<String>,
    pub canary_tenants: usize,
    pub job_id: Option<String>,
}

/// Scan every opted-in tenant's latest metrics and, when degradation is
/// systemic, open one canary experiment and queue a training job.
pub async fn run_plan_retraining(
    state: SharedState,
    scope: Option<String>,
) -> EngineResult<RetrainSummary> {
    let now = Utc::now();
    let tenants = tenants_in_scope(&state, scope.as_deref())?;

    let mut candidates = Vec::new();
    for tenant in tenants {
        let Some(metrics) = state
            .db
            .latest_model_metrics(&tenant.tenant_id)
            .map_err(store_err)?
        else {
            continue;
        };
        if retrain::is_candidate(&metrics, &tenant) {
            candidates.push((metrics, tenant));
        }
    }

    let active = state
        .db
        .active_experiment(retrain::MODEL_FAMILY)
        .map_err(store_err)?;
    let Some(plan) = retrain::plan(&candidates, active.as_ref(), now, &mut rand::thread_rng())
    else {
        return Ok(RetrainSummary {
            planned: false,
            experiment_id: None,
            canary_tenants: 0,
            job_id: None,
        });
    };

    state.db.insert_experiment(&plan.experiment).map_err(store_err)?;
    state.db.insert_assignments(&plan.assignments).map_err(store_err)?;
    state.db.insert_training_job(&plan.job).map_err(store_err)?;
    state
        .db
        .set_experiment_status(&plan.experiment.id, autopilot_core::ExperimentStatus::Running)
        .map_err(store_err)?;

    tracing::info!(
        experiment = %plan.experiment.id,
        canaries = plan.assignments.len(),
        reason = %plan.job.trigger_reason,
        "retraining round planned"
    );
    Ok(RetrainSummary {
        planned: true,
        experiment_id: Some(plan.experiment.id),
        canary_tenants: plan.assignments.len(),
        job_id: Some(plan.job.id),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainSummary {
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Drain queued training jobs: retune each canary tenant's weights and roll
/// the result out as weight-history rows, then end the experiment.
pub async fn run_train(state: SharedState, scope: Option<String>) -> EngineResult<TrainSummary> {
    // Training jobs are model-family scoped; a tenant scope has no meaning
    // here and silently ignoring one would mislead the caller.
    if scope.is_some() {
        return Err(EngineError::InvalidInput(
            "train is not tenant-scoped".to_string(),
        ));
    }
    let now = Utc::now();
    let jobs = state
        .db
        .queued_training_jobs(retrain::JOBS_PER_RUN)
        .map_err(store_err)?;

    let mut summary = TrainSummary {
        executed: 0,
        succeeded: 0,
        failed: 0,
    };

    for job in jobs {
        summary.executed += 1;
        state.db.set_training_job_running(&job.id).map_err(store_err)?;

        let Some(experiment) = state
            .db
            .active_experiment(&job.family)
            .map_err(store_err)?
        else {
            state
                .db
                .complete_training_job(
                    &job.id,
                    TrainingStatus::Failed,
                    None,
                    "no active experiment for family",
                    now,
                )
                .map_err(store_err)?;
            summary.failed += 1;
            continue;
        };

        let assignments = state
            .db
            .assignments_for_experiment(&experiment.id)
            .map_err(store_err)?;
        let mut canaries = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            let Some(metrics) = state
                .db
                .latest_model_metrics(&assignment.tenant_id)
                .map_err(store_err)?
            else {
                continue;
            };
            let weights = state
                .db
                .latest_weights(&assignment.tenant_id)
                .map_err(store_err)?;
            canaries.push((assignment.tenant_id.clone(), weights, metrics));
        }

        let outcome = retrain::train(&canaries);
        for (tenant_id, weights) in &outcome.tenant_weights {
            state
                .db
                .insert_weight_history(&WeightHistoryEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    tenant_id: tenant_id.clone(),
                    weights: *weights,
                    model_version: job.target_version.clone(),
                    reason: format!("training rollout {}", job.target_version),
                    recorded_at: now,
                })
                .map_err(store_err)?;
        }

        state
            .db
            .complete_training_job(
                &job.id,
                TrainingStatus::Succeeded,
                Some(&outcome.metrics_after),
                &outcome.logs,
                now,
            )
            .map_err(store_err)?;
        state
            .db
            .set_experiment_status(&experiment.id, autopilot_core::ExperimentStatus::Ended)
            .map_err(store_err)?;
        summary.succeeded += 1;

        tracing::info!(
            job_id = %job.id,
            version = %job.target_version,
            tenants = outcome.tenant_weights.len(),
            "training job completed"
        );
    }
    Ok(summary)
}

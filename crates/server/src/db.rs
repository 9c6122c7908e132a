// Database persistence layer using SQLite

use autopilot_core::{
    CheckResult, EnsembleForecast, EnsembleWeights, ExperimentAssignment, ExplainabilitySignal,
    ExperimentStatus, ForecastAccuracyRecord, ForecastModelMetrics, ForecastPrediction,
    InsightRecord, ModelExperiment, Outcome, Recommendation, RecommendationStatus, RemediationRun,
    RiskLevel, RunStatus, SignalWeight, SloAdjustment, TenantSettings, TrainingJob, TrainingStatus,
    WeightHistoryEntry,
};
use autopilot_engine::remediation::cooldown_floor;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

pub struct Database {
    conn: Mutex<Connection>,
}

/// Fixed-width UTC timestamp; lexicographic order matches time order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(format!("bad timestamp {:?}: {}", s, e)))
}

fn conversion_err(msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, msg.into())
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                tenant_id TEXT PRIMARY KEY,
                slo_target REAL NOT NULL,
                self_tuning_enabled INTEGER NOT NULL DEFAULT 0,
                canary_opt_in INTEGER NOT NULL DEFAULT 0,
                recommendations_enabled INTEGER NOT NULL DEFAULT 1,
                explainability_enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS check_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                rule_id TEXT NOT NULL,
                rule_group TEXT NOT NULL,
                ts TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checks_tenant_ts
                ON check_results(tenant_id, ts);

            CREATE TABLE IF NOT EXISTS ensemble_forecasts (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                trend_prediction REAL NOT NULL,
                conservative_prediction REAL NOT NULL,
                optimistic_prediction REAL NOT NULL,
                w_trend REAL NOT NULL,
                w_conservative REAL NOT NULL,
                w_optimistic REAL NOT NULL,
                blended_sr REAL NOT NULL,
                ci_lower REAL NOT NULL,
                ci_upper REAL NOT NULL,
                generated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ensemble_tenant
                ON ensemble_forecasts(tenant_id, generated_at DESC);

            CREATE TABLE IF NOT EXISTS forecast_predictions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                breach_probability REAL NOT NULL,
                confidence_score REAL NOT NULL,
                predicted_sr REAL NOT NULL,
                volatility REAL NOT NULL,
                current_slo_target REAL NOT NULL,
                suggested_slo_target REAL NOT NULL,
                advisories TEXT NOT NULL,
                model_version TEXT NOT NULL,
                applied INTEGER NOT NULL DEFAULT 0,
                generated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_tenant
                ON forecast_predictions(tenant_id, generated_at DESC);

            CREATE TABLE IF NOT EXISTS accuracy_records (
                id TEXT PRIMARY KEY,
                forecast_id TEXT NOT NULL UNIQUE,
                tenant_id TEXT NOT NULL,
                predicted_breach INTEGER NOT NULL,
                actual_breach INTEGER NOT NULL,
                predicted_sr REAL NOT NULL,
                actual_sr REAL NOT NULL,
                evaluation_date TEXT NOT NULL,
                days_ahead INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_accuracy_tenant
                ON accuracy_records(tenant_id, evaluation_date DESC);

            CREATE TABLE IF NOT EXISTS model_metrics (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                precision REAL NOT NULL,
                recall REAL NOT NULL,
                mae REAL NOT NULL,
                bias REAL NOT NULL,
                reliability REAL NOT NULL,
                sample_size INTEGER NOT NULL,
                computed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_metrics_tenant
                ON model_metrics(tenant_id, computed_at DESC);

            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                day TEXT NOT NULL,
                feature TEXT NOT NULL,
                key TEXT NOT NULL,
                metric TEXT NOT NULL,
                value REAL NOT NULL,
                sample_size INTEGER NOT NULL,
                p_value REAL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_tenant
                ON signals(tenant_id, day DESC);

            CREATE TABLE IF NOT EXISTS insights (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                signal_id TEXT NOT NULL,
                feature TEXT NOT NULL,
                key TEXT NOT NULL,
                metric TEXT NOT NULL,
                value REAL NOT NULL,
                p_value REAL,
                detected_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_insights_tenant
                ON insights(tenant_id, detected_at DESC);

            CREATE TABLE IF NOT EXISTS signal_weights (
                tenant_id TEXT NOT NULL,
                feature TEXT NOT NULL,
                key TEXT NOT NULL,
                metric TEXT NOT NULL,
                weight REAL NOT NULL,
                confidence REAL NOT NULL,
                sample INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, feature, key, metric)
            );

            CREATE TABLE IF NOT EXISTS recommendations (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                playbook_code TEXT NOT NULL,
                signal_feature TEXT NOT NULL,
                signal_key TEXT NOT NULL,
                signal_value REAL NOT NULL,
                weight REAL NOT NULL,
                confidence REAL NOT NULL,
                expected_impact REAL NOT NULL,
                priority INTEGER NOT NULL,
                status TEXT NOT NULL,
                snooze_until TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_recommendations_tenant
                ON recommendations(tenant_id, status);

            CREATE TABLE IF NOT EXISTS remediation_runs (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                playbook_code TEXT NOT NULL,
                recommendation_id TEXT NOT NULL,
                auto_triggered INTEGER NOT NULL,
                parameters TEXT NOT NULL,
                confidence_before REAL NOT NULL,
                confidence_after REAL,
                impact REAL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_runs_tenant_playbook
                ON remediation_runs(tenant_id, playbook_code, started_at DESC);

            CREATE TABLE IF NOT EXISTS slo_adjustments (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                old_target REAL NOT NULL,
                new_target REAL NOT NULL,
                delta REAL NOT NULL,
                risk_level TEXT NOT NULL,
                breach_probability REAL NOT NULL,
                confidence REAL NOT NULL,
                forecast_id TEXT NOT NULL,
                adjusted_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS action_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                recommendation_id TEXT NOT NULL,
                action TEXT NOT NULL,
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS experiments (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                family TEXT NOT NULL,
                variant TEXT NOT NULL,
                allocation REAL NOT NULL,
                status TEXT NOT NULL,
                owner TEXT NOT NULL,
                notes TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS experiment_assignments (
                experiment_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                sticky INTEGER NOT NULL,
                assigned_at TEXT NOT NULL,
                PRIMARY KEY (experiment_id, tenant_id)
            );

            CREATE TABLE IF NOT EXISTS training_jobs (
                id TEXT PRIMARY KEY,
                family TEXT NOT NULL,
                target_version TEXT NOT NULL,
                status TEXT NOT NULL,
                trigger_reason TEXT NOT NULL,
                metrics_before TEXT NOT NULL,
                metrics_after TEXT,
                logs TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS weight_history (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                w_trend REAL NOT NULL,
                w_conservative REAL NOT NULL,
                w_optimistic REAL NOT NULL,
                model_version TEXT NOT NULL,
                reason TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_weight_history_tenant
                ON weight_history(tenant_id, recorded_at DESC);

            CREATE TABLE IF NOT EXISTS playbook_impact_overrides (
                code TEXT PRIMARY KEY,
                default_impact REAL NOT NULL
            );
            "#,
        )
    }

    // ========================================================================
    // Tenants
    // ========================================================================

    pub fn upsert_tenant(&self, settings: &TenantSettings) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tenants (tenant_id, slo_target, self_tuning_enabled, canary_opt_in,
                                  recommendations_enabled, explainability_enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tenant_id) DO UPDATE SET
                slo_target = excluded.slo_target,
                self_tuning_enabled = excluded.self_tuning_enabled,
                canary_opt_in = excluded.canary_opt_in,
                recommendations_enabled = excluded.recommendations_enabled,
                explainability_enabled = excluded.explainability_enabled",
            params![
                settings.tenant_id,
                settings.slo_target,
                settings.self_tuning_enabled,
                settings.canary_opt_in,
                settings.recommendations_enabled,
                settings.explainability_enabled,
            ],
        )?;
        Ok(())
    }

    pub fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantSettings>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tenant_id, slo_target, self_tuning_enabled, canary_opt_in,
                    recommendations_enabled, explainability_enabled
             FROM tenants WHERE tenant_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![tenant_id], row_to_tenant)?;
        rows.next().transpose()
    }

    pub fn list_tenants(&self) -> Result<Vec<TenantSettings>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tenant_id, slo_target, self_tuning_enabled, canary_opt_in,
                    recommendations_enabled, explainability_enabled
             FROM tenants ORDER BY tenant_id",
        )?;
        let rows = stmt.query_map([], row_to_tenant)?;
        rows.collect()
    }

    /// Commit a bounded SLO-target change together with its audit record.
    pub fn commit_slo_adjustment(
        &self,
        adjustment: &SloAdjustment,
    ) -> Result<(), rusqlite::Error> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE tenants SET slo_target = ?1 WHERE tenant_id = ?2",
            params![adjustment.new_target, adjustment.tenant_id],
        )?;
        tx.execute(
            "INSERT INTO slo_adjustments (id, tenant_id, old_target, new_target, delta,
                                          risk_level, breach_probability, confidence,
                                          forecast_id, adjusted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                adjustment.id,
                adjustment.tenant_id,
                adjustment.old_target,
                adjustment.new_target,
                adjustment.delta,
                adjustment.risk_level.as_str(),
                adjustment.breach_probability,
                adjustment.confidence,
                adjustment.forecast_id,
                ts(adjustment.adjusted_at),
            ],
        )?;
        tx.commit()
    }

    pub fn slo_adjustments(&self, tenant_id: &str) -> Result<Vec<SloAdjustment>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, old_target, new_target, delta, risk_level,
                    breach_probability, confidence, forecast_id, adjusted_at
             FROM slo_adjustments WHERE tenant_id = ?1 ORDER BY adjusted_at DESC",
        )?;
        let rows = stmt.query_map(params![tenant_id], |row| {
            Ok(SloAdjustment {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                old_target: row.get(2)?,
                new_target: row.get(3)?,
                delta: row.get(4)?,
                risk_level: parse_risk(&row.get::<_, String>(5)?)?,
                breach_probability: row.get(6)?,
                confidence: row.get(7)?,
                forecast_id: row.get(8)?,
                adjusted_at: parse_ts(&row.get::<_, String>(9)?)?,
            })
        })?;
        rows.collect()
    }

    // ========================================================================
    // Check results
    // ========================================================================

    pub fn insert_check_results(&self, checks: &[CheckResult]) -> Result<usize, rusqlite::Error> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO check_results (tenant_id, outcome, rule_id, rule_group, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for check in checks {
                stmt.execute(params![
                    check.tenant_id,
                    check.outcome.as_str(),
                    check.rule_id,
                    check.rule_group,
                    ts(check.ts),
                ])?;
            }
        }
        tx.commit()?;
        Ok(checks.len())
    }

    pub fn check_history(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tenant_id, outcome, rule_id, rule_group, ts
             FROM check_results WHERE tenant_id = ?1 AND ts >= ?2 ORDER BY ts",
        )?;
        let rows = stmt.query_map(params![tenant_id, ts(since)], |row| {
            let outcome_str: String = row.get(1)?;
            Ok(CheckResult {
                tenant_id: row.get(0)?,
                outcome: Outcome::from_str(&outcome_str)
                    .ok_or_else(|| conversion_err(format!("bad outcome {:?}", outcome_str)))?,
                rule_id: row.get(2)?,
                rule_group: row.get(3)?,
                ts: parse_ts(&row.get::<_, String>(4)?)?,
            })
        })?;
        rows.collect()
    }

    // ========================================================================
    // Forecasts
    // ========================================================================

    pub fn insert_ensemble_forecast(
        &self,
        forecast: &EnsembleForecast,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ensemble_forecasts
                (id, tenant_id, trend_prediction, conservative_prediction,
                 optimistic_prediction, w_trend, w_conservative, w_optimistic,
                 blended_sr, ci_lower, ci_upper, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                forecast.id,
                forecast.tenant_id,
                forecast.trend_prediction,
                forecast.conservative_prediction,
                forecast.optimistic_prediction,
                forecast.weights.trend,
                forecast.weights.conservative,
                forecast.weights.optimistic,
                forecast.blended_sr,
                forecast.ci_lower,
                forecast.ci_upper,
                ts(forecast.generated_at),
            ],
        )?;
        Ok(())
    }

    pub fn insert_prediction(
        &self,
        prediction: &ForecastPrediction,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO forecast_predictions
                (id, tenant_id, risk_level, breach_probability, confidence_score,
                 predicted_sr, volatility, current_slo_target, suggested_slo_target,
                 advisories, model_version, applied, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                prediction.id,
                prediction.tenant_id,
                prediction.risk_level.as_str(),
                prediction.breach_probability_7d,
                prediction.confidence_score,
                prediction.predicted_sr_7d,
                prediction.volatility_index,
                prediction.current_slo_target,
                prediction.suggested_slo_target,
                serde_json::to_string(&prediction.advisories)
                    .map_err(|e| conversion_err(e.to_string()))?,
                prediction.model_version,
                prediction.applied,
                ts(prediction.generated_at),
            ],
        )?;
        Ok(())
    }

    pub fn latest_prediction(
        &self,
        tenant_id: &str,
    ) -> Result<Option<ForecastPrediction>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, risk_level, breach_probability, confidence_score,
                    predicted_sr, volatility, current_slo_target, suggested_slo_target,
                    advisories, model_version, applied, generated_at
             FROM forecast_predictions WHERE tenant_id = ?1
             ORDER BY generated_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![tenant_id], row_to_prediction)?;
        rows.next().transpose()
    }

    /// Forecasts whose generation time falls inside the evaluation window
    /// and which have not been evaluated yet.
    pub fn predictions_awaiting_evaluation(
        &self,
        tenant_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<ForecastPrediction>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.tenant_id, p.risk_level, p.breach_probability, p.confidence_score,
                    p.predicted_sr, p.volatility, p.current_slo_target, p.suggested_slo_target,
                    p.advisories, p.model_version, p.applied, p.generated_at
             FROM forecast_predictions p
             LEFT JOIN accuracy_records a ON a.forecast_id = p.id
             WHERE p.tenant_id = ?1 AND p.generated_at >= ?2 AND p.generated_at < ?3
               AND a.id IS NULL
             ORDER BY p.generated_at",
        )?;
        let rows = stmt.query_map(
            params![tenant_id, ts(window_start), ts(window_end)],
            row_to_prediction,
        )?;
        rows.collect()
    }

    /// Mark a forecast's suggestion as applied, at most once.
    /// Returns false when the forecast was already applied.
    pub fn mark_prediction_applied(&self, forecast_id: &str) -> Result<bool, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE forecast_predictions SET applied = 1 WHERE id = ?1 AND applied = 0",
            params![forecast_id],
        )?;
        Ok(changed == 1)
    }

    pub fn latest_ensemble_forecast(
        &self,
        tenant_id: &str,
    ) -> Result<Option<EnsembleForecast>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, trend_prediction, conservative_prediction,
                    optimistic_prediction, w_trend, w_conservative, w_optimistic,
                    blended_sr, ci_lower, ci_upper, generated_at
             FROM ensemble_forecasts WHERE tenant_id = ?1
             ORDER BY generated_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![tenant_id], |row| {
            Ok(EnsembleForecast {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                trend_prediction: row.get(2)?,
                conservative_prediction: row.get(3)?,
                optimistic_prediction: row.get(4)?,
                weights: EnsembleWeights {
                    trend: row.get(5)?,
                    conservative: row.get(6)?,
                    optimistic: row.get(7)?,
                },
                blended_sr: row.get(8)?,
                ci_lower: row.get(9)?,
                ci_upper: row.get(10)?,
                generated_at: parse_ts(&row.get::<_, String>(11)?)?,
            })
        })?;
        rows.next().transpose()
    }

    // ========================================================================
    // Accuracy & metrics
    // ========================================================================

    pub fn insert_accuracy_record(
        &self,
        record: &ForecastAccuracyRecord,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO accuracy_records
                (id, forecast_id, tenant_id, predicted_breach, actual_breach,
                 predicted_sr, actual_sr, evaluation_date, days_ahead)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.forecast_id,
                record.tenant_id,
                record.predicted_breach,
                record.actual_breach,
                record.predicted_sr,
                record.actual_sr,
                ts(record.evaluation_date),
                record.days_ahead,
            ],
        )?;
        Ok(())
    }

    pub fn accuracy_records_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ForecastAccuracyRecord>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, forecast_id, tenant_id, predicted_breach, actual_breach,
                    predicted_sr, actual_sr, evaluation_date, days_ahead
             FROM accuracy_records WHERE tenant_id = ?1 AND evaluation_date >= ?2",
        )?;
        let rows = stmt.query_map(params![tenant_id, ts(since)], |row| {
            Ok(ForecastAccuracyRecord {
                id: row.get(0)?,
                forecast_id: row.get(1)?,
                tenant_id: row.get(2)?,
                predicted_breach: row.get(3)?,
                actual_breach: row.get(4)?,
                predicted_sr: row.get(5)?,
                actual_sr: row.get(6)?,
                evaluation_date: parse_ts(&row.get::<_, String>(7)?)?,
                days_ahead: row.get(8)?,
            })
        })?;
        rows.collect()
    }

    pub fn insert_model_metrics(
        &self,
        metrics: &ForecastModelMetrics,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO model_metrics
                (id, tenant_id, precision, recall, mae, bias, reliability,
                 sample_size, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                metrics.id,
                metrics.tenant_id,
                metrics.precision,
                metrics.recall,
                metrics.mae,
                metrics.bias,
                metrics.reliability,
                metrics.sample_size,
                ts(metrics.computed_at),
            ],
        )?;
        Ok(())
    }

    pub fn latest_model_metrics(
        &self,
        tenant_id: &str,
    ) -> Result<Option<ForecastModelMetrics>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, precision, recall, mae, bias, reliability,
                    sample_size, computed_at
             FROM model_metrics WHERE tenant_id = ?1
             ORDER BY computed_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![tenant_id], row_to_metrics)?;
        rows.next().transpose()
    }

    // ========================================================================
    // Weights
    // ========================================================================

    /// Latest committed ensemble weights for a tenant, or defaults.
    pub fn latest_weights(&self, tenant_id: &str) -> Result<EnsembleWeights, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT w_trend, w_conservative, w_optimistic
             FROM weight_history WHERE tenant_id = ?1
             ORDER BY recorded_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![tenant_id], |row| {
            Ok(EnsembleWeights {
                trend: row.get(0)?,
                conservative: row.get(1)?,
                optimistic: row.get(2)?,
            })
        })?;
        Ok(rows.next().transpose()?.unwrap_or_default())
    }

    pub fn insert_weight_history(
        &self,
        entry: &WeightHistoryEntry,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO weight_history
                (id, tenant_id, w_trend, w_conservative, w_optimistic,
                 model_version, reason, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.tenant_id,
                entry.weights.trend,
                entry.weights.conservative,
                entry.weights.optimistic,
                entry.model_version,
                entry.reason,
                ts(entry.recorded_at),
            ],
        )?;
        Ok(())
    }

    // ========================================================================
    // Signals & signal weights
    // ========================================================================

    pub fn insert_signals(
        &self,
        signals: &[ExplainabilitySignal],
    ) -> Result<usize, rusqlite::Error> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO signals
                    (id, tenant_id, day, feature, key, metric, value, sample_size, p_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for signal in signals {
                stmt.execute(params![
                    signal.id,
                    signal.tenant_id,
                    ts(signal.day),
                    signal.feature,
                    signal.key,
                    signal.metric,
                    signal.value,
                    signal.sample_size,
                    signal.p_value,
                ])?;
            }
        }
        tx.commit()?;
        Ok(signals.len())
    }

    /// Most recent mining run's signals for a tenant.
    pub fn latest_signals(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ExplainabilitySignal>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, day, feature, key, metric, value, sample_size, p_value
             FROM signals WHERE tenant_id = ?1
               AND day = (SELECT MAX(day) FROM signals WHERE tenant_id = ?1)",
        )?;
        let rows = stmt.query_map(params![tenant_id], row_to_signal)?;
        rows.collect()
    }

    pub fn get_signal(
        &self,
        id: &str,
    ) -> Result<Option<ExplainabilitySignal>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, day, feature, key, metric, value, sample_size, p_value
             FROM signals WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], row_to_signal)?;
        rows.next().transpose()
    }

    pub fn insert_insight(&self, insight: &InsightRecord) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO insights
                (id, tenant_id, signal_id, feature, key, metric, value, p_value, detected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                insight.id,
                insight.tenant_id,
                insight.signal_id,
                insight.feature,
                insight.key,
                insight.metric,
                insight.value,
                insight.p_value,
                ts(insight.detected_at),
            ],
        )?;
        Ok(())
    }

    pub fn insights_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<InsightRecord>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, signal_id, feature, key, metric, value, p_value, detected_at
             FROM insights WHERE tenant_id = ?1 ORDER BY detected_at DESC",
        )?;
        let rows = stmt.query_map(params![tenant_id], |row| {
            Ok(InsightRecord {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                signal_id: row.get(2)?,
                feature: row.get(3)?,
                key: row.get(4)?,
                metric: row.get(5)?,
                value: row.get(6)?,
                p_value: row.get(7)?,
                detected_at: parse_ts(&row.get::<_, String>(8)?)?,
            })
        })?;
        rows.collect()
    }

    pub fn get_signal_weight(
        &self,
        tenant_id: &str,
        feature: &str,
        key: &str,
        metric: &str,
    ) -> Result<Option<SignalWeight>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tenant_id, feature, key, metric, weight, confidence, sample
             FROM signal_weights
             WHERE tenant_id = ?1 AND feature = ?2 AND key = ?3 AND metric = ?4",
        )?;
        let mut rows = stmt.query_map(params![tenant_id, feature, key, metric], row_to_weight)?;
        rows.next().transpose()
    }

    pub fn upsert_signal_weight(&self, weight: &SignalWeight) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO signal_weights
                (tenant_id, feature, key, metric, weight, confidence, sample)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_id, feature, key, metric) DO UPDATE SET
                weight = excluded.weight,
                confidence = excluded.confidence,
                sample = excluded.sample",
            params![
                weight.tenant_id,
                weight.feature,
                weight.key,
                weight.metric,
                weight.weight,
                weight.confidence,
                weight.sample,
            ],
        )?;
        Ok(())
    }

    // ========================================================================
    // Recommendations
    // ========================================================================

    pub fn insert_recommendation(
        &self,
        recommendation: &Recommendation,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO recommendations
                (id, tenant_id, playbook_code, signal_feature, signal_key, signal_value,
                 weight, confidence, expected_impact, priority, status, snooze_until,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                recommendation.id,
                recommendation.tenant_id,
                recommendation.playbook_code,
                recommendation.signal_feature,
                recommendation.signal_key,
                recommendation.signal_value,
                recommendation.weight,
                recommendation.confidence,
                recommendation.expected_impact,
                recommendation.priority,
                recommendation.status.as_str(),
                recommendation.snooze_until.map(ts),
                ts(recommendation.created_at),
                ts(recommendation.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_recommendation(
        &self,
        id: &str,
    ) -> Result<Option<Recommendation>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, playbook_code, signal_feature, signal_key, signal_value,
                    weight, confidence, expected_impact, priority, status, snooze_until,
                    created_at, updated_at
             FROM recommendations WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], row_to_recommendation)?;
        rows.next().transpose()
    }

    pub fn recommendations_by_status(
        &self,
        tenant_id: &str,
        status: RecommendationStatus,
    ) -> Result<Vec<Recommendation>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, playbook_code, signal_feature, signal_key, signal_value,
                    weight, confidence, expected_impact, priority, status, snooze_until,
                    created_at, updated_at
             FROM recommendations WHERE tenant_id = ?1 AND status = ?2
             ORDER BY priority, created_at",
        )?;
        let rows = stmt.query_map(params![tenant_id, status.as_str()], row_to_recommendation)?;
        rows.collect()
    }

    pub fn list_recommendations(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<Recommendation>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, playbook_code, signal_feature, signal_key, signal_value,
                    weight, confidence, expected_impact, priority, status, snooze_until,
                    created_at, updated_at
             FROM recommendations WHERE tenant_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![tenant_id], row_to_recommendation)?;
        rows.collect()
    }

    pub fn update_recommendation_status(
        &self,
        id: &str,
        status: RecommendationStatus,
        snooze_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE recommendations
             SET status = ?1, snooze_until = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), snooze_until.map(ts), ts(now), id],
        )?;
        Ok(())
    }

    /// Re-open snoozed recommendations whose snooze window has passed.
    pub fn expire_snoozes(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE recommendations
             SET status = 'open', snooze_until = NULL, updated_at = ?1
             WHERE tenant_id = ?2 AND status = 'snoozed' AND snooze_until <= ?1",
            params![ts(now), tenant_id],
        )
    }

    // ========================================================================
    // Remediation runs
    // ========================================================================

    /// Conditional insert enforcing the 24h per-(tenant, playbook) cooldown.
    /// Runs as a single statement under the connection lock so overlapping
    /// auto-trigger scans cannot both succeed. Returns false when the
    /// cooldown suppressed the insert.
    pub fn try_insert_run(&self, run: &RemediationRun) -> Result<bool, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let floor = ts(cooldown_floor(run.started_at));
        let inserted = conn.execute(
            "INSERT INTO remediation_runs
                (id, tenant_id, playbook_code, recommendation_id, auto_triggered,
                 parameters, confidence_before, confidence_after, impact, status,
                 started_at, completed_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, ?8, ?9, NULL
             WHERE NOT EXISTS (
                SELECT 1 FROM remediation_runs
                WHERE tenant_id = ?2 AND playbook_code = ?3 AND started_at >= ?10
             )",
            params![
                run.id,
                run.tenant_id,
                run.playbook_code,
                run.recommendation_id,
                run.auto_triggered,
                run.parameters.to_string(),
                run.confidence_before,
                run.status.as_str(),
                ts(run.started_at),
                floor,
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn set_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE remediation_runs SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![status.as_str(), completed_at.map(ts), run_id],
        )?;
        Ok(())
    }

    pub fn set_run_impact(
        &self,
        run_id: &str,
        impact: f64,
        confidence_after: f64,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE remediation_runs SET impact = ?1, confidence_after = ?2 WHERE id = ?3",
            params![impact, confidence_after, run_id],
        )?;
        Ok(())
    }

    pub fn runs_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<RemediationRun>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, playbook_code, recommendation_id, auto_triggered,
                    parameters, confidence_before, confidence_after, impact, status,
                    started_at, completed_at
             FROM remediation_runs WHERE tenant_id = ?1 ORDER BY started_at DESC",
        )?;
        let rows = stmt.query_map(params![tenant_id], row_to_run)?;
        rows.collect()
    }

    /// Successful runs older than the age gate with no impact score yet.
    pub fn unscored_success_runs(
        &self,
        tenant_id: &str,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<RemediationRun>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, playbook_code, recommendation_id, auto_triggered,
                    parameters, confidence_before, confidence_after, impact, status,
                    started_at, completed_at
             FROM remediation_runs
             WHERE tenant_id = ?1 AND status = 'success' AND impact IS NULL
               AND started_at <= ?2",
        )?;
        let rows = stmt.query_map(params![tenant_id, ts(started_before)], row_to_run)?;
        rows.collect()
    }

    // ========================================================================
    // Audit trail
    // ========================================================================

    pub fn append_audit(
        &self,
        tenant_id: &str,
        recommendation_id: &str,
        action: &str,
        detail: &str,
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO action_audit (tenant_id, recommendation_id, action, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![tenant_id, recommendation_id, action, detail, ts(now)],
        )?;
        Ok(())
    }

    pub fn audit_count(&self, recommendation_id: &str) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM action_audit WHERE recommendation_id = ?1",
            params![recommendation_id],
            |row| row.get(0),
        )
    }

    // ========================================================================
    // Experiments & training
    // ========================================================================

    pub fn active_experiment(
        &self,
        family: &str,
    ) -> Result<Option<ModelExperiment>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, family, variant, allocation, status, owner, notes, created_at
             FROM experiments
             WHERE family = ?1 AND status IN ('draft', 'running')
             ORDER BY created_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![family], row_to_experiment)?;
        rows.next().transpose()
    }

    pub fn insert_experiment(&self, experiment: &ModelExperiment) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO experiments
                (id, name, family, variant, allocation, status, owner, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                experiment.id,
                experiment.name,
                experiment.family,
                experiment.variant.to_string(),
                experiment.allocation,
                experiment.status.as_str(),
                experiment.owner,
                experiment.notes,
                ts(experiment.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn set_experiment_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE experiments SET status = ?1 WHERE id = ?2",
            params![status.as_str(), experiment_id],
        )?;
        Ok(())
    }

    pub fn insert_assignments(
        &self,
        assignments: &[ExperimentAssignment],
    ) -> Result<(), rusqlite::Error> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO experiment_assignments
                    (experiment_id, tenant_id, sticky, assigned_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for assignment in assignments {
                stmt.execute(params![
                    assignment.experiment_id,
                    assignment.tenant_id,
                    assignment.sticky,
                    ts(assignment.assigned_at),
                ])?;
            }
        }
        tx.commit()
    }

    pub fn assignments_for_experiment(
        &self,
        experiment_id: &str,
    ) -> Result<Vec<ExperimentAssignment>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT experiment_id, tenant_id, sticky, assigned_at
             FROM experiment_assignments WHERE experiment_id = ?1 ORDER BY tenant_id",
        )?;
        let rows = stmt.query_map(params![experiment_id], |row| {
            Ok(ExperimentAssignment {
                experiment_id: row.get(0)?,
                tenant_id: row.get(1)?,
                sticky: row.get(2)?,
                assigned_at: parse_ts(&row.get::<_, String>(3)?)?,
            })
        })?;
        rows.collect()
    }

    pub fn insert_training_job(&self, job: &TrainingJob) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO training_jobs
                (id, family, target_version, status, trigger_reason, metrics_before,
                 metrics_after, logs, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id,
                job.family,
                job.target_version,
                job.status.as_str(),
                job.trigger_reason,
                job.metrics_before.to_string(),
                job.metrics_after.as_ref().map(|m| m.to_string()),
                job.logs,
                ts(job.created_at),
                job.completed_at.map(ts),
            ],
        )?;
        Ok(())
    }

    pub fn queued_training_jobs(&self, limit: usize) -> Result<Vec<TrainingJob>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, family, target_version, status, trigger_reason, metrics_before,
                    metrics_after, logs, created_at, completed_at
             FROM training_jobs WHERE status = 'queued'
             ORDER BY created_at LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_job)?;
        rows.collect()
    }

    pub fn set_training_job_running(&self, job_id: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE training_jobs SET status = 'running' WHERE id = ?1",
            params![job_id],
        )?;
        Ok(())
    }

    pub fn complete_training_job(
        &self,
        job_id: &str,
        status: TrainingStatus,
        metrics_after: Option<&serde_json::Value>,
        logs: &str,
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE training_jobs
             SET status = ?1, metrics_after = ?2, logs = ?3, completed_at = ?4
             WHERE id = ?5",
            params![
                status.as_str(),
                metrics_after.map(|m| m.to_string()),
                logs,
                ts(now),
                job_id,
            ],
        )?;
        Ok(())
    }

    pub fn get_training_job(&self, job_id: &str) -> Result<Option<TrainingJob>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, family, target_version, status, trigger_reason, metrics_before,
                    metrics_after, logs, created_at, completed_at
             FROM training_jobs WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![job_id], row_to_job)?;
        rows.next().transpose()
    }

    // ========================================================================
    // Playbook impact overrides
    // ========================================================================

    pub fn playbook_impact_override(&self, code: &str) -> Result<Option<f64>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT default_impact FROM playbook_impact_overrides WHERE code = ?1")?;
        let mut rows = stmt.query_map(params![code], |row| row.get(0))?;
        rows.next().transpose()
    }

    pub fn set_playbook_impact_override(
        &self,
        code: &str,
        default_impact: f64,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO playbook_impact_overrides (code, default_impact)
             VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET default_impact = excluded.default_impact",
            params![code, default_impact],
        )?;
        Ok(())
    }
}

// ============================================================================
// Row mappers
// ============================================================================

fn row_to_tenant(row: &Row) -> rusqlite::Result<TenantSettings> {
    Ok(TenantSettings {
        tenant_id: row.get(0)?,
        slo_target: row.get(1)?,
        self_tuning_enabled: row.get(2)?,
        canary_opt_in: row.get(3)?,
        recommendations_enabled: row.get(4)?,
        explainability_enabled: row.get(5)?,
    })
}

fn parse_risk(s: &str) -> rusqlite::Result<RiskLevel> {
    RiskLevel::from_str(s).ok_or_else(|| conversion_err(format!("bad risk level {:?}", s)))
}

fn row_to_prediction(row: &Row) -> rusqlite::Result<ForecastPrediction> {
    let advisories_json: String = row.get(9)?;
    Ok(ForecastPrediction {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        risk_level: parse_risk(&row.get::<_, String>(2)?)?,
        breach_probability_7d: row.get(3)?,
        confidence_score: row.get(4)?,
        predicted_sr_7d: row.get(5)?,
        volatility_index: row.get(6)?,
        current_slo_target: row.get(7)?,
        suggested_slo_target: row.get(8)?,
        advisories: serde_json::from_str(&advisories_json)
            .map_err(|e| conversion_err(e.to_string()))?,
        model_version: row.get(10)?,
        applied: row.get(11)?,
        generated_at: parse_ts(&row.get::<_, String>(12)?)?,
    })
}

fn row_to_metrics(row: &Row) -> rusqlite::Result<ForecastModelMetrics> {
    Ok(ForecastModelMetrics {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        precision: row.get(2)?,
        recall: row.get(3)?,
        mae: row.get(4)?,
        bias: row.get(5)?,
        reliability: row.get(6)?,
        sample_size: row.get(7)?,
        computed_at: parse_ts(&row.get::<_, String>(8)?)?,
    })
}

fn row_to_signal(row: &Row) -> rusqlite::Result<ExplainabilitySignal> {
    Ok(ExplainabilitySignal {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        day: parse_ts(&row.get::<_, String>(2)?)?,
        feature: row.get(3)?,
        key: row.get(4)?,
        metric: row.get(5)?,
        value: row.get(6)?,
        sample_size: row.get(7)?,
        p_value: row.get(8)?,
    })
}

fn row_to_weight(row: &Row) -> rusqlite::Result<SignalWeight> {
    Ok(SignalWeight {
        tenant_id: row.get(0)?,
        feature: row.get(1)?,
        key: row.get(2)?,
        metric: row.get(3)?,
        weight: row.get(4)?,
        confidence: row.get(5)?,
        sample: row.get(6)?,
    })
}

fn row_to_recommendation(row: &Row) -> rusqlite::Result<Recommendation> {
    let status_str: String = row.get(10)?;
    let snooze: Option<String> = row.get(11)?;
    Ok(Recommendation {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        playbook_code: row.get(2)?,
        signal_feature: row.get(3)?,
        signal_key: row.get(4)?,
        signal_value: row.get(5)?,
        weight: row.get(6)?,
        confidence: row.get(7)?,
        expected_impact: row.get(8)?,
        priority: row.get(9)?,
        status: RecommendationStatus::from_str(&status_str)
            .ok_or_else(|| conversion_err(format!("bad status {:?}", status_str)))?,
        snooze_until: snooze.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&row.get::<_, String>(12)?)?,
        updated_at: parse_ts(&row.get::<_, String>(13)?)?,
    })
}

fn row_to_run(row: &Row) -> rusqlite::Result<RemediationRun> {
    let status_str: String = row.get(9)?;
    let parameters: String = row.get(5)?;
    let completed: Option<String> = row.get(11)?;
    Ok(RemediationRun {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        playbook_code: row.get(2)?,
        recommendation_id: row.get(3)?,
        auto_triggered: row.get(4)?,
        parameters: serde_json::from_str(&parameters)
            .map_err(|e| conversion_err(e.to_string()))?,
        confidence_before: row.get(6)?,
        confidence_after: row.get(7)?,
        impact: row.get(8)?,
        status: RunStatus::from_str(&status_str)
            .ok_or_else(|| conversion_err(format!("bad run status {:?}", status_str)))?,
        started_at: parse_ts(&row.get::<_, String>(10)?)?,
        completed_at: completed.as_deref().map(parse_ts).transpose()?,
    })
}

fn row_to_experiment(row: &Row) -> rusqlite::Result<ModelExperiment> {
    let status_str: String = row.get(5)?;
    let variant: String = row.get(3)?;
    Ok(ModelExperiment {
        id: row.get(0)?,
        name: row.get(1)?,
        family: row.get(2)?,
        variant: serde_json::from_str(&variant).map_err(|e| conversion_err(e.to_string()))?,
        allocation: row.get(4)?,
        status: ExperimentStatus::from_str(&status_str)
            .ok_or_else(|| conversion_err(format!("bad experiment status {:?}", status_str)))?,
        owner: row.get(6)?,
        notes: row.get(7)?,
        created_at: parse_ts(&row.get::<_, String>(8)?)?,
    })
}

fn row_to_job(row: &Row) -> rusqlite::Result<TrainingJob> {
    let status_str: String = row.get(3)?;
    let before: String = row.get(5)?;
    let after: Option<String> = row.get(6)?;
    let completed: Option<String> = row.get(9)?;
    Ok(TrainingJob {
        id: row.get(0)?,
        family: row.get(1)?,
        target_version: row.get(2)?,
        status: TrainingStatus::from_str(&status_str)
            .ok_or_else(|| conversion_err(format!("bad job status {:?}", status_str)))?,
        trigger_reason: row.get(4)?,
        metrics_before: serde_json::from_str(&before).map_err(|e| conversion_err(e.to_string()))?,
        metrics_after: after
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| conversion_err(e.to_string()))?,
        logs: row.get(7)?,
        created_at: parse_ts(&row.get::<_, String>(8)?)?,
        completed_at: completed.as_deref().map(parse_ts).transpose()?,
    })
}

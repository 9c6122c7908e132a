// core/types.rs
// Closed enums for every string-typed concept in the pipeline.
// Statuses and operators are stored as their snake_case string form in
// SQLite, so each enum carries as_str/from_str alongside serde.

use serde::{Deserialize, Serialize};

/// Outcome of a single compliance check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Warn,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Warn => "warn",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(Outcome::Pass),
            "fail" => Some(Outcome::Fail),
            "warn" => Some(Outcome::Warn),
            _ => None,
        }
    }
}

/// Forecast risk level for the upcoming 7-day window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

/// Playbook severity class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Lifecycle of a generated recommendation.
///
/// `Applied` and `Dismissed` are terminal. `Snoozed` flips back to `Open`
/// when `snooze_until` passes (swept at the start of the recommendation job).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Open,
    Applied,
    Dismissed,
    Snoozed,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Open => "open",
            RecommendationStatus::Applied => "applied",
            RecommendationStatus::Dismissed => "dismissed",
            RecommendationStatus::Snoozed => "snoozed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(RecommendationStatus::Open),
            "applied" => Some(RecommendationStatus::Applied),
            "dismissed" => Some(RecommendationStatus::Dismissed),
            "snoozed" => Some(RecommendationStatus::Snoozed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecommendationStatus::Applied | RecommendationStatus::Dismissed
        )
    }
}

/// Remediation run state machine: pending -> executing -> {success, failed}.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Executing,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Executing => "executing",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "executing" => Some(RunStatus::Executing),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Valid forward transitions only.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Executing)
                | (RunStatus::Executing, RunStatus::Success)
                | (RunStatus::Executing, RunStatus::Failed)
        )
    }
}

/// Comparison operator in a playbook trigger condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Gt,
    Lt,
    AbsGt,
    /// Permissive membership check: matches whenever the signal exists.
    In,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Gt => "gt",
            ConditionOperator::Lt => "lt",
            ConditionOperator::AbsGt => "abs_gt",
            ConditionOperator::In => "in",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "gt" => Some(ConditionOperator::Gt),
            "lt" => Some(ConditionOperator::Lt),
            "abs_gt" => Some(ConditionOperator::AbsGt),
            "in" => Some(ConditionOperator::In),
            _ => None,
        }
    }
}

/// Remediation action template kinds (executed by an external collaborator).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateTask,
    NotifyTeam,
    UpdateFlag,
    InvokeFunction,
    Rollback,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateTask => "create_task",
            ActionKind::NotifyTeam => "notify_team",
            ActionKind::UpdateFlag => "update_flag",
            ActionKind::InvokeFunction => "invoke_function",
            ActionKind::Rollback => "rollback",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create_task" => Some(ActionKind::CreateTask),
            "notify_team" => Some(ActionKind::NotifyTeam),
            "update_flag" => Some(ActionKind::UpdateFlag),
            "invoke_function" => Some(ActionKind::InvokeFunction),
            "rollback" => Some(ActionKind::Rollback),
            _ => None,
        }
    }
}

/// Canary experiment lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Ended,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Ended => "ended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ExperimentStatus::Draft),
            "running" => Some(ExperimentStatus::Running),
            "ended" => Some(ExperimentStatus::Ended),
            _ => None,
        }
    }
}

/// Training job lifecycle. Jobs always terminate in succeeded or failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Queued => "queued",
            TrainingStatus::Running => "running",
            TrainingStatus::Succeeded => "succeeded",
            TrainingStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TrainingStatus::Queued),
            "running" => Some(TrainingStatus::Running),
            "succeeded" => Some(TrainingStatus::Succeeded),
            "failed" => Some(TrainingStatus::Failed),
            _ => None,
        }
    }
}

/// Human feedback on an explainability insight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Useful,
    NotUseful,
    Irrelevant,
}

impl FeedbackKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "useful" => Some(FeedbackKind::Useful),
            "not_useful" => Some(FeedbackKind::NotUseful),
            "irrelevant" => Some(FeedbackKind::Irrelevant),
            _ => None,
        }
    }
}

// Action executor: carries out a playbook's action for a remediation run.
//
// Every action is dispatched through this one seam so the orchestrator and
// the manual apply handler share identical execution semantics. The concrete
// integrations (ticketing, chat, feature flags) are stubbed as structured log
// lines plus a detail string stored in the action audit trail.

use autopilot_core::{ActionKind, EngineError, EngineResult, PlaybookEntry, RemediationRun};

pub struct ActionExecutor;

/// What the executor actually did, recorded in the audit trail.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub action: ActionKind,
    pub detail: String,
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(
        &self,
        playbook: &PlaybookEntry,
        run: &RemediationRun,
    ) -> EngineResult<ExecutionReport> {
        let detail = match playbook.action {
            ActionKind::CreateTask => {
                let queue = param(&playbook.action_params, "queue", "compliance-default");
                tracing::info!(
                    tenant = %run.tenant_id,
                    playbook = %run.playbook_code,
                    queue = %queue,
                    "creating remediation task"
                );
                format!("created task in queue '{}'", queue)
            }
            ActionKind::NotifyTeam => {
                let channel = param(&playbook.action_params, "channel", "compliance-ops");
                notify_team(&channel, &run.tenant_id, &playbook.title);
                format!("notified channel '{}'", channel)
            }
            ActionKind::UpdateFlag => {
                let flag = param(&playbook.action_params, "flag", "");
                if flag.is_empty() {
                    return Err(EngineError::Executor(format!(
                        "playbook {} has no flag parameter",
                        playbook.code
                    )));
                }
                tracing::info!(
                    tenant = %run.tenant_id,
                    flag = %flag,
                    "setting review flag"
                );
                format!("set flag '{}'", flag)
            }
            ActionKind::InvokeFunction => {
                let function = param(&playbook.action_params, "function", "");
                if function.is_empty() {
                    return Err(EngineError::Executor(format!(
                        "playbook {} has no function parameter",
                        playbook.code
                    )));
                }
                tracing::info!(
                    tenant = %run.tenant_id,
                    function = %function,
                    "invoking remediation function"
                );
                format!("invoked function '{}'", function)
            }
            ActionKind::Rollback => {
                let scope = param(&playbook.action_params, "scope", "rule_group");
                tracing::info!(
                    tenant = %run.tenant_id,
                    playbook = %run.playbook_code,
                    scope = %scope,
                    "rolling back last policy change"
                );
                format!("rolled back last policy change (scope '{}')", scope)
            }
        };

        Ok(ExecutionReport {
            action: playbook.action,
            detail,
        })
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Notifier stub: one structured log line per outbound message.
pub fn notify_team(channel: &str, tenant_id: &str, subject: &str) {
    tracing::info!(
        channel = %channel,
        tenant = %tenant_id,
        subject = %subject,
        "team notification queued"
    );
}

fn param(params: &serde_json::Value, key: &str, default: &str) -> String {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

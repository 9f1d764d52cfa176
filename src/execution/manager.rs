//! Staged execution of plans with confirmation and interruption hooks.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::plan::{ExecutionPlan, PlannedTool};
use crate::permission::{AllowAll, PermissionGate};
use crate::session::SessionContext;
use crate::tools::{ToolExecutionResult, ToolRegistry};
use crate::types::ToolCall;

/// Sessions untouched for this long are dropped by [`ExecutionManager::reap_expired`].
const SESSION_TTL_HOURS: i64 = 24;

/// Lifecycle stage of an execution session. Transitions are forward-only;
/// `Cancelled` is reachable from any non-terminal stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStage {
    Planning,
    Confirming,
    Executing,
    Reviewing,
    Completed,
    Cancelled,
}

impl SessionStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// What the user chose when a tool in the plan failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptChoice {
    Retry,
    Skip,
    Cancel,
}

/// Tracked progress of one plan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSession {
    pub id: Uuid,
    pub plan: ExecutionPlan,
    pub stage: SessionStage,
    pub current_tool_index: usize,
    pub results: Vec<ToolExecutionResult>,
    pub user_choices: Vec<InterruptChoice>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionSession {
    fn new(plan: ExecutionPlan) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            plan,
            stage: SessionStage::Planning,
            current_tool_index: 0,
            results: Vec::new(),
            user_choices: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to the next stage. Backward or terminal-escaping moves are
    /// ignored with a warning rather than corrupting the session.
    fn set_stage(&mut self, next: SessionStage) {
        let allowed = !self.stage.is_terminal()
            && (next > self.stage || next == SessionStage::Cancelled);
        if allowed {
            self.stage = next;
            self.updated_at = Utc::now();
        } else {
            warn!(from = %self.stage, to = %next, "ignoring illegal stage transition");
        }
    }
}

pub type ConfirmHandler =
    Arc<dyn Fn(ExecutionPlan) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;
pub type InterruptHandler = Arc<
    dyn Fn(PlannedTool, String) -> Pin<Box<dyn Future<Output = InterruptChoice> + Send>>
        + Send
        + Sync,
>;

/// Hooks and switches for one interactive run.
#[derive(Clone, Default)]
pub struct InteractiveOptions {
    pub require_confirmation: bool,
    pub allow_interruption: bool,
    pub confirm: Option<ConfirmHandler>,
    pub on_interrupt: Option<InterruptHandler>,
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for InteractiveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveOptions")
            .field("require_confirmation", &self.require_confirmation)
            .field("allow_interruption", &self.allow_interruption)
            .field("has_confirm", &self.confirm.is_some())
            .field("has_on_interrupt", &self.on_interrupt.is_some())
            .finish()
    }
}

/// Runs execution plans and retains their sessions in memory.
pub struct ExecutionManager {
    registry: Arc<ToolRegistry>,
    gate: Arc<dyn PermissionGate>,
    sessions: RwLock<HashMap<Uuid, ExecutionSession>>,
}

impl ExecutionManager {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_gate(registry, Arc::new(AllowAll))
    }

    pub fn with_gate(registry: Arc<ToolRegistry>, gate: Arc<dyn PermissionGate>) -> Self {
        Self {
            registry,
            gate,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Run a plan through confirm, execute, review. Returns the finished
    /// session; the same session stays retrievable by id until reaped.
    pub async fn start_interactive_execution(
        &self,
        plan: ExecutionPlan,
        session_ctx: &SessionContext,
        opts: InteractiveOptions,
    ) -> ExecutionSession {
        let mut session = ExecutionSession::new(plan);
        debug!(session_id = %session.id, tools = session.plan.tools.len(), "starting plan");

        session.set_stage(SessionStage::Confirming);
        if session.require_declined(&opts).await {
            session.set_stage(SessionStage::Cancelled);
            return self.store(session);
        }

        session.set_stage(SessionStage::Executing);
        let tools = session.plan.tools.clone();
        'plan: for (index, planned) in tools.iter().enumerate() {
            session.current_tool_index = index;
            loop {
                if opts.cancel.is_cancelled() {
                    session.set_stage(SessionStage::Cancelled);
                    return self.store(session);
                }
                let call = ToolCall::new(
                    Uuid::new_v4().to_string(),
                    &planned.tool_name,
                    planned.parameters.clone(),
                );
                let result = self
                    .registry
                    .execute_tool(&call, self.gate.as_ref(), session_ctx, opts.cancel.child_token())
                    .await;
                let failed = !result.succeeded();
                let error = result.error.clone().unwrap_or_default();
                session.results.push(result);
                session.updated_at = Utc::now();
                if !failed {
                    break;
                }
                let Some(handler) = opts
                    .allow_interruption
                    .then_some(opts.on_interrupt.as_ref())
                    .flatten()
                else {
                    break;
                };
                let choice = handler(planned.clone(), error).await;
                session.user_choices.push(choice);
                match choice {
                    InterruptChoice::Retry => continue,
                    InterruptChoice::Skip => break,
                    InterruptChoice::Cancel => {
                        session.set_stage(SessionStage::Cancelled);
                        break 'plan;
                    }
                }
            }
        }

        if session.stage != SessionStage::Cancelled {
            session.current_tool_index = session.plan.tools.len();
            session.set_stage(SessionStage::Reviewing);
            session.set_stage(SessionStage::Completed);
        }
        self.store(session)
    }

    pub fn get_session(&self, id: Uuid) -> Option<ExecutionSession> {
        self.sessions.read().expect("session lock").get(&id).cloned()
    }

    /// Drop sessions idle past the retention window. Returns how many.
    pub fn reap_expired(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(SESSION_TTL_HOURS);
        let mut sessions = self.sessions.write().expect("session lock");
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at > cutoff);
        before - sessions.len()
    }

    fn store(&self, session: ExecutionSession) -> ExecutionSession {
        self.sessions
            .write()
            .expect("session lock")
            .insert(session.id, session.clone());
        session
    }
}

impl ExecutionSession {
    async fn require_declined(&self, opts: &InteractiveOptions) -> bool {
        if !opts.require_confirmation {
            return false;
        }
        match &opts.confirm {
            Some(confirm) => !confirm(self.plan.clone()).await,
            None => {
                debug!("confirmation required but no handler attached, proceeding");
                false
            }
        }
    }
}

impl std::fmt::Debug for ExecutionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionManager")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuillError;
    use crate::execution::plan::create_execution_plan;
    use crate::tools::FnTool;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(
            FnTool::new("Read", "read", json!({"type": "object"}), |_a, _c| async move {
                Ok(json!("contents"))
            })
            .read_only(),
        ));
        registry.register(Arc::new(
            FnTool::new("Flaky", "fails", json!({"type": "object"}), |_a, _c| async move {
                Err::<serde_json::Value, _>(QuillError::ToolExecution {
                    tool_name: "Flaky".to_owned(),
                    message: "boom".to_owned(),
                })
            })
            .read_only(),
        ));
        Arc::new(registry)
    }

    fn plan_of(names: &[&str]) -> ExecutionPlan {
        let calls: Vec<ToolCall> = names
            .iter()
            .enumerate()
            .map(|(i, n)| ToolCall::new(format!("c{i}"), *n, json!({})))
            .collect();
        create_execution_plan(&calls)
    }

    #[tokio::test]
    async fn plan_runs_to_completed() {
        let manager = ExecutionManager::new(registry());
        let ctx = SessionContext::new("s");
        let session = manager
            .start_interactive_execution(plan_of(&["Read", "Read"]), &ctx, Default::default())
            .await;
        assert_eq!(session.stage, SessionStage::Completed);
        assert_eq!(session.results.len(), 2);
        assert!(session.results.iter().all(|r| r.succeeded()));
        assert!(manager.get_session(session.id).is_some());
    }

    #[tokio::test]
    async fn declined_confirmation_cancels_before_execution() {
        let manager = ExecutionManager::new(registry());
        let ctx = SessionContext::new("s");
        let opts = InteractiveOptions {
            require_confirmation: true,
            confirm: Some(Arc::new(|_plan| Box::pin(async { false }))),
            ..Default::default()
        };
        let session = manager
            .start_interactive_execution(plan_of(&["Read"]), &ctx, opts)
            .await;
        assert_eq!(session.stage, SessionStage::Cancelled);
        assert!(session.results.is_empty());
    }

    #[tokio::test]
    async fn retry_then_skip_on_failure() {
        let manager = ExecutionManager::new(registry());
        let ctx = SessionContext::new("s");
        let asked = Arc::new(AtomicUsize::new(0));
        let counter = asked.clone();
        let opts = InteractiveOptions {
            allow_interruption: true,
            on_interrupt: Some(Arc::new(move |_tool, _err| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n == 0 {
                        InterruptChoice::Retry
                    } else {
                        InterruptChoice::Skip
                    }
                })
            })),
            ..Default::default()
        };
        let session = manager
            .start_interactive_execution(plan_of(&["Flaky", "Read"]), &ctx, opts)
            .await;
        assert_eq!(session.stage, SessionStage::Completed);
        // Flaky ran twice (initial + one retry), then skipped; Read still ran.
        assert_eq!(session.results.len(), 3);
        assert!(session.results.last().unwrap().succeeded());
        assert_eq!(
            session.user_choices,
            vec![InterruptChoice::Retry, InterruptChoice::Skip]
        );
    }

    #[tokio::test]
    async fn cancel_choice_halts_remaining_tools() {
        let manager = ExecutionManager::new(registry());
        let ctx = SessionContext::new("s");
        let opts = InteractiveOptions {
            allow_interruption: true,
            on_interrupt: Some(Arc::new(|_tool, _err| {
                Box::pin(async { InterruptChoice::Cancel })
            })),
            ..Default::default()
        };
        let session = manager
            .start_interactive_execution(plan_of(&["Flaky", "Read"]), &ctx, opts)
            .await;
        assert_eq!(session.stage, SessionStage::Cancelled);
        assert_eq!(session.results.len(), 1);
    }

    #[tokio::test]
    async fn reap_removes_idle_sessions() {
        let manager = ExecutionManager::new(registry());
        let ctx = SessionContext::new("s");
        let session = manager
            .start_interactive_execution(plan_of(&["Read"]), &ctx, Default::default())
            .await;
        assert_eq!(manager.reap_expired(), 0);
        {
            let mut sessions = manager.sessions.write().unwrap();
            let stored = sessions.get_mut(&session.id).unwrap();
            stored.updated_at = Utc::now() - Duration::hours(SESSION_TTL_HOURS + 1);
        }
        assert_eq!(manager.reap_expired(), 1);
        assert!(manager.get_session(session.id).is_none());
    }

    #[test]
    fn stage_transitions_are_monotonic() {
        let mut session = ExecutionSession::new(plan_of(&["Read"]));
        session.set_stage(SessionStage::Confirming);
        session.set_stage(SessionStage::Planning); // ignored
        assert_eq!(session.stage, SessionStage::Confirming);
        session.set_stage(SessionStage::Cancelled);
        session.set_stage(SessionStage::Executing); // terminal, ignored
        assert_eq!(session.stage, SessionStage::Cancelled);
    }
}

//! Tool registry with two-tier name lookup and gated execution.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::repair::safe_parse_arguments;
use super::status::ToolExecutionResult;
use super::tool::{Tool, ToolExecutionContext};
use super::validation::validate_arguments;
use crate::permission::{PermissionDecision, PermissionGate, PermissionRequest};
use crate::provider::ToolDefinition;
use crate::session::SessionContext;
use crate::types::ToolCall;

/// Holds the callable tools for a coordinator.
///
/// Names resolve against the primary table first; the legacy table exists
/// for renamed tools whose old names still appear in model output.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    legacy: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Register an additional name for an already-known tool.
    pub fn register_legacy(&mut self, old_name: impl Into<String>, tool: Arc<dyn Tool>) {
        self.legacy.insert(old_name.into(), tool);
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        if let Some(tool) = self.tools.get(name) {
            return Some(tool);
        }
        let tool = self.legacy.get(name)?;
        warn!(legacy = name, current = tool.name(), "tool resolved via legacy name");
        Some(tool)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Wire-level definitions for the provider request. `allowed` filters by
    /// name when present; `None` exposes every registered tool.
    pub fn definitions(&self, allowed: Option<&[String]>) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|tool| match allowed {
                Some(names) => names.iter().any(|n| n == tool.name()),
                None => true,
            })
            .map(|tool| ToolDefinition {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameters().clone(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute one model-issued tool call.
    ///
    /// Never returns an error: every failure mode (unknown tool, unrepairable
    /// arguments, schema violation, permission denial, tool error,
    /// cancellation) is folded into the returned [`ToolExecutionResult`] so
    /// the conversation can continue with an error tool-result message.
    pub async fn execute_tool(
        &self,
        call: &ToolCall,
        gate: &dyn PermissionGate,
        session: &SessionContext,
        cancel: CancellationToken,
    ) -> ToolExecutionResult {
        let record = ToolExecutionResult::pending(call);

        let Some(tool) = self.lookup(&call.tool_name) else {
            return record.fail(format!("unknown tool '{}'", call.tool_name));
        };

        // Providers keep unparseable argument payloads as raw strings so the
        // repair pipeline gets a chance at them here.
        let parameters = match &call.parameters {
            serde_json::Value::String(raw) => match safe_parse_arguments(raw) {
                Ok(value) => value,
                Err(e) => return record.fail(e.to_string()),
            },
            other => other.clone(),
        };

        if let Err(violation) = validate_arguments(&parameters, tool.parameters()) {
            return record.fail(format!("invalid arguments: {violation}"));
        }

        if !tool.is_read_only() {
            if session.permissions.is_granted(tool.name()) {
                debug!(tool = tool.name(), "session grant covers call");
            } else {
                let request = PermissionRequest::new(
                    tool.name(),
                    tool.description(),
                    parameters.clone(),
                );
                match gate.check(&request) {
                    PermissionDecision::Deny => {
                        return record.fail(format!(
                            "permission denied for tool '{}'",
                            tool.name()
                        ));
                    }
                    PermissionDecision::AllowSession => {
                        session.permissions.grant(tool.name());
                    }
                    PermissionDecision::Allow => {}
                }
            }
        }

        let record = record.start();
        let args = ToolArguments::new(parameters);
        let ctx = ToolExecutionContext {
            cancel: cancel.clone(),
            call_id: Some(call.call_id.clone()),
            tool_name: Some(tool.name().to_owned()),
            session_id: Some(session.id.clone()),
        };

        debug!(tool = tool.name(), call_id = %call.call_id, "executing tool");
        tokio::select! {
            _ = cancel.cancelled() => record.cancel(),
            outcome = tool.execute(&args, &ctx) => match outcome {
                Ok(value) => record.complete(value),
                Err(e) => record.fail(e.to_string()),
            },
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("legacy", &self.legacy.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{AllowAll, StaticGate};
    use crate::tools::status::ExecutionStatus;
    use crate::tools::FnTool;
    use serde_json::json;
    use std::time::Duration;

    fn echo_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"],
        })
    }

    fn registry_with_echo() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(
            FnTool::new("Echo", "echo text back", echo_schema(), |args, _ctx| async move {
                Ok(json!({ "echoed": args.get_str("text")? }))
            })
            .read_only(),
        ));
        registry
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let registry = registry_with_echo();
        let session = SessionContext::new("s");
        let call = ToolCall::new("c1", "Echo", json!({"text": "hi"}));
        let result = registry
            .execute_tool(&call, &AllowAll, &session, CancellationToken::new())
            .await;
        assert!(result.succeeded());
        assert_eq!(result.result.unwrap()["echoed"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_erroring() {
        let registry = registry_with_echo();
        let session = SessionContext::new("s");
        let call = ToolCall::new("c1", "Vanish", json!({}));
        let result = registry
            .execute_tool(&call, &AllowAll, &session, CancellationToken::new())
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn string_arguments_run_through_repair() {
        let registry = registry_with_echo();
        let session = SessionContext::new("s");
        // Raw newline inside the JSON string, as models emit.
        let call = ToolCall::new(
            "c1",
            "Echo",
            serde_json::Value::String("{\"text\": \"a\nb\"}".to_owned()),
        );
        let result = registry
            .execute_tool(&call, &AllowAll, &session, CancellationToken::new())
            .await;
        assert!(result.succeeded());
        assert_eq!(result.result.unwrap()["echoed"], "a\nb");
    }

    #[tokio::test]
    async fn schema_violation_fails_before_execution() {
        let registry = registry_with_echo();
        let session = SessionContext::new("s");
        let call = ToolCall::new("c1", "Echo", json!({"text": 42}));
        let result = registry
            .execute_tool(&call, &AllowAll, &session, CancellationToken::new())
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn denied_mutating_tool_never_runs() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(
            "Write",
            "write a file",
            json!({"type": "object"}),
            |_args, _ctx| async move { panic!("must not execute") },
        )));
        let session = SessionContext::new("s");
        let call = ToolCall::new("c1", "Write", json!({"path": "a"}));
        let result = registry
            .execute_tool(
                &call,
                &StaticGate(PermissionDecision::Deny),
                &session,
                CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error.unwrap().contains("permission denied"));
    }

    #[tokio::test]
    async fn allow_session_caches_the_grant() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(
            "Write",
            "write a file",
            json!({"type": "object"}),
            |_args, _ctx| async move { Ok(json!("ok")) },
        )));
        let session = SessionContext::new("s");
        let call = ToolCall::new("c1", "Write", json!({}));

        let first = registry
            .execute_tool(
                &call,
                &StaticGate(PermissionDecision::AllowSession),
                &session,
                CancellationToken::new(),
            )
            .await;
        assert!(first.succeeded());
        assert!(session.permissions.is_granted("Write"));

        // A now-denying gate is bypassed by the cached grant.
        let second = registry
            .execute_tool(
                &call,
                &StaticGate(PermissionDecision::Deny),
                &session,
                CancellationToken::new(),
            )
            .await;
        assert!(second.succeeded());
    }

    #[tokio::test]
    async fn cancellation_wins_the_race() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(
            FnTool::new("Slow", "sleeps", json!({"type": "object"}), |_args, _ctx| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!("done"))
            })
            .read_only(),
        ));
        let session = SessionContext::new("s");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let call = ToolCall::new("c1", "Slow", json!({}));
        let result = registry
            .execute_tool(&call, &AllowAll, &session, cancel)
            .await;
        assert_eq!(result.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn legacy_name_resolves() {
        let mut registry = registry_with_echo();
        let tool = registry.lookup("Echo").unwrap().clone();
        registry.register_legacy("echo_text", tool);
        assert_eq!(registry.lookup("echo_text").unwrap().name(), "Echo");
        // Legacy names do not show up in wire definitions.
        assert_eq!(registry.definitions(None).len(), 1);
    }

    #[test]
    fn definitions_respect_allowed_filter() {
        let registry = registry_with_echo();
        let defs = registry.definitions(Some(&["Echo".to_owned()]));
        assert_eq!(defs.len(), 1);
        let defs = registry.definitions(Some(&["Other".to_owned()]));
        assert!(defs.is_empty());
    }
}

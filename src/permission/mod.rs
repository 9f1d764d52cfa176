//! Permission gating for mutating tool calls.
//!
//! Read-only tools bypass the gate entirely. Everything else is presented
//! to a [`PermissionGate`] before execution; a gate is typically backed by
//! an interactive prompt in the host application, but the decision protocol
//! itself is synchronous and host-agnostic.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the user (or policy) decided about a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    /// Allow this call only.
    Allow,
    /// Allow this call and remember the grant for the rest of the session.
    AllowSession,
    /// Refuse the call.
    Deny,
}

impl PermissionDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow | Self::AllowSession)
    }
}

/// A single tool call awaiting a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: Uuid,
    pub tool_name: String,
    /// File path the call touches, when one can be read from the arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub description: String,
    pub args: serde_json::Value,
}

impl PermissionRequest {
    pub fn new(
        tool_name: impl Into<String>,
        description: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        let file_path = args
            .get("path")
            .or_else(|| args.get("file_path"))
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        Self {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            file_path,
            description: description.into(),
            args,
        }
    }
}

/// Decides whether a mutating tool call may run.
pub trait PermissionGate: Send + Sync {
    fn check(&self, request: &PermissionRequest) -> PermissionDecision;
}

/// Gate that approves everything. The default for non-interactive hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn check(&self, _request: &PermissionRequest) -> PermissionDecision {
        PermissionDecision::Allow
    }
}

/// Gate returning one fixed decision. Useful in tests and lockdown modes.
#[derive(Debug, Clone, Copy)]
pub struct StaticGate(pub PermissionDecision);

impl PermissionGate for StaticGate {
    fn check(&self, _request: &PermissionRequest) -> PermissionDecision {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_lifted_from_arguments() {
        let req = PermissionRequest::new(
            "Write",
            "write chapter draft",
            serde_json::json!({"path": "draft.md", "content": "..."}),
        );
        assert_eq!(req.file_path.as_deref(), Some("draft.md"));

        let req = PermissionRequest::new("Bash", "run command", serde_json::json!({"cmd": "ls"}));
        assert_eq!(req.file_path, None);
    }

    #[test]
    fn decision_allowance() {
        assert!(PermissionDecision::Allow.is_allowed());
        assert!(PermissionDecision::AllowSession.is_allowed());
        assert!(!PermissionDecision::Deny.is_allowed());
    }
}

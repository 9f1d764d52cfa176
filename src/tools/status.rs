//! Tool execution status machine and result record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::error::QuillError;
use crate::types::ToolCall;

/// Execution status. PENDING→RUNNING→{COMPLETED|FAILED|CANCELLED};
/// terminal states are final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn can_transition_to(self, next: ExecutionStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// Record of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub tool_name: String,
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ToolExecutionResult {
    pub fn pending(call: &ToolCall) -> Self {
        Self {
            tool_name: call.tool_name.clone(),
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            result: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Advance the status machine; terminal states cannot be re-entered.
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), QuillError> {
        if !self.status.can_transition_to(next) {
            return Err(QuillError::InvalidState(format!(
                "illegal execution status transition {} -> {}",
                self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Mark running. No-op unless pending.
    pub fn start(mut self) -> Self {
        if self.status == ExecutionStatus::Pending {
            self.status = ExecutionStatus::Running;
        }
        self
    }

    /// Mark completed with a result value. No-op once terminal.
    pub fn complete(mut self, value: serde_json::Value) -> Self {
        self.result = Some(value);
        self.finish(ExecutionStatus::Completed)
    }

    /// Mark failed with an error message. No-op once terminal.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self.finish(ExecutionStatus::Failed)
    }

    /// Mark cancelled. No-op once terminal.
    pub fn cancel(self) -> Self {
        self.finish(ExecutionStatus::Cancelled)
    }

    fn finish(mut self, status: ExecutionStatus) -> Self {
        if !self.status.is_terminal() {
            self.status = status;
            self.finished_at = Some(Utc::now());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ToolExecutionResult {
        ToolExecutionResult::pending(&ToolCall::new("c1", "Write", serde_json::json!({})))
    }

    #[test]
    fn happy_path_runs_to_completed() {
        let mut r = result();
        r.transition(ExecutionStatus::Running).unwrap();
        r.transition(ExecutionStatus::Completed).unwrap();
        assert!(r.succeeded());
        assert!(r.finished_at.is_some());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut r = result();
        r.transition(ExecutionStatus::Running).unwrap();
        r.transition(ExecutionStatus::Failed).unwrap();
        for next in [
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Cancelled,
        ] {
            assert!(r.transition(next).is_err(), "re-entered via {next}");
        }
        assert_eq!(r.status, ExecutionStatus::Failed);
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        let mut r = result();
        assert!(r.transition(ExecutionStatus::Completed).is_err());
        // But it can be cancelled before it starts.
        r.transition(ExecutionStatus::Cancelled).unwrap();
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_value(ExecutionStatus::Cancelled).unwrap();
        assert_eq!(json, "CANCELLED");
    }
}

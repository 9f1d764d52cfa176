//! Execution plans built from batches of tool calls.

use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::types::ToolCall;

/// Heuristic risk of running a tool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One tool invocation inside a plan, annotated for display and confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTool {
    pub tool_name: String,
    pub parameters: serde_json::Value,
    pub description: String,
    pub estimated_time_ms: u64,
    pub risk_level: RiskLevel,
    /// Indices of earlier plan entries this one depends on. Plans built from
    /// a model round run strictly in order, so each entry depends on all of
    /// its predecessors.
    pub dependencies: Vec<usize>,
    pub preview_available: bool,
}

/// Ordered batch of planned tools with aggregate annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: Uuid,
    pub title: String,
    pub tools: Vec<PlannedTool>,
    pub estimated_time_ms: u64,
    pub risk_level: RiskLevel,
    pub reversible: bool,
}

fn tool_risk(name: &str) -> RiskLevel {
    match name {
        "Read" | "Grep" | "Glob" => RiskLevel::Low,
        "Write" | "Edit" => RiskLevel::Medium,
        "Bash" => RiskLevel::High,
        _ => RiskLevel::Medium,
    }
}

fn tool_duration_ms(name: &str) -> u64 {
    match name {
        "Read" | "Grep" | "Glob" => 500,
        "Write" | "Edit" => 1_500,
        "Bash" => 5_000,
        _ => 2_000,
    }
}

fn tool_mutates(name: &str) -> bool {
    tool_risk(name) > RiskLevel::Low
}

fn preview_available(name: &str) -> bool {
    matches!(name, "Write" | "Edit")
}

fn describe(call: &ToolCall) -> String {
    let target = call
        .parameters
        .get("path")
        .or_else(|| call.parameters.get("file_path"))
        .or_else(|| call.parameters.get("command"))
        .and_then(|v| v.as_str());
    match target {
        Some(target) => format!("{}: {target}", call.tool_name),
        None => call.tool_name.clone(),
    }
}

/// Annotate a batch of tool calls into an ordered plan.
pub fn create_execution_plan(calls: &[ToolCall]) -> ExecutionPlan {
    let tools: Vec<PlannedTool> = calls
        .iter()
        .enumerate()
        .map(|(index, call)| PlannedTool {
            tool_name: call.tool_name.clone(),
            parameters: call.parameters.clone(),
            description: describe(call),
            estimated_time_ms: tool_duration_ms(&call.tool_name),
            risk_level: tool_risk(&call.tool_name),
            dependencies: (0..index).collect(),
            preview_available: preview_available(&call.tool_name),
        })
        .collect();

    let estimated_time_ms = tools.iter().map(|t| t.estimated_time_ms).sum();
    let risk_level = tools
        .iter()
        .map(|t| t.risk_level)
        .max()
        .unwrap_or(RiskLevel::Low);
    let reversible = !tools.iter().any(|t| tool_mutates(&t.tool_name));

    ExecutionPlan {
        id: Uuid::new_v4(),
        title: match tools.len() {
            0 => "empty plan".to_owned(),
            1 => tools[0].description.clone(),
            n => format!("{n} tool calls"),
        },
        tools,
        estimated_time_ms,
        risk_level,
        reversible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn risk_and_duration_heuristics() {
        let calls = [
            ToolCall::new("c1", "Read", json!({"path": "a.md"})),
            ToolCall::new("c2", "Write", json!({"path": "b.md"})),
            ToolCall::new("c3", "Bash", json!({"command": "wc -l b.md"})),
        ];
        let plan = create_execution_plan(&calls);
        assert_eq!(plan.tools[0].risk_level, RiskLevel::Low);
        assert_eq!(plan.tools[1].risk_level, RiskLevel::Medium);
        assert_eq!(plan.tools[2].risk_level, RiskLevel::High);
        assert_eq!(plan.risk_level, RiskLevel::High);
        assert!(!plan.reversible);
        assert_eq!(plan.estimated_time_ms, 500 + 1_500 + 5_000);
    }

    #[test]
    fn read_only_plan_is_reversible() {
        let calls = [
            ToolCall::new("c1", "Grep", json!({"pattern": "foo"})),
            ToolCall::new("c2", "Glob", json!({"pattern": "*.md"})),
        ];
        let plan = create_execution_plan(&calls);
        assert!(plan.reversible);
        assert_eq!(plan.risk_level, RiskLevel::Low);
    }

    #[test]
    fn unknown_tool_defaults_to_medium() {
        let plan = create_execution_plan(&[ToolCall::new("c1", "Mystery", json!({}))]);
        assert_eq!(plan.tools[0].risk_level, RiskLevel::Medium);
        assert_eq!(plan.tools[0].estimated_time_ms, 2_000);
    }

    #[test]
    fn dependencies_chain_in_order() {
        let calls = [
            ToolCall::new("c1", "Read", json!({})),
            ToolCall::new("c2", "Edit", json!({})),
            ToolCall::new("c3", "Read", json!({})),
        ];
        let plan = create_execution_plan(&calls);
        assert!(plan.tools[0].dependencies.is_empty());
        assert_eq!(plan.tools[2].dependencies, vec![0, 1]);
    }
}

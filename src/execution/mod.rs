//! Interactive execution of tool-call batches.
//!
//! A batch of model-issued tool calls becomes an [`ExecutionPlan`] with
//! per-tool risk and duration annotations, then runs through a staged
//! confirm, execute, review lifecycle with per-tool interruption choices.

pub mod manager;
pub mod plan;

pub use manager::{
    ExecutionManager, ExecutionSession, InteractiveOptions, InterruptChoice, SessionStage,
};
pub use plan::{create_execution_plan, ExecutionPlan, PlannedTool, RiskLevel};

//! Convenience re-exports for typical usage.

pub use crate::config::Config;
pub use crate::content::{ContentBlock, ContentLabel};
pub use crate::coordinator::{Coordinator, LoopLimits};
pub use crate::error::{QuillError, Result};
pub use crate::execution::{create_execution_plan, ExecutionManager, InteractiveOptions};
pub use crate::permission::{AllowAll, PermissionDecision, PermissionGate, PermissionRequest};
pub use crate::provider::{ModelProvider, ProviderKind};
pub use crate::session::{SessionContext, WritingPhase};
pub use crate::tools::{FnTool, Tool, ToolArguments, ToolExecutionResult, ToolRegistry};
pub use crate::types::{AIRequest, AIResponse, ModelMessage, StreamMessage, ToolCall, Usage};

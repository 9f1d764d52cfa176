//! Tool system: registry, execution status machine, argument handling.

pub mod arguments;
pub mod registry;
pub mod repair;
pub mod status;
pub mod tool;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::ToolRegistry;
pub use status::{ExecutionStatus, ToolExecutionResult};
pub use tool::{FnTool, Tool, ToolExecutionContext};

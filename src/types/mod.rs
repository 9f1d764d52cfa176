//! Core data model shared across the orchestration layers.

pub mod message;
pub mod request;
pub mod stream;
pub mod usage;

pub use message::{ContentPart, ModelMessage, Role, ToolCall, ToolResultPart};
pub use request::{AIRequest, AIResponse, StreamingStats, TokenCallback};
pub use stream::{FinishReason, StreamDelta, StreamEventType, StreamMessage};
pub use usage::{Cost, Usage};

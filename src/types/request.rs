//! Public request/response types at the coordinator boundary.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content::ContentBlock;
use crate::error::QuillError;

use super::message::ToolCall;
use super::usage::Usage;

/// Callback invoked with batched text deltas during streaming.
pub type TokenCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A request into the coordinator. Immutable once dispatched; the
/// coordinator produces a derived "enhanced" copy before routing.
#[derive(Clone)]
pub struct AIRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub stream: bool,
    pub on_token: Option<TokenCallback>,
    pub allowed_tools: Option<Vec<String>>,
    pub enable_tool_calls: bool,
    pub task_context: Option<String>,
}

impl AIRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: model.into(),
            max_tokens: None,
            temperature: None,
            stream: false,
            on_token: None,
            allowed_tools: None,
            enable_tool_calls: false,
            task_context: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_tools(mut self, allowed: Option<Vec<String>>) -> Self {
        self.enable_tool_calls = true;
        self.allowed_tools = allowed;
        self
    }

    pub fn streaming(mut self, on_token: TokenCallback) -> Self {
        self.stream = true;
        self.on_token = Some(on_token);
        self
    }
}

impl fmt::Debug for AIRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AIRequest")
            .field("prompt", &self.prompt)
            .field("model", &self.model)
            .field("stream", &self.stream)
            .field("on_token", &self.on_token.as_ref().map(|_| ".."))
            .field("enable_tool_calls", &self.enable_tool_calls)
            .field("allowed_tools", &self.allowed_tools)
            .finish()
    }
}

/// Stats collected while consuming a stream.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamingStats {
    /// Raw deltas received from the wire.
    pub deltas: usize,
    /// Batches delivered to the token callback.
    pub batches: usize,
}

/// The response returned across the public boundary.
///
/// Always returned, never an exception. Transport and provider failures
/// are folded into an error-content response via [`AIResponse::from_error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIResponse {
    pub content: String,
    pub blocks: Vec<ContentBlock>,
    pub usage: Usage,
    pub cost: f64,
    pub duration_ms: u64,
    pub model: String,
    pub tool_calls: Vec<ToolCall>,
    pub has_tool_interaction: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<StreamingStats>,
    /// Set when this response reports a failure instead of model output.
    #[serde(default)]
    pub is_error: bool,
}

impl AIResponse {
    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            blocks: Vec::new(),
            usage: Usage::default(),
            cost: 0.0,
            duration_ms: 0,
            model: model.into(),
            tool_calls: Vec::new(),
            has_tool_interaction: false,
            streaming: None,
            is_error: false,
        }
    }

    /// Fold an error into an error-content response with a remediation hint.
    pub fn from_error(error: &QuillError, model: impl Into<String>, duration_ms: u64) -> Self {
        let content = format!("[error] {}\nHint: {}", error, error.remediation_hint());
        let blocks = crate::content::process_content(&content);
        Self {
            content,
            blocks,
            duration_ms,
            is_error: true,
            ..Self::empty(model)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_carries_hint_not_panic() {
        let err = QuillError::api(401, "bad key");
        let resp = AIResponse::from_error(&err, "claude-sonnet-4", 12);
        assert!(resp.is_error);
        assert!(resp.content.contains("Hint:"));
        assert!(resp.content.contains("API key"));
        assert_eq!(resp.model, "claude-sonnet-4");
        assert!(!resp.blocks.is_empty());
    }
}

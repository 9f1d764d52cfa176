//! Streaming types: canonical deltas and the typed message sequence.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ToolCall;
use super::request::AIResponse;
use super::usage::Usage;

/// A canonical delta emitted by the streaming engine.
///
/// All provider SSE dialects are normalized into this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Incremental text (empty for non-text events).
    pub text: String,
    pub event_type: StreamEventType,
    /// Present on `ToolCallDelta` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Present on the final delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Usage, typically only on the final delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamDelta {
    pub fn text_delta(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            event_type: StreamEventType::TextDelta,
            tool_call: None,
            finish_reason: None,
            usage: None,
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            text: String::new(),
            event_type: StreamEventType::ToolCallDelta,
            tool_call: Some(call),
            finish_reason: None,
            usage: None,
        }
    }

    pub fn done(finish_reason: Option<FinishReason>, usage: Option<Usage>) -> Self {
        Self {
            text: String::new(),
            event_type: StreamEventType::Done,
            tool_call: None,
            finish_reason,
            usage,
        }
    }
}

/// Type of stream event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    TextDelta,
    ToolCallDelta,
    Done,
    Error,
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

/// Typed message sequence exposed to streaming consumers (the terminal UI).
///
/// Ordered by emission time: `system` → `progress` → repeated
/// `character_delta` → terminal `ai_response` (or `error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    System {
        message: String,
    },
    Progress {
        stage: String,
        percent: u8,
    },
    CharacterDelta {
        text: String,
    },
    AiResponse {
        content: String,
        metadata: Box<AIResponse>,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_message_serializes_tagged() {
        let msg = StreamMessage::Progress {
            stage: "streaming".into(),
            percent: 25,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "streaming");
        assert_eq!(json["percent"], 25);
    }

    #[test]
    fn finish_reason_round_trips_as_snake_case() {
        assert_eq!(FinishReason::ToolCalls.to_string(), "tool_calls");
        assert_eq!(
            "tool_calls".parse::<FinishReason>().unwrap(),
            FinishReason::ToolCalls
        );
    }
}

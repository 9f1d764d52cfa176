//! Anthropic Messages API adapter.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use tracing::debug;

use crate::error::QuillError;
use crate::stream::decode_sse_stream;
use crate::types::{
    ContentPart, FinishReason, ModelMessage, Role, StreamDelta, ToolCall, Usage,
};

use super::http::{anthropic_headers, shared_client, status_to_error};
use super::{ModelProvider, ProviderKind, ProviderRequest, ProviderResponse};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    model: String,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(model: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Build the Messages API body: `system` is a top-level field, tool
    /// results travel as user-role `tool_result` blocks.
    fn build_request_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(msg.text()),
                Role::User => {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": msg.text(),
                    }));
                }
                Role::Assistant => {
                    let mut content: Vec<serde_json::Value> = Vec::new();
                    for part in &msg.content {
                        match part {
                            ContentPart::Text { text } => {
                                if !text.is_empty() {
                                    content.push(
                                        serde_json::json!({"type": "text", "text": text}),
                                    );
                                }
                            }
                            ContentPart::ToolCall(tc) => {
                                content.push(serde_json::json!({
                                    "type": "tool_use",
                                    "id": tc.call_id,
                                    "name": tc.tool_name,
                                    "input": tc.parameters,
                                }));
                            }
                            ContentPart::ToolResult(_) => {}
                        }
                    }
                    if !content.is_empty() {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": content,
                        }));
                    }
                }
                Role::Tool => {
                    for part in &msg.content {
                        if let ContentPart::ToolResult(tr) = part {
                            messages.push(serde_json::json!({
                                "role": "user",
                                "content": [{
                                    "type": "tool_result",
                                    "tool_use_id": tr.call_id,
                                    "content": tr.result.to_string(),
                                    "is_error": tr.is_error,
                                }],
                            }));
                        }
                    }
                }
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": stream,
        });
        let obj = body.as_object_mut().unwrap();

        if !system_parts.is_empty() {
            obj.insert("system".into(), system_parts.join("\n").into());
        }
        if let Some(temp) = request.settings.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(ref stops) = request.settings.stop_sequences {
            obj.insert("stop_sequences".into(), serde_json::json!(stops));
        }
        if let Some(ref tools) = request.tools {
            if !tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
            }
        }

        body
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn process_request(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, QuillError> {
        let body = self.build_request_body(request, false);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model, "anthropic messages request");

        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: MessagesResponse = resp.json().await?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in &data.content {
            match block.r#type.as_str() {
                "text" => {
                    if let Some(ref t) = block.text {
                        text.push_str(t);
                    }
                }
                "tool_use" => {
                    if let (Some(id), Some(name)) = (&block.id, &block.name) {
                        tool_calls.push(ToolCall {
                            call_id: id.clone(),
                            tool_name: name.clone(),
                            parameters: block.input.clone().unwrap_or(serde_json::json!({})),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(ProviderResponse {
            text,
            usage: Usage::new(data.usage.input_tokens, data.usage.output_tokens),
            tool_calls,
            finish_reason: data.stop_reason.as_deref().and_then(parse_stop_reason),
        })
    }

    async fn process_streaming_request(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta, QuillError>>, QuillError> {
        let body = self.build_request_body(request, true);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model, "anthropic messages stream");

        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let mut state = EventState::default();
        Ok(decode_sse_stream(resp.bytes_stream(), move |payload| {
            parse_messages_frame(payload, &mut state)
        }))
    }
}

fn parse_stop_reason(s: &str) -> Option<FinishReason> {
    match s {
        "end_turn" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        _ => None,
    }
}

/// Streaming state across Messages API events.
#[derive(Debug, Default)]
struct EventState {
    current_tool_id: Option<String>,
    current_tool_name: Option<String>,
    current_tool_input: String,
    saw_tool_use: bool,
    input_tokens: u32,
    output_tokens: u32,
}

/// Parse one Messages API SSE payload into canonical deltas.
fn parse_messages_frame(payload: &str, state: &mut EventState) -> Vec<StreamDelta> {
    let event: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");

    let mut deltas = Vec::new();
    match event_type {
        "message_start" => {
            if let Some(tokens) = event
                .get("message")
                .and_then(|m| m.get("usage"))
                .and_then(|u| u.get("input_tokens"))
                .and_then(|t| t.as_u64())
            {
                state.input_tokens = tokens as u32;
            }
        }
        "content_block_start" => {
            if let Some(block) = event.get("content_block") {
                if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                    state.current_tool_id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    state.current_tool_name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    state.current_tool_input.clear();
                }
            }
        }
        "content_block_delta" => {
            if let Some(delta) = event.get("delta") {
                match delta.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                            deltas.push(StreamDelta::text_delta(text));
                        }
                    }
                    "input_json_delta" => {
                        if let Some(json) = delta.get("partial_json").and_then(|t| t.as_str()) {
                            state.current_tool_input.push_str(json);
                        }
                    }
                    _ => {}
                }
            }
        }
        "content_block_stop" => {
            if let (Some(id), Some(name)) =
                (state.current_tool_id.take(), state.current_tool_name.take())
            {
                let raw = std::mem::take(&mut state.current_tool_input);
                let parameters = serde_json::from_str(&raw)
                    .unwrap_or(serde_json::Value::String(raw));
                deltas.push(StreamDelta::tool_call(ToolCall {
                    call_id: id,
                    tool_name: name,
                    parameters,
                }));
                state.saw_tool_use = true;
            }
        }
        "message_delta" => {
            if let Some(tokens) = event
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|t| t.as_u64())
            {
                state.output_tokens = tokens as u32;
            }
        }
        "message_stop" => {
            let finish = if state.saw_tool_use {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            };
            deltas.push(StreamDelta::done(
                Some(finish),
                Some(Usage::new(state.input_tokens, state.output_tokens)),
            ));
        }
        _ => {}
    }
    deltas
}

// Wire types (internal).

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<MessagesContentBlock>,
    stop_reason: Option<String>,
    usage: MessagesUsage,
}

#[derive(Deserialize)]
struct MessagesContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

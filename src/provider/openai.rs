//! OpenAI-compatible Chat Completions adapter.
//!
//! Serves the `openai` and `kimi` provider kinds plus arbitrary
//! OpenAI-compatible endpoints (qwen/glm-style gateways). DeepSeek reuses
//! the body builder and frame parser from this module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use tracing::debug;

use crate::error::QuillError;
use crate::stream::decode_sse_stream;
use crate::types::{
    ContentPart, FinishReason, ModelMessage, Role, StreamDelta, ToolCall, Usage,
};

use super::http::{bearer_headers, shared_client, status_to_error};
use super::{ModelProvider, ProviderKind, ProviderRequest, ProviderResponse};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const KIMI_BASE_URL: &str = "https://api.moonshot.cn/v1";

pub struct ChatCompletionsProvider {
    kind: ProviderKind,
    model: String,
    api_key: String,
    base_url: String,
}

impl ChatCompletionsProvider {
    pub fn new(
        kind: ProviderKind,
        model: impl Into<String>,
        api_key: String,
        base_url: Option<String>,
    ) -> Self {
        let base_url = base_url.unwrap_or_else(|| {
            match kind {
                ProviderKind::Kimi => KIMI_BASE_URL,
                _ => OPENAI_BASE_URL,
            }
            .to_string()
        });
        Self {
            kind,
            model: model.into(),
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl ModelProvider for ChatCompletionsProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn process_request(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, QuillError> {
        let body = build_chat_body(&self.model, request, false);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, provider = %self.kind, "chat completions request");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: ChatResponse = resp.json().await?;
        parse_chat_response(data)
    }

    async fn process_streaming_request(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta, QuillError>>, QuillError> {
        let body = build_chat_body(&self.model, request, true);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, provider = %self.kind, "chat completions stream");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let mut assembler = ToolCallAssembler::default();
        Ok(decode_sse_stream(resp.bytes_stream(), move |payload| {
            parse_chat_frame(payload, &mut assembler)
        }))
    }
}

/// Build a Chat Completions request body.
pub(crate) fn build_chat_body(
    model: &str,
    request: &ProviderRequest,
    stream: bool,
) -> serde_json::Value {
    let messages: Vec<serde_json::Value> =
        request.messages.iter().map(message_to_chat_json).collect();

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": stream,
    });
    let obj = body.as_object_mut().unwrap();

    if let Some(max) = request.settings.max_tokens {
        obj.insert("max_tokens".into(), max.into());
    }
    if let Some(temp) = request.settings.temperature {
        obj.insert("temperature".into(), temp.into());
    }
    if let Some(ref stops) = request.settings.stop_sequences {
        obj.insert("stop".into(), serde_json::json!(stops));
    }

    if let Some(ref tools) = request.tools {
        if !tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
        }
    }

    body
}

pub(crate) fn message_to_chat_json(msg: &ModelMessage) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    if let Some(ContentPart::ToolResult(tr)) = msg.content.first() {
        return serde_json::json!({
            "role": "tool",
            "tool_call_id": tr.call_id,
            "content": tr.result.to_string(),
        });
    }

    let tool_calls = msg.tool_calls();
    if !tool_calls.is_empty() {
        let tc_json: Vec<serde_json::Value> = tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.call_id,
                    "type": "function",
                    "function": {
                        "name": tc.tool_name,
                        "arguments": tc.parameters.to_string(),
                    }
                })
            })
            .collect();
        let text = msg.text();
        return serde_json::json!({
            "role": role,
            "content": if text.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(text)
            },
            "tool_calls": tc_json,
        });
    }

    serde_json::json!({ "role": role, "content": msg.text() })
}

pub(crate) fn parse_chat_response(data: ChatResponse) -> Result<ProviderResponse, QuillError> {
    let choice = data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| QuillError::api(200, "no choices in chat completions response"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            call_id: tc.id,
            tool_name: tc.function.name,
            // Keep an unparseable argument string for later repair.
            parameters: serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::String(tc.function.arguments)),
        })
        .collect();

    Ok(ProviderResponse {
        text: choice.message.content.unwrap_or_default(),
        usage: data
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default(),
        tool_calls,
        finish_reason: choice.finish_reason.as_deref().and_then(parse_finish_reason),
    })
}

pub(crate) fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Accumulates streamed tool-call fragments by choice index.
#[derive(Debug, Default)]
pub(crate) struct ToolCallAssembler {
    partial: BTreeMap<u32, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    fn absorb(&mut self, fragment: ChatStreamToolCall) {
        let entry = self.partial.entry(fragment.index).or_default();
        if let Some(id) = fragment.id {
            entry.id = id;
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(args) = function.arguments {
                entry.arguments.push_str(&args);
            }
        }
    }

    fn drain(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.partial)
            .into_values()
            .filter(|p| !p.name.is_empty())
            .map(|p| ToolCall {
                call_id: p.id,
                tool_name: p.name,
                parameters: serde_json::from_str(&p.arguments)
                    .unwrap_or(serde_json::Value::String(p.arguments)),
            })
            .collect()
    }
}

/// Parse one SSE `data:` payload into canonical deltas.
pub(crate) fn parse_chat_frame(
    payload: &str,
    assembler: &mut ToolCallAssembler,
) -> Vec<StreamDelta> {
    let chunk: ChatStreamChunk = match serde_json::from_str(payload) {
        Ok(c) => c,
        Err(_) => return Vec::new(), // skip unparseable frames
    };

    let mut deltas = Vec::new();
    let usage = chunk
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                deltas.push(StreamDelta::text_delta(text));
            }
        }
        for fragment in choice.delta.tool_calls.unwrap_or_default() {
            assembler.absorb(fragment);
        }
        if let Some(reason) = choice.finish_reason.as_deref() {
            for call in assembler.drain() {
                deltas.push(StreamDelta::tool_call(call));
            }
            deltas.push(StreamDelta::done(parse_finish_reason(reason), usage.clone()));
        }
    }
    deltas
}

// Wire types (internal).

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ChatStreamToolCall>>,
}

#[derive(Deserialize)]
struct ChatStreamToolCall {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<ChatStreamFunction>,
}

#[derive(Deserialize)]
struct ChatStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

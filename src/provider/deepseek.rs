//! DeepSeek Chat Completions adapter with function calling.
//!
//! DeepSeek speaks the OpenAI dialect with `tools`/`tool_choice` fields,
//! but its tool-call SSE framing is not reliably parseable, so streaming
//! is disabled whenever tool calling is active: the adapter performs a
//! non-streaming request and replays it as a synthetic delta stream.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::debug;

use crate::error::QuillError;
use crate::stream::decode_sse_stream;
use crate::types::StreamDelta;

use super::http::{bearer_headers, shared_client, status_to_error};
use super::openai::{build_chat_body, parse_chat_frame, parse_chat_response, ToolCallAssembler};
use super::{ModelProvider, ProviderKind, ProviderRequest, ProviderResponse};

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

pub struct DeepSeekProvider {
    model: String,
    api_key: String,
    base_url: String,
}

impl DeepSeekProvider {
    pub fn new(model: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Whether SSE streaming may be used for this request.
    pub fn streaming_allowed(request: &ProviderRequest) -> bool {
        !request.tools_active()
    }

    fn build_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = build_chat_body(&self.model, request, stream);
        if request.tools_active() {
            body.as_object_mut()
                .unwrap()
                .insert("tool_choice".into(), "auto".into());
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, QuillError> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ModelProvider for DeepSeekProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn process_request(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, QuillError> {
        debug!(model = %self.model, tools = request.tools_active(), "deepseek request");
        let body = self.build_body(request, false);
        let resp = self.post(&body).await?;
        parse_chat_response(resp.json().await?)
    }

    async fn process_streaming_request(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta, QuillError>>, QuillError> {
        if !Self::streaming_allowed(request) {
            debug!(model = %self.model, "deepseek tools active: replaying non-streaming response");
            let response = self.process_request(request).await?;
            let stream = async_stream::stream! {
                if !response.text.is_empty() {
                    yield Ok(StreamDelta::text_delta(response.text.clone()));
                }
                for call in response.tool_calls.clone() {
                    yield Ok(StreamDelta::tool_call(call));
                }
                yield Ok(StreamDelta::done(
                    response.finish_reason,
                    Some(response.usage.clone()),
                ));
            };
            return Ok(Box::pin(stream));
        }

        debug!(model = %self.model, "deepseek stream");
        let body = self.build_body(request, true);
        let resp = self.post(&body).await?;

        let mut assembler = ToolCallAssembler::default();
        Ok(decode_sse_stream(resp.bytes_stream(), move |payload| {
            parse_chat_frame(payload, &mut assembler)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderSettings, ToolDefinition};
    use crate::types::ModelMessage;

    fn provider() -> DeepSeekProvider {
        DeepSeekProvider::new("deepseek-chat", "sk-test".to_string(), None)
    }

    fn request(tools: Option<Vec<ToolDefinition>>) -> ProviderRequest {
        ProviderRequest {
            messages: vec![ModelMessage::user("hello")],
            settings: ProviderSettings::default(),
            tools,
        }
    }

    fn tool() -> ToolDefinition {
        ToolDefinition {
            name: "Write".into(),
            description: "Write a file".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn no_tools_omits_tools_and_allows_streaming() {
        let req = request(None);
        assert!(DeepSeekProvider::streaming_allowed(&req));
        let body = provider().build_body(&req, true);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn tools_add_tool_choice_and_disable_streaming() {
        let req = request(Some(vec![tool()]));
        assert!(!DeepSeekProvider::streaming_allowed(&req));
        let body = provider().build_body(&req, false);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "Write");
    }

    #[test]
    fn empty_tool_list_counts_as_inactive() {
        let req = request(Some(vec![]));
        assert!(DeepSeekProvider::streaming_allowed(&req));
    }
}

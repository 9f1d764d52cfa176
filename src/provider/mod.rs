//! Model provider trait, kind inference, and the adapter factory.

pub mod anthropic;
pub mod deepseek;
pub mod http;
pub mod openai;
pub mod sanitize;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::Config;
use crate::error::QuillError;
use crate::types::{FinishReason, ModelMessage, StreamDelta, ToolCall, Usage};

/// The closed set of supported upstream backends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[strum(serialize = "anthropic")]
    #[serde(rename = "anthropic")]
    Anthropic,
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    #[strum(serialize = "deepseek")]
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[strum(serialize = "kimi")]
    #[serde(rename = "kimi")]
    Kimi,
    #[strum(serialize = "openai-compatible")]
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
}

impl ProviderKind {
    /// Infer the provider from a model name. Pure and deterministic:
    /// substring match over the lowercased name, falling back to `default`.
    pub fn infer_from_model(model: &str, default: ProviderKind) -> ProviderKind {
        let name = model.to_ascii_lowercase();
        if name.contains("deepseek") {
            ProviderKind::DeepSeek
        } else if name.contains("claude") || name.contains("anthropic") {
            ProviderKind::Anthropic
        } else if name.contains("gpt") || name.contains("openai") {
            ProviderKind::OpenAi
        } else if name.contains("moonshot") || name.contains("kimi") {
            ProviderKind::Kimi
        } else if name.contains("qwen") || name.contains("glm") {
            ProviderKind::OpenAiCompatible
        } else {
            default
        }
    }
}

/// Generation settings forwarded to a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<ModelMessage>,
    pub settings: ProviderSettings,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl ProviderRequest {
    /// Whether tool calling is active for this request.
    pub fn tools_active(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Response from a provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: Usage,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
}

/// Core trait implemented by all provider adapters.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Which backend this adapter speaks to.
    fn kind(&self) -> ProviderKind;

    /// The model ID this adapter instance serves.
    fn model_id(&self) -> &str;

    /// Generate text (non-streaming).
    async fn process_request(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, QuillError>;

    /// Generate text as a stream of canonical deltas.
    async fn process_streaming_request(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta, QuillError>>, QuillError>;
}

/// Build the adapter for a provider kind. Fails fast (before any network
/// call) on missing credentials or base URL.
pub fn create_provider(
    kind: ProviderKind,
    model_id: &str,
    config: &Config,
) -> Result<Box<dyn ModelProvider>, QuillError> {
    let base_url = config.base_url(kind).map(str::to_string);
    match kind {
        ProviderKind::Anthropic => {
            let api_key = require_key(config, kind, "ANTHROPIC_API_KEY")?;
            Ok(Box::new(anthropic::AnthropicProvider::new(
                model_id, api_key, base_url,
            )))
        }
        ProviderKind::OpenAi => {
            let api_key = require_key(config, kind, "OPENAI_API_KEY")?;
            Ok(Box::new(openai::ChatCompletionsProvider::new(
                kind, model_id, api_key, base_url,
            )))
        }
        ProviderKind::Kimi => {
            let api_key = require_key(config, kind, "MOONSHOT_API_KEY")?;
            Ok(Box::new(openai::ChatCompletionsProvider::new(
                kind, model_id, api_key, base_url,
            )))
        }
        ProviderKind::OpenAiCompatible => {
            let api_key = require_key(config, kind, "OPENAI_COMPAT_API_KEY")?;
            let base_url = base_url.ok_or_else(|| {
                QuillError::Configuration(
                    "openai-compatible provider requires API_BASE_URL".to_string(),
                )
            })?;
            Ok(Box::new(openai::ChatCompletionsProvider::new(
                kind,
                model_id,
                api_key,
                Some(base_url),
            )))
        }
        ProviderKind::DeepSeek => {
            let api_key = require_key(config, kind, "DEEPSEEK_API_KEY")?;
            Ok(Box::new(deepseek::DeepSeekProvider::new(
                model_id, api_key, base_url,
            )))
        }
    }
}

fn require_key(config: &Config, kind: ProviderKind, env_hint: &str) -> Result<String, QuillError> {
    config
        .api_key(kind)
        .map(str::to_string)
        .ok_or_else(|| QuillError::Authentication(format!("Missing {env_hint} for {kind}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: ProviderKind = ProviderKind::OpenAiCompatible;

    #[test]
    fn infers_known_model_families() {
        let cases = [
            ("deepseek-chat", ProviderKind::DeepSeek),
            ("deepseek-reasoner", ProviderKind::DeepSeek),
            ("claude-sonnet-4", ProviderKind::Anthropic),
            ("anthropic.claude-v2", ProviderKind::Anthropic),
            ("gpt-4o-mini", ProviderKind::OpenAi),
            ("openai/o3", ProviderKind::OpenAi),
            ("moonshot-v1-8k", ProviderKind::Kimi),
            ("kimi-k2", ProviderKind::Kimi),
            ("qwen-max", ProviderKind::OpenAiCompatible),
            ("glm-4", ProviderKind::OpenAiCompatible),
        ];
        for (model, expected) in cases {
            assert_eq!(
                ProviderKind::infer_from_model(model, DEFAULT),
                expected,
                "model {model}"
            );
        }
    }

    #[test]
    fn inference_is_deterministic_for_any_input() {
        for model in ["", "DEEPSEEK-CHAT", "☃snowman", "mystery-7b", "Claude"] {
            let a = ProviderKind::infer_from_model(model, DEFAULT);
            let b = ProviderKind::infer_from_model(model, DEFAULT);
            assert_eq!(a, b, "model {model:?}");
        }
    }

    #[test]
    fn unknown_model_uses_configured_default() {
        assert_eq!(
            ProviderKind::infer_from_model("mystery-7b", ProviderKind::Kimi),
            ProviderKind::Kimi
        );
    }

    #[test]
    fn provider_kind_parses_from_env_strings() {
        assert_eq!(
            "deepseek".parse::<ProviderKind>().unwrap(),
            ProviderKind::DeepSeek
        );
        assert_eq!(
            "openai-compatible".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAiCompatible
        );
    }

    #[test]
    fn create_provider_fails_fast_without_credentials() {
        let config = Config::new("deepseek-chat");
        assert!(matches!(
            create_provider(ProviderKind::DeepSeek, "deepseek-chat", &config),
            Err(QuillError::Authentication(_))
        ));
    }
}

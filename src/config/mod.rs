//! Environment-driven configuration.
//!
//! On-disk config files are out of scope; collaborators hand the
//! coordinator a fully-formed [`Config`], typically built by
//! [`Config::from_env`].

use std::collections::HashMap;

use crate::provider::ProviderKind;

/// Configuration for provider routing and credentials.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model selected when a request does not name one.
    pub model: String,
    /// Forced provider, overriding model-name inference fallback.
    pub provider_override: Option<ProviderKind>,
    /// Bypass the network path entirely and return mock responses.
    pub offline: bool,
    /// Per-million-token pricing (input, output) when known.
    pub pricing: Option<(f64, f64)>,
    api_keys: HashMap<ProviderKind, String>,
    base_urls: HashMap<ProviderKind, String>,
    default_base_url: Option<String>,
}

const DEFAULT_MODEL: &str = "deepseek-chat";

impl Config {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider_override: None,
            offline: false,
            pricing: None,
            api_keys: HashMap::new(),
            base_urls: HashMap::new(),
            default_base_url: None,
        }
    }

    /// Load from environment variables (`AI_MODEL`, `API_PROVIDER`,
    /// `API_BASE_URL`, `QUILL_OFFLINE`, per-provider API keys).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let model = std::env::var("AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let mut config = Self::new(model);

        if let Ok(provider) = std::env::var("API_PROVIDER") {
            config.provider_override = provider.parse::<ProviderKind>().ok();
        }
        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.default_base_url = Some(url);
        }
        config.offline = matches!(
            std::env::var("QUILL_OFFLINE").as_deref(),
            Ok("1") | Ok("true")
        );

        let key_mappings = [
            ("ANTHROPIC_API_KEY", ProviderKind::Anthropic),
            ("OPENAI_API_KEY", ProviderKind::OpenAi),
            ("DEEPSEEK_API_KEY", ProviderKind::DeepSeek),
            ("MOONSHOT_API_KEY", ProviderKind::Kimi),
            ("KIMI_API_KEY", ProviderKind::Kimi),
            ("OPENAI_COMPAT_API_KEY", ProviderKind::OpenAiCompatible),
        ];
        for (env_var, kind) in key_mappings {
            if let Ok(key) = std::env::var(env_var) {
                config.api_keys.insert(kind, key);
            }
        }

        config
    }

    pub fn set_api_key(&mut self, kind: ProviderKind, key: impl Into<String>) {
        self.api_keys.insert(kind, key.into());
    }

    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        self.api_keys.get(&kind).map(String::as_str)
    }

    pub fn set_base_url(&mut self, kind: ProviderKind, url: impl Into<String>) {
        self.base_urls.insert(kind, url.into());
    }

    /// Base URL for a provider: per-provider override, then the global
    /// `API_BASE_URL` override, then none (adapter default applies).
    pub fn base_url(&self, kind: ProviderKind) -> Option<&str> {
        self.base_urls
            .get(&kind)
            .or(self.default_base_url.as_ref())
            .map(String::as_str)
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Provider used when model-name inference finds no match.
    pub fn default_provider(&self) -> ProviderKind {
        self.provider_override
            .unwrap_or(ProviderKind::OpenAiCompatible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_prefers_per_provider_over_global() {
        let mut config = Config::new("test-model");
        config.default_base_url = Some("https://global.example/v1".into());
        config.set_base_url(ProviderKind::DeepSeek, "https://ds.example/v1");

        assert_eq!(
            config.base_url(ProviderKind::DeepSeek),
            Some("https://ds.example/v1")
        );
        assert_eq!(
            config.base_url(ProviderKind::Anthropic),
            Some("https://global.example/v1")
        );
    }

    #[test]
    fn default_provider_falls_back_to_openai_compatible() {
        let config = Config::new("mystery-model-9000");
        assert_eq!(config.default_provider(), ProviderKind::OpenAiCompatible);
    }
}

use std::fmt;
use std::sync::Arc;

use reqwest::blocking::Client;
use secrecy::SecretString;

use super::anthropic::{AnthropicClient, ANTHROPIC_BASE_URL};
use super::chat::{
    ChatCompletionsClient, DEEPSEEK_BASE_URL, OPENAI_BASE_URL, OPENROUTER_BASE_URL,
};
use super::{
    http_client, GenerationError, MeteredGenerator, PlaceholderGenerator, TextGenerator, UsageLog,
};
use crate::config::{GenerationConfig, ProviderConfig, WorkerConfig};
use crate::secrets::resolve_secret_optional;

const DEEPSEEK_MODELS: &[&str] = &["deepseek-chat", "deepseek-coder", "deepseek-reasoner"];
const DEEPSEEK_FALLBACK_MODEL: &str = "deepseek-chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Anthropic,
    OpenRouter,
}

impl ProviderKind {
    pub fn from_backend(backend: &str) -> Option<Self> {
        match backend.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "deepseek" => Some(ProviderKind::DeepSeek),
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            "openrouter" => Some(ProviderKind::OpenRouter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => OPENAI_BASE_URL,
            ProviderKind::DeepSeek => DEEPSEEK_BASE_URL,
            ProviderKind::Anthropic => ANTHROPIC_BASE_URL,
            ProviderKind::OpenRouter => OPENROUTER_BASE_URL,
        }
    }

    /// Picks the adapter and the provider-native model name for a job.
    ///
    /// A namespaced id (`"mistralai/mistral-7b"`) goes through the gateway
    /// unchanged, unless its namespace is the job's own backend, in which case
    /// the prefix is dropped and the provider is called directly.
    pub fn route(backend: &str, model: &str) -> Result<(Self, String), GenerationError> {
        let kind = Self::from_backend(backend)
            .ok_or_else(|| GenerationError::UnknownBackend(backend.to_string()))?;
        let model = model.trim();

        if kind == ProviderKind::OpenRouter {
            return Ok((kind, model.to_string()));
        }

        if let Some((namespace, name)) = model.split_once('/') {
            if Self::from_backend(namespace) == Some(kind) && !name.is_empty() {
                return Ok((kind, kind.native_model(name)));
            }
            return Ok((ProviderKind::OpenRouter, model.to_string()));
        }

        Ok((kind, kind.native_model(model)))
    }

    fn native_model(&self, name: &str) -> String {
        match self {
            ProviderKind::DeepSeek if !DEEPSEEK_MODELS.contains(&name) => {
                DEEPSEEK_FALLBACK_MODEL.to_string()
            }
            _ => name.to_string(),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generator plus the model name it should be called with.
pub struct ResolvedGenerator {
    pub generator: Arc<dyn TextGenerator>,
    pub model: String,
}

/// Seam between the pipeline and provider selection, so tests can hand the
/// pipeline a scripted generator.
pub trait GeneratorSource: Send + Sync {
    fn resolve(&self, backend: &str, model: &str) -> Result<ResolvedGenerator, GenerationError>;
}

pub struct GeneratorRegistry {
    http: Client,
    config: GenerationConfig,
    usage: Option<Arc<UsageLog>>,
}

impl GeneratorRegistry {
    pub fn new(config: &GenerationConfig, worker: &WorkerConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            http: http_client(worker.request_timeout(), worker.connect_timeout())
                .map_err(GenerationError::Client)?,
            config: config.clone(),
            usage: None,
        })
    }

    pub fn with_usage_log(mut self, usage: Arc<UsageLog>) -> Self {
        self.usage = Some(usage);
        self
    }

    fn provider_config(&self, kind: ProviderKind) -> &ProviderConfig {
        let providers = &self.config.providers;
        match kind {
            ProviderKind::OpenAi => &providers.openai,
            ProviderKind::DeepSeek => &providers.deepseek,
            ProviderKind::Anthropic => &providers.anthropic,
            ProviderKind::OpenRouter => &providers.openrouter,
        }
    }

    fn api_key(&self, kind: ProviderKind) -> Result<Option<SecretString>, GenerationError> {
        let provider = self.provider_config(kind);
        resolve_secret_optional(
            provider.api_key.as_deref(),
            provider.api_key_file.as_deref(),
            provider.api_key_env.as_deref(),
        )
        .map_err(|source| GenerationError::Credentials {
            provider: kind.as_str().to_string(),
            source,
        })
    }

    fn build(&self, kind: ProviderKind) -> Result<Arc<dyn TextGenerator>, GenerationError> {
        let Some(api_key) = self.api_key(kind)? else {
            if self.config.demo_mode {
                return Ok(Arc::new(PlaceholderGenerator::new(kind.display_name())));
            }
            let hint = self
                .provider_config(kind)
                .api_key_env
                .clone()
                .unwrap_or_else(|| format!("generation.providers.{}.api_key", kind));
            return Err(GenerationError::MissingCredentials {
                provider: kind.as_str().to_string(),
                hint,
            });
        };

        let base_url = self
            .provider_config(kind)
            .base_url
            .as_deref()
            .unwrap_or_else(|| kind.default_base_url());
        let http = self.http.clone();

        let generator: Arc<dyn TextGenerator> = match kind {
            ProviderKind::Anthropic => Arc::new(AnthropicClient::new(http, base_url, api_key)),
            _ => Arc::new(ChatCompletionsClient::new(
                http,
                kind.as_str(),
                base_url,
                api_key,
            )),
        };
        Ok(generator)
    }
}

impl GeneratorSource for GeneratorRegistry {
    fn resolve(&self, backend: &str, model: &str) -> Result<ResolvedGenerator, GenerationError> {
        let (kind, model) = ProviderKind::route(backend, model)?;
        log::debug!("Routing model '{}' to {}", model, kind);

        let generator = self.build(kind)?;
        let generator: Arc<dyn TextGenerator> = match &self.usage {
            Some(usage) => Arc::new(MeteredGenerator::new(generator, Arc::clone(usage))),
            None => generator,
        };
        Ok(ResolvedGenerator { generator, model })
    }
}

//! Text generation adapters.
//!
//! Each adapter turns a system prompt and a user message into story text.
//! [`GeneratorRegistry`] picks the adapter for a job from its backend and
//! model identifier.

pub mod anthropic;
pub mod chat;
pub mod error;
pub mod placeholder;
pub mod registry;
pub mod usage;

use std::time::Duration;

pub use anthropic::AnthropicClient;
pub use chat::ChatCompletionsClient;
pub use error::GenerationError;
pub use placeholder::PlaceholderGenerator;
pub use registry::{GeneratorRegistry, GeneratorSource, ProviderKind, ResolvedGenerator};
pub use usage::{MeteredGenerator, UsageEntry, UsageLog};

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub request_id: String,
    pub system_prompt: String,
    pub user_message: String,
    /// Provider-native model name.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Only the placeholder generator reads these.
    pub theme: String,
    pub characters: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub latency: Duration,
}

pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> &str;

    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError>;
}

/// Blocking HTTP client for provider adapters, text and speech alike.
pub fn http_client(
    timeout: Duration,
    connect_timeout: Duration,
) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .user_agent(concat!("storyteller/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Joins a configured base URL and an endpoint path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

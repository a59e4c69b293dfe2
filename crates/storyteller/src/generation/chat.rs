//! OpenAI-style `chat/completions` adapter.
//!
//! OpenAI, DeepSeek and the OpenRouter gateway speak the same wire format
//! and differ only in base URL and credentials.

use std::time::Instant;

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::{endpoint, Generation, GenerationError, GenerationRequest, TextGenerator, TokenUsage};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// Reasoning models (`o1`, `o1-mini`, ...) take no system role, so the
/// system prompt is folded into the user turn.
fn is_reasoning_model(model: &str) -> bool {
    let name = model.rsplit('/').next().unwrap_or(model);
    name == "o1" || name.starts_with("o1-")
}

pub struct ChatCompletionsClient {
    http: Client,
    provider: String,
    url: String,
    api_key: SecretString,
}

impl ChatCompletionsClient {
    pub fn new(
        http: Client,
        provider: impl Into<String>,
        base_url: &str,
        api_key: SecretString,
    ) -> Self {
        Self {
            http,
            provider: provider.into(),
            url: endpoint(base_url, "chat/completions"),
            api_key,
        }
    }

    fn build_request<'a>(&self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        if is_reasoning_model(&request.model) {
            let combined = format!("{}\n\n{}", request.system_prompt, request.user_message);
            ChatRequest {
                model: &request.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: combined.into(),
                }],
                max_tokens: None,
                max_completion_tokens: Some(request.max_tokens),
                temperature: None,
            }
        } else {
            ChatRequest {
                model: &request.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: request.system_prompt.as_str().into(),
                    },
                    ChatMessage {
                        role: "user",
                        content: request.user_message.as_str().into(),
                    },
                ],
                max_tokens: Some(request.max_tokens),
                max_completion_tokens: None,
                temperature: Some(request.temperature),
            }
        }
    }
}

impl TextGenerator for ChatCompletionsClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    #[instrument(skip_all, fields(provider = %self.provider, model = %request.model))]
    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let body = self.build_request(request);
        let started = Instant::now();

        debug!("Sending chat completion request");
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .map_err(|e| {
                error!(error = %e, "Chat completion request failed");
                GenerationError::from_reqwest(&self.provider, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            error!(status = %status, "Provider returned error");
            return Err(GenerationError::Api {
                provider: self.provider.clone(),
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().map_err(|e| GenerationError::Parse {
            provider: self.provider.clone(),
            reason: e.to_string(),
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GenerationError::EmptyResponse {
                provider: self.provider.clone(),
            })?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(Generation {
            text,
            provider: self.provider.clone(),
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage,
            latency: started.elapsed(),
        })
    }
}

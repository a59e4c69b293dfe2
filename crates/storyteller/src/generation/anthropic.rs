use std::time::Instant;

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::{endpoint, Generation, GenerationError, GenerationRequest, TextGenerator, TokenUsage};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: Client,
    url: String,
    api_key: SecretString,
}

impl AnthropicClient {
    pub fn new(http: Client, base_url: &str, api_key: SecretString) -> Self {
        Self {
            http,
            url: endpoint(base_url, "messages"),
            api_key,
        }
    }
}

impl TextGenerator for AnthropicClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip_all, fields(model = %request.model))]
    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: &request.system_prompt,
            messages: [Message {
                role: "user",
                content: &request.user_message,
            }],
            temperature: request.temperature,
        };
        let started = Instant::now();

        debug!("Sending request to Anthropic API");
        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                error!(error = %e, "Failed to send request to Anthropic API");
                GenerationError::from_reqwest(PROVIDER, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            error!(status = %status, "Anthropic API returned error");
            return Err(GenerationError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response.json().map_err(|e| GenerationError::Parse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })?;

        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse {
                provider: PROVIDER.to_string(),
            });
        }

        Ok(Generation {
            text: text.to_string(),
            provider: PROVIDER.to_string(),
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage: parsed
                .usage
                .map(|u| TokenUsage {
                    prompt_tokens: u.input_tokens,
                    completion_tokens: u.output_tokens,
                })
                .unwrap_or_default(),
            latency: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::tests::request;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn client(server: &MockServer) -> AnthropicClient {
        let http = crate::generation::http_client(Duration::from_secs(5), Duration::from_secs(5))
            .unwrap();
        AnthropicClient::new(
            http,
            &server.base_url(),
            SecretString::from("ak-test".to_string()),
        )
    }

    #[test]
    fn test_generate_joins_text_blocks() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/messages")
                .header("x-api-key", "ak-test")
                .header("anthropic-version", ANTHROPIC_VERSION)
                .body_contains("\"system\":\"You are a gentle storyteller.\"");
            then.status(200).json_body(json!({
                "id": "msg_1",
                "model": "claude-3-5-haiku-20241022",
                "content": [
                    { "type": "text", "text": "Once upon a time" },
                    { "type": "text", "text": ", the end." }
                ],
                "usage": { "input_tokens": 30, "output_tokens": 12 }
            }));
        });

        let generation = client(&server)
            .generate(&request("claude-3-5-haiku-latest"))
            .unwrap();

        mock.assert();
        assert_eq!(generation.text, "Once upon a time, the end.");
        assert_eq!(generation.model, "claude-3-5-haiku-20241022");
        assert_eq!(generation.usage.prompt_tokens, Some(30));
        assert_eq!(generation.usage.completion_tokens, Some(12));
    }

    #[test]
    fn test_overloaded_maps_to_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/messages");
            then.status(529).body("overloaded");
        });

        let err = client(&server)
            .generate(&request("claude-3-5-haiku-latest"))
            .unwrap_err();
        assert!(matches!(err, GenerationError::Api { status: 529, .. }));
        assert_eq!(err.kind(), "provider_api");
    }
}

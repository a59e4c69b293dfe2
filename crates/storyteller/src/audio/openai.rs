use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error, instrument};

use super::{voice_for, AudioError, SpeechSynthesizer};
use crate::config::OpenAiSpeechConfig;
use crate::generation::chat::OPENAI_BASE_URL;

const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

/// OpenAI `audio/speech` backend.
pub struct OpenAiSpeech {
    http: Client,
    url: String,
    api_key: SecretString,
    config: OpenAiSpeechConfig,
    max_chars: usize,
}

impl OpenAiSpeech {
    pub fn new(
        http: Client,
        base_url: Option<&str>,
        api_key: SecretString,
        config: OpenAiSpeechConfig,
        max_chars: usize,
    ) -> Self {
        Self {
            http,
            url: crate::generation::endpoint(base_url.unwrap_or(OPENAI_BASE_URL), "audio/speech"),
            api_key,
            config,
            max_chars,
        }
    }
}

impl SpeechSynthesizer for OpenAiSpeech {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    #[instrument(skip_all, fields(language = %language, chars = text.chars().count()))]
    fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, AudioError> {
        let voice = voice_for(&self.config.voices, &self.config.default_voice, language);
        debug!(voice, "Requesting speech");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&SpeechRequest {
                model: &self.config.model,
                voice,
                input: text,
                response_format: "mp3",
            })
            .send()
            .map_err(|e| AudioError::from_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            error!(status = %status, "Speech API returned error");
            return Err(AudioError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .map_err(|e| AudioError::from_reqwest(PROVIDER, e))?;
        if bytes.is_empty() {
            return Err(AudioError::EmptyAudio {
                provider: PROVIDER.to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

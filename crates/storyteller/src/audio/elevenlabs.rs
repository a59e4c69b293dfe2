use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error, instrument};

use super::{voice_for, AudioError, SpeechSynthesizer};
use crate::config::ElevenLabsConfig;

pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
const PROVIDER: &str = "elevenlabs";

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct ElevenLabsSpeech {
    http: Client,
    base_url: String,
    api_key: SecretString,
    config: ElevenLabsConfig,
    max_chars: usize,
}

impl ElevenLabsSpeech {
    pub fn new(
        http: Client,
        base_url: Option<&str>,
        api_key: SecretString,
        config: ElevenLabsConfig,
        max_chars: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.unwrap_or(ELEVENLABS_BASE_URL).to_string(),
            api_key,
            config,
            max_chars,
        }
    }
}

impl SpeechSynthesizer for ElevenLabsSpeech {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    #[instrument(skip_all, fields(language = %language, chars = text.chars().count()))]
    fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, AudioError> {
        let voice = voice_for(&self.config.voices, &self.config.default_voice, language);
        let url = crate::generation::endpoint(&self.base_url, &format!("text-to-speech/{}", voice));
        debug!(voice, "Requesting speech");

        let response = self
            .http
            .post(&url)
            .query(&[("output_format", self.config.output_format.as_str())])
            .header("xi-api-key", self.api_key.expose_secret())
            .header("accept", "audio/mpeg")
            .json(&TextToSpeechRequest {
                text,
                model_id: &self.config.model,
            })
            .send()
            .map_err(|e| AudioError::from_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            error!(status = %status, "ElevenLabs returned error");
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

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_synthesize_posts_to_voice_endpoint() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/text-to-speech/voice-it")
                .query_param("output_format", "mp3_44100_128")
                .header("xi-api-key", "el-test")
                .body_contains("\"model_id\":\"eleven_multilingual_v2\"");
            then.status(200).body(b"mp3-bytes".as_slice());
        });

        let mut config = ElevenLabsConfig::default();
        config
            .voices
            .insert("it".to_string(), "voice-it".to_string());
        let http = crate::generation::http_client(Duration::from_secs(5), Duration::from_secs(5))
            .unwrap();
        let speech = ElevenLabsSpeech::new(
            http,
            Some(&server.base_url()),
            SecretString::from("el-test".to_string()),
            config,
            4000,
        );

        let bytes = speech.synthesize("C'era una volta.", "it").unwrap();
        mock.assert();
        assert_eq!(bytes, b"mp3-bytes");
    }
}

use std::path::PathBuf;

use thiserror::Error;

use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Could not load {provider} credentials: {source}")]
    Credentials {
        provider: String,
        #[source]
        source: SecretError,
    },

    #[error("{provider} speech request timed out")]
    Timeout { provider: String },

    #[error("{provider} speech request failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} speech API error: {status} - {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} returned no audio")]
    EmptyAudio { provider: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Audio file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AudioError {
    pub fn kind(&self) -> &'static str {
        match self {
            AudioError::Credentials { .. } => "credentials",
            AudioError::Timeout { .. } => "audio_timeout",
            AudioError::Http { .. } => "audio_http",
            AudioError::Api { .. } => "audio_api",
            AudioError::EmptyAudio { .. } => "audio_empty",
            AudioError::Client(_) => "http_client",
            AudioError::Io { .. } => "audio_io",
        }
    }

    pub(crate) fn from_reqwest(provider: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AudioError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            AudioError::Http {
                provider: provider.to_string(),
                source: error,
            }
        }
    }
}

use thiserror::Error;

use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Missing {provider} credentials (set {hint})")]
    MissingCredentials { provider: String, hint: String },

    #[error("Could not load {provider} credentials: {source}")]
    Credentials {
        provider: String,
        #[source]
        source: SecretError,
    },

    #[error("Unknown generation backend '{0}'")]
    UnknownBackend(String),

    #[error("{provider} request timed out")]
    Timeout { provider: String },

    #[error("{provider} request failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API error: {status} - {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Failed to parse {provider} response: {reason}")]
    Parse { provider: String, reason: String },

    #[error("{provider} returned an empty story")]
    EmptyResponse { provider: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl GenerationError {
    /// Short machine-readable class, stored as `error_type` on failed jobs.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::MissingCredentials { .. } => "missing_credentials",
            GenerationError::Credentials { .. } => "credentials",
            GenerationError::UnknownBackend(_) => "unknown_backend",
            GenerationError::Timeout { .. } => "provider_timeout",
            GenerationError::Http { .. } => "provider_http",
            GenerationError::Api { .. } => "provider_api",
            GenerationError::Parse { .. } => "provider_response",
            GenerationError::EmptyResponse { .. } => "empty_response",
            GenerationError::Client(_) => "http_client",
        }
    }

    pub(crate) fn from_reqwest(provider: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GenerationError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            GenerationError::Http {
                provider: provider.to_string(),
                source: error,
            }
        }
    }
}

use std::time::Duration;

use super::{Generation, GenerationError, GenerationRequest, TextGenerator, TokenUsage};

pub const PLACEHOLDER_PROVIDER: &str = "placeholder";

/// Offline stand-in used in demo mode when a provider has no key.
/// The story says so in its own text.
pub struct PlaceholderGenerator {
    missing_provider: String,
}

impl PlaceholderGenerator {
    pub fn new(missing_provider: impl Into<String>) -> Self {
        Self {
            missing_provider: missing_provider.into(),
        }
    }
}

impl TextGenerator for PlaceholderGenerator {
    fn provider(&self) -> &str {
        PLACEHOLDER_PROVIDER
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        log::warn!(
            "No {} API key found, returning placeholder story for {}",
            self.missing_provider,
            request.request_id
        );
        let text = format!(
            "Once upon a time, there was a story about {} with characters like {}.\n\n\
             This is a placeholder because no {} API key was provided.",
            request.theme, request.characters, self.missing_provider
        );
        Ok(Generation {
            text,
            provider: PLACEHOLDER_PROVIDER.to_string(),
            model: request.model.clone(),
            usage: TokenUsage::default(),
            latency: Duration::ZERO,
        })
    }
}

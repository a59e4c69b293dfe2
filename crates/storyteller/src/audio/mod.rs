//! Text-to-speech narration.

pub mod chunker;
pub mod elevenlabs;
pub mod error;
pub mod narrator;
pub mod openai;

pub use chunker::chunk_text;
pub use elevenlabs::ElevenLabsSpeech;
pub use error::AudioError;
pub use narrator::Narrator;
pub use openai::OpenAiSpeech;

pub trait SpeechSynthesizer: Send + Sync {
    fn provider(&self) -> &str;

    /// Longest input, in characters, the backend accepts in one call.
    fn max_chars(&self) -> usize;

    /// Returns MP3 bytes for `text`, voiced for `language`.
    fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, AudioError>;
}

/// Voice for a language code, trying the full code before its base
/// (`pt-br` → `pt`).
pub(crate) fn voice_for<'a>(
    voices: &'a std::collections::HashMap<String, String>,
    default_voice: &'a str,
    language: &str,
) -> &'a str {
    let language = language.to_ascii_lowercase();
    voices
        .get(&language)
        .or_else(|| {
            language
                .split_once('-')
                .and_then(|(base, _)| voices.get(base))
        })
        .map(String::as_str)
        .unwrap_or(default_voice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_voice_for() {
        let voices: HashMap<String, String> = [("en", "alloy"), ("pt", "shimmer")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert_eq!(voice_for(&voices, "echo", "en"), "alloy");
        assert_eq!(voice_for(&voices, "echo", "PT-BR"), "shimmer");
        assert_eq!(voice_for(&voices, "echo", "fr"), "echo");
    }
}

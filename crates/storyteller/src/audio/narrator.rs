use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use super::{chunk_text, AudioError, ElevenLabsSpeech, OpenAiSpeech, SpeechSynthesizer};
use crate::config::{AudioBackend, Config};
use crate::secrets::resolve_secret_optional;

/// Turns finished story text into a single MP3 under `stories/audio/`.
///
/// Narration is best effort: chunk failures are logged and skipped, and the
/// job keeps going without audio when nothing could be synthesized.
pub struct Narrator {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    audio_dir: PathBuf,
}

impl Narrator {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            synthesizer: Some(synthesizer),
            audio_dir: audio_dir.into(),
        }
    }

    /// A narrator that never produces audio.
    pub fn disabled(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            synthesizer: None,
            audio_dir: audio_dir.into(),
        }
    }

    /// Builds the configured backend. Missing credentials leave narration
    /// unavailable rather than failing startup.
    pub fn from_config(config: &Config) -> Result<Self, AudioError> {
        let audio_dir = config.paths.audio_dir();
        if !config.audio.enabled {
            info!("Audio narration disabled in config");
            return Ok(Self::disabled(audio_dir));
        }

        let (name, provider) = match config.audio.backend {
            AudioBackend::Openai => ("openai", &config.generation.providers.openai),
            AudioBackend::Elevenlabs => ("elevenlabs", &config.generation.providers.elevenlabs),
        };
        let api_key = resolve_secret_optional(
            provider.api_key.as_deref(),
            provider.api_key_file.as_deref(),
            provider.api_key_env.as_deref(),
        )
        .map_err(|source| AudioError::Credentials {
            provider: name.to_string(),
            source,
        })?;

        let Some(api_key) = api_key else {
            warn!("No {} API key found, audio narration unavailable", name);
            return Ok(Self::disabled(audio_dir));
        };

        let http = crate::generation::http_client(
            config.worker.request_timeout(),
            config.worker.connect_timeout(),
        )
        .map_err(AudioError::Client)?;
        let base_url = provider.base_url.as_deref();
        let max_chars = config.audio.max_chars;

        let synthesizer: Arc<dyn SpeechSynthesizer> = match config.audio.backend {
            AudioBackend::Openai => Arc::new(OpenAiSpeech::new(
                http,
                base_url,
                api_key,
                config.audio.openai.clone(),
                max_chars,
            )),
            AudioBackend::Elevenlabs => Arc::new(ElevenLabsSpeech::new(
                http,
                base_url,
                api_key,
                config.audio.elevenlabs.clone(),
                max_chars,
            )),
        };
        Ok(Self::new(synthesizer, audio_dir))
    }

    pub fn is_available(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Returns the audio path relative to the stories directory
    /// (`audio/{job_id}.mp3`), or `None` when no audio was produced.
    pub fn narrate(&self, text: &str, language: &str, job_id: &str) -> Option<String> {
        let synthesizer = self.synthesizer.as_ref()?;

        let chunks = chunk_text(text, synthesizer.max_chars());
        if chunks.is_empty() {
            return None;
        }
        if let Err(e) = fs::create_dir_all(&self.audio_dir) {
            warn!("Failed to create audio directory: {}", e);
            return None;
        }

        let total = chunks.len();
        let mut parts = Vec::with_capacity(total);
        for (index, chunk) in chunks.iter().enumerate() {
            match synthesizer.synthesize(chunk, language) {
                Ok(bytes) => {
                    let part = self.part_path(job_id, index);
                    match fs::write(&part, &bytes) {
                        Ok(()) => parts.push(part),
                        Err(e) => warn!("Failed to write audio part {}/{}: {}", index + 1, total, e),
                    }
                }
                Err(e) => warn!(
                    "Audio chunk {}/{} failed for {} ({}): {}",
                    index + 1,
                    total,
                    job_id,
                    synthesizer.provider(),
                    e
                ),
            }
        }

        if parts.is_empty() {
            warn!("No audio produced for {}", job_id);
            return None;
        }

        let target = self.audio_dir.join(format!("{}.mp3", job_id));
        let result = concatenate(&parts, &target);
        for part in &parts {
            if let Err(e) = fs::remove_file(part) {
                warn!("Failed to remove audio part {}: {}", part.display(), e);
            }
        }

        match result {
            Ok(bytes) => {
                info!(
                    "Audio for {}: {}/{} chunks, {} bytes",
                    job_id,
                    parts.len(),
                    total,
                    bytes
                );
                Some(format!("audio/{}.mp3", job_id))
            }
            Err(e) => {
                warn!("Failed to assemble audio for {}: {}", job_id, e);
                let _ = fs::remove_file(&target);
                None
            }
        }
    }

    fn part_path(&self, job_id: &str, index: usize) -> PathBuf {
        self.audio_dir
            .join(format!("{}.part{:03}.mp3", job_id, index))
    }
}

/// MP3 frames are self-delimiting, so parts can be appended byte for byte.
fn concatenate(parts: &[PathBuf], target: &Path) -> io::Result<u64> {
    let mut out = File::create(target)?;
    let mut written = 0;
    for part in parts {
        let mut input = File::open(part)?;
        written += io::copy(&mut input, &mut out)?;
    }
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns the chunk text as audio, failing on chunks listed in `fail_on`.
    struct Scripted {
        fail_on: Vec<usize>,
        calls: Mutex<usize>,
        max_chars: usize,
    }

    impl Scripted {
        fn new(max_chars: usize, fail_on: Vec<usize>) -> Self {
            Self {
                fail_on,
                calls: Mutex::new(0),
                max_chars,
            }
        }
    }

    impl SpeechSynthesizer for Scripted {
        fn provider(&self) -> &str {
            "scripted"
        }

        fn max_chars(&self) -> usize {
            self.max_chars
        }

        fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>, AudioError> {
            let mut calls = self.calls.lock().unwrap();
            let index = *calls;
            *calls += 1;
            if self.fail_on.contains(&index) {
                return Err(AudioError::EmptyAudio {
                    provider: "scripted".to_string(),
                });
            }
            Ok(format!("[{}]", text).into_bytes())
        }
    }

    const TEXT: &str = "First part.\n\nSecond part.\n\nThird part.";

    fn leftover_parts(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .contains(".part")
            })
            .count()
    }

    #[test]
    fn test_narrate_concatenates_chunks_in_order() {
        let temp = TempDir::new().unwrap();
        let audio_dir = temp.path().join("audio");
        let narrator = Narrator::new(Arc::new(Scripted::new(12, vec![])), &audio_dir);

        let path = narrator.narrate(TEXT, "en", "job-1").unwrap();
        assert_eq!(path, "audio/job-1.mp3");

        let bytes = fs::read(audio_dir.join("job-1.mp3")).unwrap();
        assert_eq!(bytes, b"[First part.][Second part.][Third part.]");
        assert_eq!(leftover_parts(&audio_dir), 0);
    }

    #[test]
    fn test_failed_chunk_is_skipped() {
        let temp = TempDir::new().unwrap();
        let audio_dir = temp.path().join("audio");
        let narrator = Narrator::new(Arc::new(Scripted::new(12, vec![1])), &audio_dir);

        narrator.narrate(TEXT, "en", "job-2").unwrap();
        let bytes = fs::read(audio_dir.join("job-2.mp3")).unwrap();
        assert_eq!(bytes, b"[First part.][Third part.]");
    }

    #[test]
    fn test_all_chunks_failing_yields_none() {
        let temp = TempDir::new().unwrap();
        let audio_dir = temp.path().join("audio");
        let narrator = Narrator::new(Arc::new(Scripted::new(12, vec![0, 1, 2])), &audio_dir);

        assert!(narrator.narrate(TEXT, "en", "job-3").is_none());
        assert!(!audio_dir.join("job-3.mp3").exists());
    }

    #[test]
    fn test_disabled_narrator() {
        let temp = TempDir::new().unwrap();
        let narrator = Narrator::disabled(temp.path().join("audio"));
        assert!(!narrator.is_available());
        assert!(narrator.narrate(TEXT, "en", "job-4").is_none());
    }

    #[test]
    fn test_from_config_without_key_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::with_base_dir(temp.path());
        config.generation.providers.openai = Default::default();
        let narrator = Narrator::from_config(&config).unwrap();
        assert!(!narrator.is_available());
        assert_eq!(narrator.audio_dir(), temp.path().join("stories/audio"));
    }
}

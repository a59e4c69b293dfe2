use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub users: UsersConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// A config with every section at its default, rooted at `base`.
    pub fn with_base_dir(base: &std::path::Path) -> Self {
        let mut config = Self {
            version: "1.0".to_string(),
            paths: PathsConfig::default(),
            worker: WorkerConfig::default(),
            generation: GenerationConfig::default(),
            audio: AudioConfig::default(),
            users: UsersConfig::default(),
            metadata: MetadataConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.paths.rebase(base);
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_queue")]
    pub queue: PathBuf,
    #[serde(default = "default_processed")]
    pub processed: PathBuf,
    #[serde(default = "default_error")]
    pub error: PathBuf,
    /// HTML artifacts; narration lives in its `audio/` subdirectory.
    #[serde(default = "default_stories")]
    pub stories: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_model_control")]
    pub model_control: PathBuf,
    #[serde(default = "default_metadata_file")]
    pub metadata_file: PathBuf,
    #[serde(default = "default_usage_log")]
    pub usage_log: PathBuf,
}

fn default_queue() -> PathBuf {
    PathBuf::from("queue")
}

fn default_processed() -> PathBuf {
    PathBuf::from("processed")
}

fn default_error() -> PathBuf {
    PathBuf::from("error")
}

fn default_stories() -> PathBuf {
    PathBuf::from("stories")
}

fn default_database() -> PathBuf {
    PathBuf::from("data/storyteller.db")
}

fn default_model_control() -> PathBuf {
    PathBuf::from("child_storyteller_mcp.json")
}

fn default_metadata_file() -> PathBuf {
    PathBuf::from("story_metadata.json")
}

fn default_usage_log() -> PathBuf {
    PathBuf::from("logs/ai_usage.jsonl")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            processed: default_processed(),
            error: default_error(),
            stories: default_stories(),
            database: default_database(),
            model_control: default_model_control(),
            metadata_file: default_metadata_file(),
            usage_log: default_usage_log(),
        }
    }
}

impl PathsConfig {
    pub fn audio_dir(&self) -> PathBuf {
        self.stories.join("audio")
    }

    /// Makes every relative path relative to `base` (normally the directory
    /// holding the config file).
    pub fn rebase(&mut self, base: &std::path::Path) {
        for path in [
            &mut self.queue,
            &mut self.processed,
            &mut self.error,
            &mut self.stories,
            &mut self.database,
            &mut self.model_control,
            &mut self.metadata_file,
            &mut self.usage_log,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_post_job_pause_ms")]
    pub post_job_pause_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_post_job_pause_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            post_job_pause_ms: default_post_job_pause_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn post_job_pause(&self) -> Duration {
        Duration::from_millis(self.post_job_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Where to find a provider key and, optionally, a non-default endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    fn from_env(var: &str) -> Self {
        Self {
            api_key_env: Some(var.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai_provider")]
    pub openai: ProviderConfig,
    #[serde(default = "default_deepseek_provider")]
    pub deepseek: ProviderConfig,
    #[serde(default = "default_anthropic_provider")]
    pub anthropic: ProviderConfig,
    #[serde(default = "default_openrouter_provider")]
    pub openrouter: ProviderConfig,
    #[serde(default = "default_elevenlabs_provider")]
    pub elevenlabs: ProviderConfig,
}

fn default_openai_provider() -> ProviderConfig {
    ProviderConfig::from_env("OPENAI_API_KEY")
}

fn default_deepseek_provider() -> ProviderConfig {
    ProviderConfig::from_env("DEEPSEEK_API_KEY")
}

fn default_anthropic_provider() -> ProviderConfig {
    ProviderConfig::from_env("ANTHROPIC_API_KEY")
}

fn default_openrouter_provider() -> ProviderConfig {
    ProviderConfig::from_env("OPENROUTER_API_KEY")
}

fn default_elevenlabs_provider() -> ProviderConfig {
    ProviderConfig::from_env("ELEVENLABS_API_KEY")
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: default_openai_provider(),
            deepseek: default_deepseek_provider(),
            anthropic: default_anthropic_provider(),
            openrouter: default_openrouter_provider(),
            elevenlabs: default_elevenlabs_provider(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Substitute a labelled placeholder story when a provider key is missing
    /// instead of failing the job.
    #[serde(default)]
    pub demo_mode: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_model() -> String {
    "openai/gpt-3.5-turbo".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            demo_mode: false,
            temperature: default_temperature(),
            default_model: default_model(),
            providers: ProvidersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioBackend {
    #[default]
    Openai,
    Elevenlabs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: AudioBackend,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default)]
    pub openai: OpenAiSpeechConfig,
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
}

fn default_true() -> bool {
    true
}

fn default_max_chars() -> usize {
    4000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: AudioBackend::default(),
            max_chars: default_max_chars(),
            openai: OpenAiSpeechConfig::default(),
            elevenlabs: ElevenLabsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSpeechConfig {
    #[serde(default = "default_tts_model")]
    pub model: String,
    /// Language code → voice name.
    #[serde(default = "default_openai_voices")]
    pub voices: HashMap<String, String>,
    #[serde(default = "default_openai_voice")]
    pub default_voice: String,
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_openai_voices() -> HashMap<String, String> {
    [
        ("en", "alloy"),
        ("pt-br", "shimmer"),
        ("pt", "shimmer"),
        ("it", "nova"),
        ("es", "nova"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_openai_voice() -> String {
    "alloy".to_string()
}

impl Default for OpenAiSpeechConfig {
    fn default() -> Self {
        Self {
            model: default_tts_model(),
            voices: default_openai_voices(),
            default_voice: default_openai_voice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    #[serde(default = "default_elevenlabs_model")]
    pub model: String,
    #[serde(default = "default_elevenlabs_format")]
    pub output_format: String,
    /// Language code → voice id.
    #[serde(default)]
    pub voices: HashMap<String, String>,
    #[serde(default = "default_elevenlabs_voice")]
    pub default_voice: String,
}

fn default_elevenlabs_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_elevenlabs_format() -> String {
    "mp3_44100_128".to_string()
}

fn default_elevenlabs_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            model: default_elevenlabs_model(),
            output_format: default_elevenlabs_format(),
            voices: HashMap::new(),
            default_voice: default_elevenlabs_voice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersConfig {
    #[serde(default = "default_initial_credits")]
    pub initial_credits: i64,
}

fn default_initial_credits() -> i64 {
    10
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            initial_credits: default_initial_credits(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataBackend {
    #[default]
    Sqlite,
    JsonFile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub backend: MetadataBackend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

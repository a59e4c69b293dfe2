pub mod loader;
pub mod model_control;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use model_control::{ModelControl, DEFAULT_MAX_TOKENS};
pub use schema::{
    AudioBackend, AudioConfig, Config, ElevenLabsConfig, GenerationConfig, LogFormat,
    LoggingConfig, MetadataBackend, MetadataConfig, OpenAiSpeechConfig, PathsConfig,
    ProviderConfig, ProvidersConfig, UsersConfig, WorkerConfig,
};

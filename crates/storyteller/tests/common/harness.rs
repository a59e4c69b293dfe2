//! Test harness for isolated end-to-end runs.
//!
//! Each harness owns a temp directory laid out like a deployment (queue,
//! processed, error, stories, model control) and an in-memory database,
//! and hands out the real submitter, worker and library wired to them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use storyteller::audio::{AudioError, Narrator, SpeechSynthesizer};
use storyteller::config::{Config, GenerationConfig, MetadataBackend, ProviderConfig, ProvidersConfig};
use storyteller::db::{user_repo, Database};
use storyteller::generation::{
    Generation, GenerationError, GenerationRequest, GeneratorRegistry, GeneratorSource,
    ResolvedGenerator, TextGenerator, TokenUsage,
};
use storyteller::metadata::open_store;
use storyteller::storage::FileStorage;
use storyteller::submission::Submitter;
use storyteller::{JobStore, ModelControl, Pipeline, QueueScanner, StoryLibrary, Worker};

pub const MODEL_CONTROL: &str = r#"{
    "system_prompt": "You are a gentle storyteller for children.",
    "age_adaptation": {
        "3-5": "Use very simple words.",
        "5-8": "Use short sentences and a little humour."
    },
    "story_structure": "Open calmly, build a small problem, resolve it kindly.",
    "user_template": "Write a {length} story of about {tokens} tokens for ages {age_range}. Theme: {theme_description}. Characters: {characters}. Plot: {story_about}. Lesson: {lesson}.",
    "themes": {
        "space": "an adventure among the stars",
        "ocean": "a voyage under the sea"
    },
    "token_lengths": { "short": 1000, "medium": 2000, "long": 4000 }
}"#;

/// Replies with fixed text, or fails with an API status, and remembers
/// every request it saw.
pub struct ScriptedGenerator {
    reply: Result<String, u16>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(status),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(text) => Ok(Generation {
                text: text.clone(),
                provider: "scripted".to_string(),
                model: request.model.clone(),
                usage: TokenUsage {
                    prompt_tokens: Some(120),
                    completion_tokens: Some(480),
                },
                latency: Duration::from_millis(1),
            }),
            Err(status) => Err(GenerationError::Api {
                provider: "scripted".to_string(),
                status: *status,
                message: "model overloaded".to_string(),
            }),
        }
    }
}

struct Fixed(Arc<ScriptedGenerator>);

impl GeneratorSource for Fixed {
    fn resolve(&self, _backend: &str, model: &str) -> Result<ResolvedGenerator, GenerationError> {
        Ok(ResolvedGenerator {
            generator: self.0.clone(),
            model: model.to_string(),
        })
    }
}

/// Returns one byte per input character so chunk sizes are observable.
pub struct ToneSpeech {
    pub max_chars: usize,
}

impl SpeechSynthesizer for ToneSpeech {
    fn provider(&self) -> &str {
        "tone"
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>, AudioError> {
        Ok(vec![0xFF; text.chars().count()])
    }
}

/// Isolated deployment for one test.
pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub db: Database,
    control: Arc<ModelControl>,
}

impl TestHarness {
    /// Harness with the SQLite metadata backend.
    pub fn new() -> Self {
        Self::with_metadata_backend(MetadataBackend::Sqlite)
    }

    pub fn with_metadata_backend(backend: MetadataBackend) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = Config::with_base_dir(temp_dir.path());
        config.metadata.backend = backend;

        std::fs::write(&config.paths.model_control, MODEL_CONTROL)
            .expect("Failed to write model control document");
        let control = ModelControl::load(&config.paths.model_control)
            .expect("Failed to load model control document");

        Self {
            temp_dir,
            config,
            db: Database::open_in_memory().expect("Failed to open database"),
            control: Arc::new(control),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn stories_dir(&self) -> &Path {
        &self.config.paths.stories
    }

    pub fn jobs(&self) -> JobStore {
        JobStore::from_paths(&self.config.paths)
    }

    pub fn submitter(&self) -> Submitter {
        Submitter::new(
            self.jobs(),
            Arc::clone(&self.control),
            self.config.generation.default_model.clone(),
        )
        .with_database(self.db.clone())
    }

    pub fn library(&self) -> StoryLibrary {
        StoryLibrary::new(
            self.stories_dir(),
            self.jobs(),
            self.db.clone(),
            Arc::from(open_store(&self.config, &self.db)),
        )
    }

    pub fn pipeline(&self, generator: Arc<ScriptedGenerator>) -> Pipeline {
        self.pipeline_with(generator, Narrator::disabled(self.config.paths.audio_dir()))
    }

    pub fn pipeline_with(&self, generator: Arc<ScriptedGenerator>, narrator: Narrator) -> Pipeline {
        self.pipeline_from(Arc::new(Fixed(generator)), narrator)
    }

    /// Pipeline on the real provider registry in demo mode with no keys
    /// configured, so every backend answers with the placeholder story.
    pub fn demo_pipeline(&self) -> Pipeline {
        let generation = GenerationConfig {
            demo_mode: true,
            providers: ProvidersConfig {
                openai: ProviderConfig::default(),
                deepseek: ProviderConfig::default(),
                anthropic: ProviderConfig::default(),
                openrouter: ProviderConfig::default(),
                elevenlabs: ProviderConfig::default(),
            },
            ..GenerationConfig::default()
        };
        let registry = GeneratorRegistry::new(&generation, &self.config.worker)
            .expect("Failed to build provider registry");
        self.pipeline_from(
            Arc::new(registry),
            Narrator::disabled(self.config.paths.audio_dir()),
        )
    }

    fn pipeline_from(&self, generators: Arc<dyn GeneratorSource>, narrator: Narrator) -> Pipeline {
        Pipeline::new(
            self.jobs(),
            generators,
            narrator,
            FileStorage::new(self.stories_dir()),
        )
        .with_database(self.db.clone())
    }

    pub fn narrator(&self, max_chars: usize) -> Narrator {
        Narrator::new(
            Arc::new(ToneSpeech { max_chars }),
            self.config.paths.audio_dir(),
        )
    }

    pub fn worker(&self, pipeline: Pipeline) -> Worker {
        Worker::new(
            QueueScanner::new(&self.config.paths.queue),
            pipeline,
            &self.config.worker,
        )
    }

    /// Creates an account and returns its id.
    pub fn create_user(&self, username: &str, credits: i64) -> i64 {
        user_repo::create(
            &self.db,
            username,
            &format!("{}@example.com", username),
            credits,
        )
        .expect("Failed to create user")
        .id
    }

    /// Drops a hand-written file into the queue directory.
    pub fn write_queue_file(&self, filename: &str, content: &str) -> PathBuf {
        std::fs::create_dir_all(&self.config.paths.queue).expect("Failed to create queue dir");
        let path = self.config.paths.queue.join(filename);
        std::fs::write(&path, content).expect("Failed to write queue file");
        path
    }

    pub fn read_story(&self, filename: &str) -> String {
        std::fs::read_to_string(self.stories_dir().join(filename))
            .expect("Failed to read story page")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

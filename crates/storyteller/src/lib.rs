pub mod audio;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod job;
pub mod library;
pub mod metadata;
pub mod pipeline;
pub mod render;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod submission;
pub mod worker;

pub use audio::{Narrator, SpeechSynthesizer};
pub use config::{load_config, Config, ModelControl};
pub use db::Database;
pub use error::{ConfigError, QueueError, Result, StorageError, StorytellerError};
pub use generation::{GeneratorRegistry, GeneratorSource, TextGenerator};
pub use job::{check_status, JobRecord, JobState, JobStore, StatusReport};
pub use library::{StoryLibrary, StoryListing, StoryView};
pub use metadata::{MetadataStore, StoryStats};
pub use pipeline::{JobOutcome, Pipeline, PipelineError};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use submission::{SubmissionForm, Submitter};
pub use worker::{QueueScanner, Worker};

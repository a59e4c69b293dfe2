use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorytellerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Submission error: {0}")]
    Submission(#[from] crate::submission::SubmissionError),

    #[error("Library error: {0}")]
    Library(#[from] crate::library::LibraryError),

    #[error("Generation error: {0}")]
    Generation(#[from] crate::generation::GenerationError),

    #[error("Audio error: {0}")]
    Audio(#[from] crate::audio::AudioError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] crate::metadata::MetadataError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Model control document '{path}' is missing")]
    ModelControlMissing { path: PathBuf },

    #[error("Model control document '{path}' is invalid: {reason}")]
    ModelControlInvalid { path: PathBuf, reason: String },

    #[error("Invalid secret for '{provider}': {source}")]
    Secret {
        provider: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job record '{path}' is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize job record {request_id}: {source}")]
    Serialize {
        request_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Job {0} already exists in '{1}'")]
    Duplicate(String, PathBuf),

    #[error("Invalid job id '{0}'")]
    InvalidId(String),

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, StorytellerError>;

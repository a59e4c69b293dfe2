//! The job record: one story request, serialized as `{request_id}.json`.
//!
//! Fields appended on completion or failure are optional and skipped when
//! unset, so a completed job without narration has no `audio_file` key.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

/// Informational only. The directory holding the file is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryParameters {
    pub theme: String,
    #[serde(default)]
    pub theme_description: String,
    pub age_range: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_length")]
    pub length: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub characters: String,
    #[serde(default)]
    pub story_about: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson: Option<String>,
    #[serde(default = "default_ai_model")]
    pub ai_model: String,
    #[serde(default)]
    pub enable_audio: bool,
    /// `None` defers to the owner's account-level default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_length() -> String {
    "medium".to_string()
}

fn default_max_tokens() -> u32 {
    crate::config::DEFAULT_MAX_TOKENS
}

fn default_title() -> String {
    "My Story".to_string()
}

fn default_ai_model() -> String {
    "openai/gpt-3.5-turbo".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompts {
    pub system_prompt: String,
    pub user_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInfo {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
}

/// Per-stage wall-clock durations in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub generation_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_seconds: Option<f64>,
    pub render_seconds: f64,
    pub total_processing_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    pub request_id: Uuid,
    pub timestamp: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub parameters: StoryParameters,
    pub prompts: Prompts,
    pub status: JobStatus,
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_info: Option<AiInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_request: Option<serde_json::Value>,
}

fn legacy_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_backend() -> String {
    "openai".to_string()
}

/// What went wrong with a job, as stored in `error/{request_id}.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub error: String,
    pub error_type: String,
    pub error_detail: String,
}

impl JobRecord {
    /// A fresh `pending` record with a newly generated id.
    pub fn pending(parameters: StoryParameters, prompts: Prompts, backend: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            request_id: Uuid::new_v4(),
            timestamp: Local::now().naive_local(),
            user_id: None,
            username: None,
            email: None,
            parameters,
            prompts,
            status: JobStatus::Pending,
            backend: backend.to_string(),
            completed_at: None,
            output_file: None,
            audio_file: None,
            ai_info: None,
            timing: None,
            error: None,
            error_type: None,
            error_detail: None,
            error_time: None,
            original_request: None,
        }
    }

    pub fn id(&self) -> String {
        self.request_id.to_string()
    }

    pub fn mark_completed(
        &mut self,
        output_file: String,
        audio_file: Option<String>,
        ai_info: AiInfo,
        timing: Timing,
    ) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Local::now().naive_local());
        self.output_file = Some(output_file);
        self.audio_file = audio_file;
        self.ai_info = Some(ai_info);
        self.timing = Some(timing);
    }
}

/// Appends failure fields to a raw job document in place.
///
/// Works on raw JSON because the file that failed may not deserialize as a
/// [`JobRecord`] at all. Non-object payloads are wrapped.
pub fn annotate_failure(
    original: serde_json::Value,
    failure: &JobFailure,
    now: NaiveDateTime,
) -> serde_json::Value {
    let snapshot = original.clone();
    let mut doc = match original {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("original_payload".to_string(), other);
            map
        }
    };
    doc.insert("status".into(), serde_json::json!("error"));
    doc.insert("error".into(), serde_json::json!(failure.error));
    doc.insert("error_type".into(), serde_json::json!(failure.error_type));
    doc.insert("error_detail".into(), serde_json::json!(failure.error_detail));
    doc.insert(
        "error_time".into(),
        serde_json::json!(now.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
    );
    doc.entry("original_request").or_insert(snapshot);
    serde_json::Value::Object(doc)
}

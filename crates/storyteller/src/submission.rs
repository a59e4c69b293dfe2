//! Turns a story form into a queued job.
//!
//! Validation, prompt assembly and credit accounting happen here so the
//! worker only ever sees well-formed records.

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelControl;
use crate::db::{story_repo, user_repo, Database, DatabaseError};
use crate::error::QueueError;
use crate::generation::ProviderKind;
use crate::job::{JobRecord, JobStore, Prompts, StoryParameters};
use crate::sanitize::{preview, redact_email};

const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("pt-br", "Brazilian Portuguese"),
    ("pt", "Portuguese"),
    ("it", "Italian"),
    ("es", "Spanish"),
];

/// Display name for a language code; unknown codes fall back to English.
pub fn language_name(code: &str) -> &'static str {
    let code = code.trim().to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or("English")
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Selected theme '{0}' is not available")]
    UnknownTheme(String),

    #[error("An age range is required")]
    MissingAgeRange,

    #[error("Unknown generation backend '{0}'")]
    UnknownBackend(String),

    #[error("No credits left for user {0}")]
    NoCredits(i64),

    #[error("Unknown user {0}")]
    UnknownUser(i64),

    #[error("Story {0} not found")]
    StoryNotFound(i64),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Fields of the story request form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionForm {
    pub theme: String,
    pub age_range: String,
    #[serde(default = "default_length")]
    pub length: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub lesson: Option<String>,
    #[serde(default)]
    pub characters: String,
    #[serde(default)]
    pub story_about: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Falls back to the configured default model.
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub enable_audio: bool,
    #[serde(default)]
    pub is_private: Option<bool>,
}

fn default_length() -> String {
    "medium".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl SubmissionForm {
    pub fn new(theme: impl Into<String>, age_range: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            age_range: age_range.into(),
            length: default_length(),
            language: default_language(),
            lesson: None,
            characters: String::new(),
            story_about: String::new(),
            title: None,
            ai_model: None,
            backend: None,
            enable_audio: false,
            is_private: None,
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub request_id: String,
    pub record: JobRecord,
    /// Balance after the deduction; `None` for anonymous submissions.
    pub credits_left: Option<i64>,
}

pub struct Submitter {
    store: JobStore,
    control: Arc<ModelControl>,
    db: Option<Database>,
    default_model: String,
}

impl Submitter {
    pub fn new(store: JobStore, control: Arc<ModelControl>, default_model: impl Into<String>) -> Self {
        Self {
            store,
            control,
            db: None,
            default_model: default_model.into(),
        }
    }

    /// Enables accounts: submissions by a user need and spend a credit.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Validates the form, writes the job into `queue`, then deducts a
    /// credit. Nothing is written when validation fails.
    pub fn submit(
        &self,
        form: &SubmissionForm,
        user_id: Option<i64>,
    ) -> Result<Submission, SubmissionError> {
        let theme_description = self
            .control
            .theme_description(&form.theme)
            .ok_or_else(|| SubmissionError::UnknownTheme(form.theme.clone()))?
            .to_string();
        if form.age_range.trim().is_empty() {
            return Err(SubmissionError::MissingAgeRange);
        }
        let backend = match form.backend.as_deref().filter(|b| !b.trim().is_empty()) {
            Some(name) => ProviderKind::from_backend(name)
                .ok_or_else(|| SubmissionError::UnknownBackend(name.to_string()))?,
            None => ProviderKind::OpenAi,
        };

        let user = match (user_id, &self.db) {
            (Some(id), Some(db)) => {
                let user = user_repo::find_by_id(db, id)?.ok_or(SubmissionError::UnknownUser(id))?;
                if user.credits <= 0 {
                    return Err(SubmissionError::NoCredits(id));
                }
                Some(user)
            }
            _ => None,
        };

        let max_tokens = self.control.max_tokens_for(&form.length);
        let parameters = StoryParameters {
            theme: form.theme.clone(),
            theme_description,
            age_range: form.age_range.trim().to_string(),
            language: form.language.clone(),
            length: form.length.clone(),
            max_tokens,
            title: form
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "My Story".to_string()),
            characters: form.characters.clone(),
            story_about: form.story_about.clone(),
            lesson: form.lesson.clone().filter(|l| !l.trim().is_empty()),
            ai_model: form
                .ai_model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.default_model.clone()),
            enable_audio: form.enable_audio,
            is_private: form.is_private,
        };
        let prompts = build_prompts(&self.control, &parameters);

        let mut record = JobRecord::pending(parameters, prompts, backend.as_str());
        record.user_id = user_id;
        if user_id.is_some() {
            record.username = Some(
                user.as_ref()
                    .map(|u| u.username.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
            );
            record.email = Some(
                user.as_ref()
                    .map(|u| u.email.clone())
                    .unwrap_or_else(|| "unknown@example.com".to_string()),
            );
        }

        self.store.enqueue(&record)?;
        info!(
            "Queued story {} ({}, {}, {}) for {}",
            record.request_id,
            record.parameters.theme,
            record.parameters.age_range,
            preview(&record.parameters.title, 40),
            record
                .email
                .as_deref()
                .map(redact_email)
                .unwrap_or_else(|| "anonymous".to_string())
        );

        let credits_left = match (user_id, &self.db) {
            (Some(id), Some(db)) => {
                if !user_repo::use_credit(db, id)? {
                    // Another submission spent the last credit after our check.
                    warn!("User {} ran out of credits while queueing {}", id, record.request_id);
                }
                user_repo::credits(db, id)?
            }
            _ => None,
        };

        Ok(Submission {
            request_id: record.id(),
            record,
            credits_left,
        })
    }

    /// Form values of an existing story, for "recreate". No job is queued.
    pub fn prefill_from_story(&self, story_id: i64) -> Result<SubmissionForm, SubmissionError> {
        let db = self
            .db
            .as_ref()
            .ok_or(SubmissionError::StoryNotFound(story_id))?;
        let row = story_repo::find_by_id(db, story_id)?
            .ok_or(SubmissionError::StoryNotFound(story_id))?;

        Ok(SubmissionForm {
            theme: row.theme.unwrap_or_default(),
            age_range: row.age_range.unwrap_or_else(|| "10-12".to_string()),
            length: default_length(),
            language: row.language.unwrap_or_else(default_language),
            lesson: row.lesson,
            characters: row.characters.unwrap_or_default(),
            story_about: row.story_about.unwrap_or_default(),
            title: row.title,
            ai_model: row.ai_model,
            backend: Some(backend_for_provider(row.provider.as_deref()).to_string()),
            enable_audio: row.audio_file.is_some(),
            is_private: row.is_private,
        })
    }
}

/// Backend to request again for a story answered by `provider`. Providers
/// that are not a backend themselves (the demo placeholder) map to OpenAI.
fn backend_for_provider(provider: Option<&str>) -> &'static str {
    provider
        .and_then(ProviderKind::from_backend)
        .unwrap_or(ProviderKind::OpenAi)
        .as_str()
}

/// System prompt plus age, structure and language blocks; user message from
/// the template.
pub fn build_prompts(control: &ModelControl, parameters: &StoryParameters) -> Prompts {
    let mut system_prompt = control.system_prompt.clone();

    if let Some(guidance) = control
        .age_adaptation
        .get(&parameters.age_range)
        .filter(|g| !g.trim().is_empty())
    {
        system_prompt.push_str(&format!(
            "\n\nFOR AGE RANGE {}:\n{}",
            parameters.age_range, guidance
        ));
    }
    if let Some(structure) = control
        .story_structure
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        system_prompt.push_str(&format!("\n\nSTORY STRUCTURE:\n{}", structure));
    }
    system_prompt.push_str(&format!(
        "\n\nLANGUAGE:\nPlease write the story in {}.",
        language_name(&parameters.language)
    ));

    let tokens = parameters.max_tokens.to_string();
    let substitutions = [
        ("{age_range}", parameters.age_range.as_str()),
        ("{characters}", parameters.characters.as_str()),
        ("{theme_description}", parameters.theme_description.as_str()),
        ("{story_about}", parameters.story_about.as_str()),
        ("{lesson}", parameters.lesson.as_deref().unwrap_or("")),
        ("{length}", parameters.length.as_str()),
        ("{tokens}", tokens.as_str()),
    ];
    let user_message = substitutions
        .iter()
        .fold(control.user_template.clone(), |acc, (key, value)| {
            acc.replace(key, value)
        });

    Prompts {
        system_prompt,
        user_message,
    }
}

//! The model control document: prompt templates, theme table and length
//! presets shared by the submission side and the worker.
//!
//! Both processes refuse to start without it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tokens requested when a length preset is not in `token_lengths`.
pub const DEFAULT_MAX_TOKENS: u32 = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelControl {
    pub system_prompt: String,
    /// Age range (e.g. `"5-8"`) → extra guidance appended to the system prompt.
    #[serde(default)]
    pub age_adaptation: HashMap<String, String>,
    #[serde(default)]
    pub story_structure: Option<String>,
    pub user_template: String,
    /// Theme id → description shown to the model.
    pub themes: BTreeMap<String, String>,
    #[serde(default)]
    pub lessons: Vec<serde_json::Value>,
    /// Length preset (`short`, `medium`, ...) → max tokens.
    #[serde(default)]
    pub token_lengths: HashMap<String, u32>,
    /// Provider catalogue passed through to the submission form.
    #[serde(default)]
    pub ai_providers: serde_json::Value,
}

impl ModelControl {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::ModelControlMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(ConfigError::ReadFile {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let control = Self::from_str_at(&content, path)?;
        log::info!(
            "Loaded model control document with {} themes",
            control.themes.len()
        );
        Ok(control)
    }

    fn from_str_at(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let control: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::ModelControlInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if control.themes.is_empty() {
            return Err(ConfigError::ModelControlInvalid {
                path: path.to_path_buf(),
                reason: "theme table is empty".to_string(),
            });
        }
        if control.user_template.trim().is_empty() {
            return Err(ConfigError::ModelControlInvalid {
                path: path.to_path_buf(),
                reason: "user_template is empty".to_string(),
            });
        }
        Ok(control)
    }

    pub fn theme_description(&self, theme: &str) -> Option<&str> {
        self.themes.get(theme).map(String::as_str)
    }

    pub fn max_tokens_for(&self, length: &str) -> u32 {
        self.token_lengths
            .get(length)
            .copied()
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }
}

impl std::str::FromStr for ModelControl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_at(s, Path::new("<inline>"))
    }
}

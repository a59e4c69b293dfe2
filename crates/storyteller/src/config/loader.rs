use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Loads, validates and returns the config at `path`. Relative paths inside
/// the file are resolved against the file's own directory.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    if let Some(base) = path.parent() {
        config.paths.rebase(base);
    }
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker.poll_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "worker.poll_interval_ms must be greater than zero".to_string(),
        });
    }

    if config.worker.request_timeout_secs == 0 || config.worker.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "provider timeouts must be finite and greater than zero".to_string(),
        });
    }

    if config.audio.max_chars == 0 {
        return Err(ConfigError::Validation {
            message: "audio.max_chars must be greater than zero".to_string(),
        });
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        return Err(ConfigError::Validation {
            message: format!(
                "generation.temperature must be between 0 and 2, got {}",
                config.generation.temperature
            ),
        });
    }

    let paths = &config.paths;
    let dirs = [&paths.queue, &paths.processed, &paths.error];
    for (i, a) in dirs.iter().enumerate() {
        if a.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: "queue, processed and error paths must not be empty".to_string(),
            });
        }
        for b in dirs.iter().skip(i + 1) {
            if a == b {
                return Err(ConfigError::Validation {
                    message: format!(
                        "queue, processed and error must be distinct directories ('{}' repeated)",
                        a.display()
                    ),
                });
            }
        }
    }

    Ok(())
}

//! Per-call usage accounting for generation adapters.
//!
//! Every call becomes one `tracing` event on the `storyteller::usage` target
//! and one JSON line in the usage log file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Local;
use serde::{Deserialize, Serialize};

use super::{Generation, GenerationError, GenerationRequest, TextGenerator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub timestamp: String,
    pub request_id: String,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub latency_ms: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct UsageLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Emits the entry and appends it to the log file. A failed write is only
    /// logged; accounting never fails a job.
    pub fn record(&self, entry: &UsageEntry) {
        tracing::info!(
            target: "storyteller::usage",
            request_id = %entry.request_id,
            provider = %entry.provider,
            model = %entry.model,
            prompt_tokens = entry.prompt_tokens,
            completion_tokens = entry.completion_tokens,
            latency_ms = entry.latency_ms,
            ok = entry.ok,
            "generation call"
        );

        if let Err(e) = self.append(entry) {
            log::warn!(
                "Failed to write usage log {}: {}",
                crate::sanitize::redact_path(&self.path),
                e
            );
        }
    }

    fn append(&self, entry: &UsageEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

/// Wraps a generator so every call, successful or not, is recorded.
pub struct MeteredGenerator {
    inner: Arc<dyn TextGenerator>,
    usage: Arc<UsageLog>,
}

impl MeteredGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, usage: Arc<UsageLog>) -> Self {
        Self { inner, usage }
    }
}

impl TextGenerator for MeteredGenerator {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let started = Instant::now();
        let result = self.inner.generate(request);

        let mut entry = UsageEntry {
            timestamp: Local::now().to_rfc3339(),
            request_id: request.request_id.clone(),
            provider: self.inner.provider().to_string(),
            model: request.model.clone(),
            prompt_tokens: None,
            completion_tokens: None,
            latency_ms: started.elapsed().as_millis() as u64,
            ok: result.is_ok(),
            error: None,
        };
        match &result {
            Ok(generation) => {
                entry.model = generation.model.clone();
                entry.prompt_tokens = generation.usage.prompt_tokens;
                entry.completion_tokens = generation.usage.completion_tokens;
                entry.latency_ms = generation.latency.as_millis() as u64;
            }
            Err(e) => entry.error = Some(e.kind().to_string()),
        }
        self.usage.record(&entry);

        result
    }
}

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tracing::{debug, error, info, info_span, warn};

use crate::audio::Narrator;
use crate::config::Config;
use crate::db::{story_repo, Database};
use crate::generation::{
    Generation, GenerationRequest, GeneratorRegistry, GeneratorSource, UsageLog,
};
use crate::job::{AiInfo, JobFailure, JobRecord, JobStore, Timing};
use crate::render::{artifact_stem, render_story, StoryArtifact};
use crate::sanitize;
use crate::storage::FileStorage;
use crate::worker::QueueEntry;

use super::context::PipelineContext;
use super::error::PipelineError;

const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        request_id: String,
        output_file: String,
        audio_file: Option<String>,
    },
    Failed {
        request_id: String,
        error_type: String,
        error: String,
    },
}

impl JobOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            JobOutcome::Completed { request_id, .. } | JobOutcome::Failed { request_id, .. } => {
                request_id
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

/// Takes one queued job to `processed/` or `error/`.
pub struct Pipeline {
    jobs: JobStore,
    generators: Arc<dyn GeneratorSource>,
    narrator: Narrator,
    storage: FileStorage,
    db: Option<Database>,
    temperature: f32,
}

impl Pipeline {
    /// Production constructor: provider registry with usage logging, the
    /// configured narrator and the stories directory.
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let usage = Arc::new(UsageLog::new(&config.paths.usage_log));
        let registry =
            GeneratorRegistry::new(&config.generation, &config.worker)?.with_usage_log(usage);
        let narrator = Narrator::from_config(config)?;

        Ok(Self::new(
            JobStore::from_paths(&config.paths),
            Arc::new(registry),
            narrator,
            FileStorage::new(&config.paths.stories),
        )
        .with_temperature(config.generation.temperature))
    }

    pub fn new(
        jobs: JobStore,
        generators: Arc<dyn GeneratorSource>,
        narrator: Narrator,
        storage: FileStorage,
    ) -> Self {
        Self {
            jobs,
            generators,
            narrator,
            storage,
            db: None,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Completed jobs with an owner get a `user_stories` row.
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Runs every step for one queue file. Any error ends the job in
    /// `error/`; this never returns early with the file still queued unless
    /// the error directory itself cannot be written.
    pub fn run(&self, entry: &QueueEntry) -> JobOutcome {
        let started = Instant::now();
        let _job_span = info_span!("job",
            request_id = %entry.request_id,
            file = %sanitize::redact_path(&entry.path),
        )
        .entered();

        let mut ctx = PipelineContext::new(entry.clone());
        match self.execute(&mut ctx, started) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(path) = ctx.output_path.take() {
                    if let Err(remove_err) = self.storage.remove(&path) {
                        warn!("Could not remove orphaned page {}: {}", path.display(), remove_err);
                    }
                }
                if let Some(audio) = ctx.audio_file.take() {
                    let path = self.storage.output_directory().join(audio);
                    if let Err(remove_err) = self.storage.remove(&path) {
                        warn!("Could not remove orphaned audio {}: {}", path.display(), remove_err);
                    }
                }
                self.record_failure(&ctx.entry, &e)
            }
        }
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        started: Instant,
    ) -> Result<JobOutcome, PipelineError> {
        // Step 1: Parse the queue file
        let mut record = {
            let _step = info_span!("parse").entered();
            self.step_parse(&ctx.entry)?
        };

        // Step 2: Generate the story text
        let generation = {
            let _step = info_span!("generate",
                backend = %record.backend,
                model = %record.parameters.ai_model,
            )
            .entered();
            self.step_generate(&record, &mut ctx.timing)?
        };

        // Step 3: Narrate (optional, never fails the job)
        if record.parameters.enable_audio {
            let _step = info_span!("narrate").entered();
            ctx.audio_file = self.step_narrate(&record, &generation.text, &mut ctx.timing);
        }

        // Step 4: Render and store the page
        let output_file = {
            let _step = info_span!("render").entered();
            let path = self.step_render(&record, &generation, ctx.audio_file.as_deref(), &mut ctx.timing)?;
            let name = sanitize::redact_path(&path);
            ctx.output_path = Some(path);
            name
        };

        // Step 5: Finalize the record into processed/
        {
            let _step = info_span!("finalize").entered();
            ctx.timing.total_processing_seconds = started.elapsed().as_secs_f64();
            record.mark_completed(
                output_file.clone(),
                ctx.audio_file.clone(),
                AiInfo {
                    provider: generation.provider.clone(),
                    model: generation.model.clone(),
                    prompt_tokens: generation.usage.prompt_tokens,
                    completion_tokens: generation.usage.completion_tokens,
                },
                ctx.timing.clone(),
            );
            self.jobs.complete(&record)?;
            ctx.output_path = None;
        }

        self.record_story(&record);

        info!(
            output_file = %output_file,
            audio = ctx.audio_file.is_some(),
            seconds = ctx.timing.total_processing_seconds,
            "Story completed"
        );
        Ok(JobOutcome::Completed {
            request_id: record.id(),
            output_file,
            audio_file: ctx.audio_file.clone(),
        })
    }

    fn step_parse(&self, entry: &QueueEntry) -> Result<JobRecord, PipelineError> {
        let record = self
            .jobs
            .read(&entry.path)
            .map_err(PipelineError::Malformed)?;

        // finalizing writes and removes by record id, so the two must agree
        if record.id() != entry.request_id {
            return Err(PipelineError::IdMismatch {
                file: sanitize::redact_path(&entry.path),
                request_id: record.id(),
            });
        }
        debug!(
            theme = %record.parameters.theme,
            age_range = %record.parameters.age_range,
            language = %record.parameters.language,
            "Parsed job"
        );
        Ok(record)
    }

    fn step_generate(
        &self,
        record: &JobRecord,
        timing: &mut Timing,
    ) -> Result<Generation, PipelineError> {
        let started = Instant::now();
        let params = &record.parameters;
        let resolved = self.generators.resolve(&record.backend, &params.ai_model)?;

        let request = GenerationRequest {
            request_id: record.id(),
            system_prompt: record.prompts.system_prompt.clone(),
            user_message: record.prompts.user_message.clone(),
            model: resolved.model,
            max_tokens: params.max_tokens,
            temperature: self.temperature,
            theme: params.theme.clone(),
            characters: params.characters.clone(),
        };
        let generation = resolved.generator.generate(&request)?;

        timing.generation_seconds = started.elapsed().as_secs_f64();
        debug!(
            provider = %generation.provider,
            chars = generation.text.chars().count(),
            "Generated story text"
        );
        Ok(generation)
    }

    fn step_narrate(&self, record: &JobRecord, text: &str, timing: &mut Timing) -> Option<String> {
        if !self.narrator.is_available() {
            debug!("Narration requested but unavailable");
            return None;
        }
        let started = Instant::now();
        let audio = self
            .narrator
            .narrate(text, &record.parameters.language, &record.id());
        timing.audio_seconds = Some(started.elapsed().as_secs_f64());
        audio
    }

    fn step_render(
        &self,
        record: &JobRecord,
        generation: &Generation,
        audio_file: Option<&str>,
        timing: &mut Timing,
    ) -> Result<std::path::PathBuf, PipelineError> {
        let started = Instant::now();
        let params = &record.parameters;
        let id = record.id();
        let now = Local::now().naive_local();

        let html = render_story(&StoryArtifact {
            request_id: &id,
            title: &params.title,
            text: &generation.text,
            story_about: Some(params.story_about.as_str()).filter(|s| !s.trim().is_empty()),
            language: &params.language,
            audio_file,
            provider: &generation.provider,
            model: &generation.model,
            author: record.username.as_deref(),
            created: now,
        });
        let path = self
            .storage
            .store(html.as_bytes(), "", &artifact_stem(&params.title, now), "html")?;

        timing.render_seconds = started.elapsed().as_secs_f64();
        Ok(path)
    }

    /// Best effort: the job is already complete when this runs.
    fn record_story(&self, record: &JobRecord) {
        let (Some(db), Some(_)) = (&self.db, record.user_id) else {
            return;
        };
        match story_repo::upsert_from_record(db, record, None) {
            Ok(id) => debug!(story_id = id, "Recorded story row"),
            Err(e) => warn!("Could not record story row for {}: {}", record.request_id, e),
        }
    }

    fn record_failure(&self, entry: &QueueEntry, error: &PipelineError) -> JobOutcome {
        let failure = JobFailure {
            error: error.to_string(),
            error_type: error.kind().to_string(),
            error_detail: error.detail(),
        };
        error!(error_type = %failure.error_type, "Job failed: {}", failure.error);

        let original = match self.jobs.read_raw(&entry.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Queue file unreadable while recording failure: {}", e);
                serde_json::Value::Null
            }
        };
        if let Err(e) = self.jobs.fail(&entry.request_id, original, &failure) {
            error!("Could not move job {} to error: {}", entry.request_id, e);
        }

        JobOutcome::Failed {
            request_id: entry.request_id.clone(),
            error_type: failure.error_type,
            error: failure.error,
        }
    }
}

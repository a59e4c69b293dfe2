pub mod record;
pub mod status;
pub mod store;

pub use record::{AiInfo, JobFailure, JobRecord, JobStatus, Prompts, StoryParameters, Timing};
pub use status::{check_status, NextStep, StatusReport};
pub use store::{is_valid_job_id, JobState, JobStore, QueueCounts};

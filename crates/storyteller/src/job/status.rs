//! Read-only status lookups for the waiting page.

use log::warn;

use super::record::JobRecord;
use super::store::{JobState, JobStore};

#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Queued(JobRecord),
    Processed(JobRecord),
    /// `record` is `None` when the error file is not a valid job record,
    /// e.g. a queue file that was never parseable.
    Failed {
        record: Option<Box<JobRecord>>,
        error: String,
    },
    NotFound,
}

/// What the waiting page should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    ShowStory(String),
    ShowForm(String),
    KeepWaiting,
    NotFound,
}

impl StatusReport {
    pub fn state(&self) -> Option<JobState> {
        match self {
            StatusReport::Queued(_) => Some(JobState::Queued),
            StatusReport::Processed(_) => Some(JobState::Processed),
            StatusReport::Failed { .. } => Some(JobState::Failed),
            StatusReport::NotFound => None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.state().map(JobState::as_str).unwrap_or("not_found")
    }

    pub fn next_step(&self) -> NextStep {
        match self {
            StatusReport::Queued(_) => NextStep::KeepWaiting,
            StatusReport::Processed(record) => match &record.output_file {
                Some(file) => NextStep::ShowStory(file.clone()),
                None => NextStep::ShowForm("The story finished without an output file".to_string()),
            },
            StatusReport::Failed { error, .. } => NextStep::ShowForm(error.clone()),
            StatusReport::NotFound => NextStep::NotFound,
        }
    }
}

/// Reports which directory holds the job, checking queue, processed and
/// error in that order. Never mutates anything, so repeated calls on a
/// settled job return the same report.
///
/// Unreadable files degrade to a `Failed` report carrying the read error.
pub fn check_status(store: &JobStore, request_id: &str) -> StatusReport {
    let Some((state, path)) = store.locate(request_id) else {
        return StatusReport::NotFound;
    };

    match state {
        JobState::Queued | JobState::Processed => match store.read(&path) {
            Ok(record) if state == JobState::Queued => StatusReport::Queued(record),
            Ok(record) => StatusReport::Processed(record),
            Err(e) => {
                warn!("Unreadable {} job file for {}: {}", state, request_id, e);
                StatusReport::Failed {
                    record: None,
                    error: format!("The job file could not be read: {}", e),
                }
            }
        },
        JobState::Failed => match store.read(&path) {
            Ok(record) => {
                let error = record
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string());
                StatusReport::Failed {
                    record: Some(Box::new(record)),
                    error,
                }
            }
            Err(_) => {
                let error = store
                    .read_raw(&path)
                    .ok()
                    .and_then(|raw| raw.get("error").and_then(|e| e.as_str()).map(String::from))
                    .unwrap_or_else(|| "Unknown error".to_string());
                StatusReport::Failed {
                    record: None,
                    error,
                }
            }
        },
    }
}

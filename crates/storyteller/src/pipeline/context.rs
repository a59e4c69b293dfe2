use std::path::PathBuf;

use crate::job::Timing;
use crate::worker::QueueEntry;

pub struct PipelineContext {
    // Input
    pub entry: QueueEntry,

    // Narration result, relative to the stories directory
    pub audio_file: Option<String>,

    // Stored page; removed again if the record cannot be finalized
    pub output_path: Option<PathBuf>,

    pub timing: Timing,
}

impl PipelineContext {
    pub fn new(entry: QueueEntry) -> Self {
        Self {
            entry,
            audio_file: None,
            output_path: None,
            timing: Timing::default(),
        }
    }
}

use thiserror::Error;

use crate::error::{QueueError, StorageError};
use crate::generation::GenerationError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Job file could not be parsed: {0}")]
    Malformed(#[source] QueueError),

    #[error("Job file '{file}' holds record {request_id}")]
    IdMismatch { file: String, request_id: String },

    #[error("Story generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Job record could not be finalized: {0}")]
    Finalize(#[from] QueueError),
}

impl PipelineError {
    /// Short class stored as `error_type` in the error directory.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Malformed(_) => "malformed_request",
            PipelineError::IdMismatch { .. } => "id_mismatch",
            PipelineError::Generation(e) => e.kind(),
            PipelineError::Storage(_) => "storage",
            PipelineError::Finalize(_) => "queue",
        }
    }

    /// Display text of this error and every source beneath it.
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !detail.contains(&text) {
                detail.push_str(": ");
                detail.push_str(&text);
            }
            source = cause.source();
        }
        detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_delegates_to_generation() {
        let err = PipelineError::from(GenerationError::UnknownBackend("llama".to_string()));
        assert_eq!(err.kind(), "unknown_backend");
    }

    #[test]
    fn test_detail_includes_sources_once() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume");
        let err = PipelineError::Storage(StorageError::WriteFile {
            path: "stories/a.html".into(),
            source: io,
        });
        let detail = err.detail();
        assert!(detail.starts_with("Storage failed: Failed to write file"));
        assert_eq!(detail.matches("read-only volume").count(), 1);
    }
}

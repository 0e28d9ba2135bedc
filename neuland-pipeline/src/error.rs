// Pipeline Errors
// Fatal errors raised before a sweep dispatches any task

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that abort a sweep up front
///
/// Per-task problems never surface here; they are recorded as a
/// [`StageStatus`](crate::stages::StageStatus) in the task's result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot load config file {path}: {message}")]
    ConfigFile { path: PathBuf, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot serialize report: {0}")]
    Report(String),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Result type for process operations
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Errors that can occur during process operations
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Process exited with non-zero status: {0}")]
    NonZeroExit(ExitStatus),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to read from process: {0}")]
    ReadError(io::Error),

    #[error("Process output parse error: {0}")]
    ParseError(String),

    #[error("Process produced no output")]
    NoOutput,
}

impl From<ProcessError> for crate::error::AgentError {
    fn from(err: ProcessError) -> Self {
        crate::error::AgentError::Process(err.to_string())
    }
}

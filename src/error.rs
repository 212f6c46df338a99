// src/error.rs
use std::io;
use std::process::ExitCode;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, AgentError>;

/// Custom Error type for the agents
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl AgentError {
    /// Whether a fetch failing with this error only degrades the current tick
    pub fn is_soft(&self) -> bool {
        matches!(self, AgentError::Malformed(_) | AgentError::Process(_))
    }

    /// The process exit status this error terminates the agent with
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            AgentError::Io(_) | AgentError::Setup(_) | AgentError::Connection(_) => {
                ExitStatus::IoFailure
            }
            AgentError::Timeout(_) => ExitStatus::FetchTimeout,
            _ => ExitStatus::Fault,
        }
    }
}

/// Exit statuses a supervisor can use to tell crash categories apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Interrupted or finished normally
    Clean = 0,
    /// Setup, connectivity or output failure
    IoFailure = 1,
    /// Configuration error or internal fault
    Fault = 2,
    /// The source did not answer within the fetch timeout
    FetchTimeout = 3,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Map an `anyhow` error coming out of a binary onto an exit status
pub fn exit_status_of(err: &anyhow::Error) -> ExitStatus {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AgentError>())
        .map(AgentError::exit_status)
        .unwrap_or(ExitStatus::Fault)
}

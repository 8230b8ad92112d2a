use thiserror::Error;

/// Operational errors surfaced by the orchestrator. Analytical components
/// never raise across their boundary; these cover job management only.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Job {0} is already terminal")]
    JobAlreadyTerminal(String),

    #[error("Dependency failure: {message}")]
    DependencyFailure { message: String, transient: bool },

    #[error("Job timed out")]
    Timeout,

    #[error("Job cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

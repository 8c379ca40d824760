//! Error types for batchmix
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in batchmix
#[derive(Debug, Error)]
pub enum BatchError {
    /// Malformed planner input, surfaced before any job is queued
    #[error("Planning error: {0}")]
    Planning(String),

    /// Task id is unknown to the scheduler
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A task with the same id is already tracked
    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    /// Descriptor failed validation on submit
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Operation not allowed in the task's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The media engine reported a failure
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The attempt was terminated on request
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Every allowed attempt failed
    #[error("Retry budget exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// The scheduler coordinator is no longer running
    #[error("Scheduler is not running")]
    SchedulerClosed,

    /// Media engine setup or configuration error
    #[error("Engine error: {0}")]
    Engine(String),

    /// Invalid glob pattern in a pool source
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<glob::PatternError> for BatchError {
    fn from(err: glob::PatternError) -> Self {
        BatchError::Pattern(err.to_string())
    }
}

/// Result type alias for batchmix operations
pub type Result<T> = std::result::Result<T, BatchError>;

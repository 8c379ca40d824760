//! Task descriptor and lifecycle state
//!
//! A TaskDescriptor is everything the media engine needs for one job. It is
//! immutable once submitted except for `attempt`, which the scheduler bumps on
//! each retry.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BatchError, Result};
use crate::id::generate_task_id;

fn default_thread_budget() -> u32 {
    1
}

/// One executable job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    /// Unique identifier ("task-1738300800123-17-a1b2")
    pub id: String,

    /// Which media operation to run (e.g. "video-stitch", "image-composite")
    pub operation_kind: String,

    /// Human-readable job name, also the default output stem
    pub name: String,

    /// Directory the engine writes outputs into
    pub output_dir: PathBuf,

    /// Opaque engine parameters, passed through unchanged
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Input files, one per pool in pool order
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Higher runs first; ties run in submission order
    #[serde(default)]
    pub priority: i32,

    /// Retries allowed after the first failed attempt
    #[serde(default)]
    pub max_retry: u32,

    /// Threads the engine may use for this job
    #[serde(default = "default_thread_budget")]
    pub thread_budget: u32,

    /// Retries consumed so far (0 on the first attempt)
    #[serde(default)]
    pub attempt: u32,
}

impl TaskDescriptor {
    /// Create a descriptor with a fresh id and default budgets
    pub fn new(operation_kind: impl Into<String>, name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: generate_task_id(),
            operation_kind: operation_kind.into(),
            name: name.into(),
            output_dir: output_dir.into(),
            params: Map::new(),
            files: Vec::new(),
            priority: 0,
            max_retry: 0,
            thread_budget: default_thread_budget(),
            attempt: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn with_thread_budget(mut self, threads: u32) -> Self {
        self.thread_budget = threads;
        self
    }

    /// Check the descriptor can be queued
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(BatchError::InvalidTask("id must not be empty".to_string()));
        }
        if self.operation_kind.trim().is_empty() {
            return Err(BatchError::InvalidTask(format!("{}: operation kind must not be empty", self.id)));
        }
        if self.thread_budget == 0 {
            return Err(BatchError::InvalidTask(format!("{}: thread budget must be at least 1", self.id)));
        }
        Ok(())
    }

    /// True while another attempt is allowed after a failure
    pub fn has_retry_budget(&self) -> bool {
        self.attempt < self.max_retry
    }

    /// 1-based number of the current attempt
    pub fn attempt_number(&self) -> u32 {
        self.attempt + 1
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Waiting for a concurrency slot
    Queued,
    /// An attempt is executing
    Running,
    /// Engine reported success
    Completed,
    /// Retry budget exhausted
    Failed,
    /// Terminated on request
    Cancelled,
}

impl TaskState {
    /// Returns true if no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a task held by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub descriptor: TaskDescriptor,
    pub state: TaskState,
    /// Attempts started so far
    pub attempts: u32,
    /// Error of the most recent failed attempt
    pub last_error: Option<String>,
    /// Outputs reported by the successful attempt
    pub outputs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    /// Fresh snapshot for a just-submitted task
    pub fn queued(descriptor: TaskDescriptor) -> Self {
        Self {
            descriptor,
            state: TaskState::Queued,
            attempts: 0,
            last_error: None,
            outputs: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

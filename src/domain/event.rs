//! Task events delivered to observers.

use serde::{Deserialize, Serialize};

use super::task::TaskSnapshot;

/// Event channel names
pub mod channels {
    pub const TASK_CREATED: &str = "task-created";
    pub const TASK_UPDATED: &str = "task-updated";
    pub const TASK_STARTED: &str = "task-started";
    pub const TASK_PROGRESS: &str = "task-progress";
    pub const TASK_LOG: &str = "task-log";
    pub const TASK_COMPLETED: &str = "task-completed";
    pub const TASK_FAILED: &str = "task-failed";
    pub const TASK_CANCELLED: &str = "task-cancelled";
    pub const TASK_DELETED: &str = "task-deleted";
}

/// A notification about one task.
///
/// Serialized with the channel name in an `event` field, e.g.
/// `{"event":"task-log","taskId":"task-1","log":"frame=10"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TaskEvent {
    /// Task accepted into the queue
    #[serde(rename = "task-created")]
    Created { task: Box<TaskSnapshot> },

    /// State or bookkeeping changed (admission, retry re-queue)
    #[serde(rename = "task-updated")]
    Updated { task: Box<TaskSnapshot> },

    /// A new attempt began
    #[serde(rename = "task-started", rename_all = "camelCase")]
    Started { task_id: String, attempt: u32 },

    /// Percent complete, optionally naming the current step
    #[serde(rename = "task-progress", rename_all = "camelCase")]
    Progress {
        task_id: String,
        progress: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
    },

    /// One diagnostic line from the worker
    #[serde(rename = "task-log", rename_all = "camelCase")]
    Log { task_id: String, log: String },

    #[serde(rename = "task-completed", rename_all = "camelCase")]
    Completed { task_id: String, outputs: Vec<String> },

    #[serde(rename = "task-failed", rename_all = "camelCase")]
    Failed { task_id: String, error: String },

    #[serde(rename = "task-cancelled", rename_all = "camelCase")]
    Cancelled { task_id: String },

    #[serde(rename = "task-deleted", rename_all = "camelCase")]
    Deleted { task_id: String },
}

impl TaskEvent {
    pub fn created(task: TaskSnapshot) -> Self {
        TaskEvent::Created { task: Box::new(task) }
    }

    pub fn updated(task: TaskSnapshot) -> Self {
        TaskEvent::Updated { task: Box::new(task) }
    }

    /// Id of the task this event concerns
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Created { task } | TaskEvent::Updated { task } => task.id(),
            TaskEvent::Started { task_id, .. }
            | TaskEvent::Progress { task_id, .. }
            | TaskEvent::Log { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::Cancelled { task_id }
            | TaskEvent::Deleted { task_id } => task_id,
        }
    }

    /// Channel name this event is published on
    pub fn channel(&self) -> &'static str {
        match self {
            TaskEvent::Created { .. } => channels::TASK_CREATED,
            TaskEvent::Updated { .. } => channels::TASK_UPDATED,
            TaskEvent::Started { .. } => channels::TASK_STARTED,
            TaskEvent::Progress { .. } => channels::TASK_PROGRESS,
            TaskEvent::Log { .. } => channels::TASK_LOG,
            TaskEvent::Completed { .. } => channels::TASK_COMPLETED,
            TaskEvent::Failed { .. } => channels::TASK_FAILED,
            TaskEvent::Cancelled { .. } => channels::TASK_CANCELLED,
            TaskEvent::Deleted { .. } => channels::TASK_DELETED,
        }
    }

    /// Check if this event ends the task
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::Completed { .. } | TaskEvent::Failed { .. } | TaskEvent::Cancelled { .. }
        )
    }
}

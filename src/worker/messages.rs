//! Worker to coordinator protocol.

use crate::domain::AttemptResult;

/// Message sent by an execution unit.
///
/// A unit sends `Ready` once, any number of `Log` lines, and at most one
/// `Result`. A unit that goes away without a `Result` is reported as failed,
/// or cancelled if it was killed.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Unit initialized and running the job
    Ready,
    /// One diagnostic line, in emission order
    Log(String),
    /// Terminal outcome of the attempt
    Result(AttemptResult),
}

impl WorkerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::Ready => "ready",
            WorkerMessage::Log(_) => "log",
            WorkerMessage::Result(_) => "result",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerMessage::Result(_))
    }
}

/// A worker message tagged with the attempt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub task_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub unit_id: u64,
    pub message: WorkerMessage,
}

//! Media engine collaborator
//!
//! The scheduler treats media operations as opaque: an engine receives a
//! descriptor, may stream diagnostic lines while it works, and returns the
//! produced outputs or an error.
//!
//! - MediaEngine: the trait a worker unit drives for one attempt
//! - EngineContext: log sink, kill signal and pid slot handed to the engine
//! - ProcessEngine: runs an external command per operation kind
//! - progress: percentage extraction from log lines

mod process;
pub mod progress;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::TaskDescriptor;
use crate::error::Result;
use crate::worker::WorkerMessage;

pub use process::{OperationCommand, ProcessEngine};
pub use progress::parse_progress;

/// Executes one media job.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Run one attempt of `descriptor`.
    ///
    /// Diagnostic lines go through `ctx.log`. When `ctx` is cancelled the
    /// engine should stop its work and return `BatchError::Cancelled`.
    async fn run(&self, descriptor: &TaskDescriptor, ctx: &EngineContext) -> Result<Vec<String>>;
}

/// Per-attempt context passed to the engine.
#[derive(Clone)]
pub struct EngineContext {
    messages: mpsc::UnboundedSender<WorkerMessage>,
    cancel: CancellationToken,
    pid: Arc<AtomicU32>,
}

impl EngineContext {
    pub fn new(messages: mpsc::UnboundedSender<WorkerMessage>, cancel: CancellationToken, pid: Arc<AtomicU32>) -> Self {
        Self { messages, cancel, pid }
    }

    /// Forward one diagnostic line to the coordinator.
    pub fn log(&self, line: impl Into<String>) {
        let _ = self.messages.send(WorkerMessage::Log(line.into()));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the attempt has been killed.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Record the OS process backing this attempt.
    pub fn set_pid(&self, pid: u32) {
        self.pid.store(pid, Ordering::Release);
    }
}

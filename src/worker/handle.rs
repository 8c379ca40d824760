//! Handle to one running execution unit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Owns the execution unit of a single attempt.
///
/// Never reused: a retry gets a new handle. Dropping the handle stops the
/// unit if it is still running.
#[derive(Debug)]
pub struct WorkerHandle {
    unit_id: u64,
    task_id: String,
    attempt: u32,
    cancel: CancellationToken,
    killed: Arc<AtomicBool>,
    pid: Arc<AtomicU32>,
    started: Instant,
}

impl WorkerHandle {
    pub(crate) fn new(
        unit_id: u64,
        task_id: String,
        attempt: u32,
        cancel: CancellationToken,
        killed: Arc<AtomicBool>,
        pid: Arc<AtomicU32>,
    ) -> Self {
        Self {
            unit_id,
            task_id,
            attempt,
            cancel,
            killed,
            pid,
            started: Instant::now(),
        }
    }

    pub fn unit_id(&self) -> u64 {
        self.unit_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// OS process id, once the engine has spawned one
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Terminate the unit. Its end is reported as `Cancelled`.
    pub fn kill(&self) {
        if !self.killed.swap(true, Ordering::AcqRel) {
            tracing::info!(task_id = %self.task_id, attempt = self.attempt, unit = self.unit_id, "Killing worker");
        }
        self.cancel.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

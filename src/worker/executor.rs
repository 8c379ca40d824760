//! Starts isolated execution units for attempts.
//!
//! Each attempt runs in its own spawned task with its own message channel.
//! A relay task forwards that channel to the coordinator and, once the unit
//! has ended, sends the terminal `Result`. Panics stay inside the unit and
//! come back as failures.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use super::handle::WorkerHandle;
use super::messages::{WorkerMessage, WorkerReport};
use crate::domain::{AttemptResult, TaskDescriptor};
use crate::engine::{EngineContext, MediaEngine};
use crate::error::BatchError;

/// Default time a killed engine gets to stop on its own
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(2000);

pub struct WorkerExecutor {
    engine: Arc<dyn MediaEngine>,
    reports: mpsc::UnboundedSender<WorkerReport>,
    kill_grace: Duration,
    next_unit: AtomicU64,
}

impl WorkerExecutor {
    pub fn new(engine: Arc<dyn MediaEngine>, reports: mpsc::UnboundedSender<WorkerReport>) -> Self {
        Self {
            engine,
            reports,
            kill_grace: DEFAULT_KILL_GRACE,
            next_unit: AtomicU64::new(1),
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Spawn a unit for one attempt of `descriptor`.
    pub fn start(&self, descriptor: TaskDescriptor) -> WorkerHandle {
        let unit_id = self.next_unit.fetch_add(1, Ordering::Relaxed);
        let task_id = descriptor.id.clone();
        let attempt = descriptor.attempt_number();

        let cancel = CancellationToken::new();
        let killed = Arc::new(AtomicBool::new(false));
        let pid = Arc::new(AtomicU32::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        let ctx = EngineContext::new(tx.clone(), cancel.clone(), pid.clone());
        let engine = self.engine.clone();
        let grace = self.kill_grace;

        tracing::debug!(task_id = %task_id, attempt, unit = unit_id, "Starting worker");

        let unit = tokio::spawn(async move {
            let _ = tx.send(WorkerMessage::Ready);

            let outcome = tokio::select! {
                result = engine.run(&descriptor, &ctx) => Some(result),
                _ = async {
                    ctx.cancelled().await;
                    tokio::time::sleep(grace).await;
                } => None,
            };

            match outcome {
                Some(Ok(outputs)) => {
                    let _ = tx.send(WorkerMessage::Result(AttemptResult::succeeded(outputs)));
                }
                Some(Err(BatchError::Cancelled(_))) | None => {}
                Some(Err(e)) => {
                    let _ = tx.send(WorkerMessage::Result(AttemptResult::failed(e.to_string())));
                }
            }
        });

        let relay = Relay {
            task_id: task_id.clone(),
            attempt,
            unit_id,
            reports: self.reports.clone(),
            killed: killed.clone(),
        };
        tokio::spawn(relay.run(rx, unit));

        WorkerHandle::new(unit_id, task_id, attempt, cancel, killed, pid)
    }

    /// Terminate the unit behind `handle`.
    pub fn kill(&self, handle: &WorkerHandle) {
        handle.kill();
    }
}

struct Relay {
    task_id: String,
    attempt: u32,
    unit_id: u64,
    reports: mpsc::UnboundedSender<WorkerReport>,
    killed: Arc<AtomicBool>,
}

impl Relay {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<WorkerMessage>, mut unit: tokio::task::JoinHandle<()>) {
        let mut result = None;

        let joined = loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Some(msg) => self.accept(msg, &mut result),
                    None => break (&mut unit).await,
                },
                joined = &mut unit => break joined,
            }
        };

        while let Ok(msg) = rx.try_recv() {
            self.accept(msg, &mut result);
        }

        let result = self.finish(result, joined);
        tracing::debug!(task_id = %self.task_id, attempt = self.attempt, unit = self.unit_id, result = ?result, "Worker ended");
        self.send(WorkerMessage::Result(result));
    }

    fn accept(&self, msg: WorkerMessage, result: &mut Option<AttemptResult>) {
        match msg {
            WorkerMessage::Result(r) => {
                if result.is_none() {
                    *result = Some(r);
                }
            }
            other => self.send(other),
        }
    }

    fn finish(&self, result: Option<AttemptResult>, joined: Result<(), JoinError>) -> AttemptResult {
        if self.killed.load(Ordering::Acquire) {
            return AttemptResult::Cancelled;
        }
        match (result, joined) {
            (Some(result), _) => result,
            (None, Err(e)) if e.is_panic() => {
                AttemptResult::failed(format!("worker crashed: {}", panic_message(e.into_panic())))
            }
            (None, _) => AttemptResult::failed("worker exited without reporting a result"),
        }
    }

    fn send(&self, message: WorkerMessage) {
        let report = WorkerReport {
            task_id: self.task_id.clone(),
            attempt: self.attempt,
            unit_id: self.unit_id,
            message,
        };
        if self.reports.send(report).is_err() {
            tracing::debug!(task_id = %self.task_id, "Coordinator gone, dropping worker report");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Scheduler construction and control surface.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::concurrency::{ConcurrencyConfig, SharedConcurrency};
use super::coordinator::{Command, Coordinator, CoordinatorConfig};
use super::retry::RetryPolicy;
use super::stats::SchedulerStats;
use crate::domain::{TaskDescriptor, TaskSnapshot};
use crate::engine::MediaEngine;
use crate::error::{BatchError, Result};
use crate::events::{EventReporter, EventStream};
use crate::system::{CpuInfo, detect_cpu_cores};
use crate::worker::DEFAULT_KILL_GRACE;

/// Pending control requests before callers wait on send
const COMMAND_BUFFER: usize = 256;

/// Builder for a running scheduler.
pub struct Scheduler {
    engine: Arc<dyn MediaEngine>,
    concurrency: SharedConcurrency,
    retry: RetryPolicy,
    kill_grace: Duration,
    events: Arc<EventReporter>,
    cores: usize,
}

impl Scheduler {
    /// Create a Scheduler with default configuration.
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            concurrency: SharedConcurrency::default(),
            retry: RetryPolicy::default(),
            kill_grace: DEFAULT_KILL_GRACE,
            events: Arc::new(EventReporter::new()),
            cores: detect_cpu_cores(),
        }
    }

    pub fn with_concurrency(mut self, config: ConcurrencyConfig) -> Self {
        self.concurrency = SharedConcurrency::new(config);
        self
    }

    /// Use a concurrency handle owned elsewhere.
    pub fn with_shared_concurrency(mut self, concurrency: SharedConcurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_events(mut self, events: Arc<EventReporter>) -> Self {
        self.events = events;
        self
    }

    /// Override the detected core count used for overload warnings.
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    /// Start the coordinator task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let coordinator = Coordinator::new(
            rx,
            CoordinatorConfig {
                engine: self.engine,
                events: self.events.clone(),
                concurrency: self.concurrency.clone(),
                retry: self.retry,
                kill_grace: self.kill_grace,
                cores: self.cores,
            },
        );
        tokio::spawn(coordinator.run());

        SchedulerHandle {
            commands: tx,
            events: self.events,
            concurrency: self.concurrency,
            cores: self.cores,
        }
    }
}

/// Wire shape of a submit reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String>> for SubmitResponse {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(task_id) => Self {
                success: true,
                task_id: Some(task_id),
                error: None,
            },
            Err(e) => Self {
                success: false,
                task_id: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Cloneable control surface of a running scheduler.
///
/// The coordinator stops once every handle is dropped or
/// [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    events: Arc<EventReporter>,
    concurrency: SharedConcurrency,
    cores: usize,
}

impl SchedulerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| BatchError::SchedulerClosed)?;
        rx.await.map_err(|_| BatchError::SchedulerClosed)
    }

    /// Queue a task. Returns its id.
    pub async fn submit(&self, descriptor: TaskDescriptor) -> Result<String> {
        self.request(|reply| Command::Submit { descriptor, reply }).await?
    }

    /// Queue several tasks, stopping at the first rejection.
    pub async fn submit_all(&self, descriptors: Vec<TaskDescriptor>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            ids.push(self.submit(descriptor).await?);
        }
        Ok(ids)
    }

    /// Cancel a queued or running task.
    ///
    /// A running task stays `Running` until its worker confirms termination;
    /// watch for `task-cancelled`.
    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Cancel { task_id, reply }).await?
    }

    /// Drop a queued or finished task from bookkeeping.
    pub async fn delete(&self, task_id: &str) -> Result<()> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Delete { task_id, reply }).await?
    }

    /// Change the concurrency budget. Running tasks are never preempted.
    pub async fn set_concurrency(&self, max_concurrent_tasks: usize, threads_per_task: u32) -> Result<ConcurrencyConfig> {
        let applied = self
            .concurrency
            .set(ConcurrencyConfig::new(max_concurrent_tasks, threads_per_task));
        self.commands
            .send(Command::Reschedule)
            .await
            .map_err(|_| BatchError::SchedulerClosed)?;
        Ok(applied)
    }

    pub fn concurrency(&self) -> ConcurrencyConfig {
        self.concurrency.get()
    }

    pub fn cpu_info(&self) -> CpuInfo {
        CpuInfo { cores: self.cores }
    }

    pub async fn stats(&self) -> Result<SchedulerStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub async fn task(&self, task_id: &str) -> Result<TaskSnapshot> {
        let id = task_id.to_string();
        self.request(|reply| Command::Task { task_id: id, reply })
            .await?
            .ok_or_else(|| BatchError::TaskNotFound(task_id.to_string()))
    }

    /// All tracked tasks in submission order.
    pub async fn tasks(&self) -> Result<Vec<TaskSnapshot>> {
        self.request(|reply| Command::Tasks { reply }).await
    }

    /// Resolves once nothing is queued, running or waiting to retry.
    pub async fn wait_idle(&self) -> Result<()> {
        self.request(|reply| Command::WaitIdle { reply }).await
    }

    /// Cancel all work and stop the coordinator.
    pub async fn shutdown(&self) -> Result<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) | Err(BatchError::SchedulerClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn subscribe(&self, task_id: Option<&str>) -> EventStream {
        self.events.subscribe(task_id)
    }

    pub fn events(&self) -> Arc<EventReporter> {
        self.events.clone()
    }
}

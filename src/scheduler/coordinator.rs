//! Scheduler coordinator.
//!
//! One task owns the queue, the running set and every task's bookkeeping.
//! Control calls arrive as [`Command`]s, worker output as [`WorkerReport`]s;
//! both are handled one at a time, so admission never races.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use super::concurrency::{ConcurrencyConfig, SharedConcurrency};
use super::queue::TaskQueue;
use super::retry::RetryPolicy;
use super::stats::{BatchSummary, SchedulerStats, TaskCounts};
use crate::domain::{AttemptResult, TaskDescriptor, TaskEvent, TaskSnapshot, TaskState};
use crate::engine::{MediaEngine, parse_progress};
use crate::error::{BatchError, Result};
use crate::events::EventReporter;
use crate::system::HostSampler;
use crate::worker::{WorkerExecutor, WorkerHandle, WorkerMessage, WorkerReport};

/// Requests from a `SchedulerHandle`.
pub(crate) enum Command {
    Submit {
        descriptor: TaskDescriptor,
        reply: oneshot::Sender<Result<String>>,
    },
    Cancel {
        task_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Delete {
        task_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Concurrency changed; admit if slots opened up
    Reschedule,
    Stats {
        reply: oneshot::Sender<SchedulerStats>,
    },
    Task {
        task_id: String,
        reply: oneshot::Sender<Option<TaskSnapshot>>,
    },
    Tasks {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },
    WaitIdle {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct TaskEntry {
    snapshot: TaskSnapshot,
    seq: u64,
}

struct RunningAttempt {
    handle: WorkerHandle,
    kill_requested: bool,
}

enum Final {
    Completed(Vec<String>),
    Failed(String),
    Cancelled,
}

pub(crate) struct Coordinator {
    commands: mpsc::Receiver<Command>,
    reports: mpsc::UnboundedReceiver<WorkerReport>,
    requeue_tx: mpsc::UnboundedSender<String>,
    requeue_rx: mpsc::UnboundedReceiver<String>,
    executor: WorkerExecutor,
    events: Arc<EventReporter>,
    concurrency: SharedConcurrency,
    retry: RetryPolicy,
    host: HostSampler,
    cores: usize,
    kill_grace: Duration,
    tasks: HashMap<String, TaskEntry>,
    queue: TaskQueue,
    running: HashMap<String, RunningAttempt>,
    /// Failed tasks waiting out the retry delay
    pending_retry: HashSet<String>,
    summary: BatchSummary,
    idle_waiters: Vec<oneshot::Sender<()>>,
    overloaded: bool,
    shutting_down: bool,
    next_seq: u64,
}

pub(crate) struct CoordinatorConfig {
    pub engine: Arc<dyn MediaEngine>,
    pub events: Arc<EventReporter>,
    pub concurrency: SharedConcurrency,
    pub retry: RetryPolicy,
    pub kill_grace: Duration,
    pub cores: usize,
}

impl Coordinator {
    pub(crate) fn new(commands: mpsc::Receiver<Command>, config: CoordinatorConfig) -> Self {
        let (report_tx, reports) = mpsc::unbounded_channel();
        let (requeue_tx, requeue_rx) = mpsc::unbounded_channel();
        let executor = WorkerExecutor::new(config.engine, report_tx).with_kill_grace(config.kill_grace);

        Self {
            commands,
            reports,
            requeue_tx,
            requeue_rx,
            executor,
            events: config.events,
            concurrency: config.concurrency,
            retry: config.retry,
            host: HostSampler::new(),
            cores: config.cores,
            kill_grace: config.kill_grace,
            tasks: HashMap::new(),
            queue: TaskQueue::new(),
            running: HashMap::new(),
            pending_retry: HashSet::new(),
            summary: BatchSummary::default(),
            idle_waiters: Vec::new(),
            overloaded: false,
            shutting_down: false,
            next_seq: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!(cores = self.cores, "Scheduler started");

        loop {
            let keep_running = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        // every handle dropped
                        self.shutdown().await;
                        false
                    }
                },
                Some(report) = self.reports.recv() => {
                    self.handle_report(report);
                    true
                }
                Some(task_id) = self.requeue_rx.recv() => {
                    self.requeue(&task_id);
                    true
                }
            };

            self.notify_idle();
            if !keep_running {
                break;
            }
        }

        tracing::info!("Scheduler stopped");
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Submit { descriptor, reply } => {
                let result = self.submit(descriptor);
                let _ = reply.send(result);
                self.admit();
            }
            Command::Cancel { task_id, reply } => {
                let _ = reply.send(self.cancel(&task_id));
            }
            Command::Delete { task_id, reply } => {
                let _ = reply.send(self.delete(&task_id));
            }
            Command::Reschedule => self.admit(),
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Task { task_id, reply } => {
                let _ = reply.send(self.tasks.get(&task_id).map(|e| e.snapshot.clone()));
            }
            Command::Tasks { reply } => {
                let mut entries: Vec<&TaskEntry> = self.tasks.values().collect();
                entries.sort_by_key(|e| e.seq);
                let _ = reply.send(entries.into_iter().map(|e| e.snapshot.clone()).collect());
            }
            Command::WaitIdle { reply } => {
                if self.is_idle() {
                    let _ = reply.send(());
                } else {
                    self.idle_waiters.push(reply);
                }
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn submit(&mut self, descriptor: TaskDescriptor) -> Result<String> {
        descriptor.validate()?;
        if self.tasks.contains_key(&descriptor.id) {
            return Err(BatchError::DuplicateTask(descriptor.id));
        }

        let task_id = descriptor.id.clone();
        let snapshot = TaskSnapshot::queued(descriptor.clone());
        self.next_seq += 1;
        self.tasks.insert(
            task_id.clone(),
            TaskEntry {
                snapshot: snapshot.clone(),
                seq: self.next_seq,
            },
        );
        self.queue.push_back(descriptor);
        self.summary.total += 1;

        tracing::info!(
            task_id = %task_id,
            priority = snapshot.descriptor.priority,
            queued = self.queue.len(),
            "Task submitted"
        );
        self.events.emit(TaskEvent::created(snapshot));
        Ok(task_id)
    }

    fn cancel(&mut self, task_id: &str) -> Result<()> {
        let state = self.state_of(task_id)?;
        match state {
            TaskState::Queued => {
                self.queue.remove(task_id);
                self.pending_retry.remove(task_id);
                self.finalize(task_id, Final::Cancelled);
                Ok(())
            }
            TaskState::Running => {
                if let Some(attempt) = self.running.get_mut(task_id)
                    && !attempt.kill_requested
                {
                    attempt.kill_requested = true;
                    self.executor.kill(&attempt.handle);
                }
                Ok(())
            }
            _ => Err(BatchError::InvalidState(format!("{} is already {}", task_id, state))),
        }
    }

    fn delete(&mut self, task_id: &str) -> Result<()> {
        let state = self.state_of(task_id)?;
        if state == TaskState::Running {
            return Err(BatchError::InvalidState(format!(
                "{} is running; cancel it before deleting",
                task_id
            )));
        }

        self.queue.remove(task_id);
        self.pending_retry.remove(task_id);
        self.tasks.remove(task_id);
        if state == TaskState::Queued {
            self.summary.total = self.summary.total.saturating_sub(1);
        }

        tracing::info!(task_id = %task_id, state = %state, "Task deleted");
        self.events.emit(TaskEvent::Deleted {
            task_id: task_id.to_string(),
        });
        Ok(())
    }

    fn state_of(&self, task_id: &str) -> Result<TaskState> {
        self.tasks
            .get(task_id)
            .map(|e| e.snapshot.state)
            .ok_or_else(|| BatchError::TaskNotFound(task_id.to_string()))
    }

    /// Start queued tasks while slots are free.
    fn admit(&mut self) {
        if self.shutting_down {
            return;
        }

        let config = self.concurrency.get();
        while self.running.len() < config.max_concurrent_tasks {
            let Some(descriptor) = self.queue.pop() else {
                break;
            };
            self.start(descriptor, &config);
        }

        self.check_overload(&config);
    }

    fn start(&mut self, mut descriptor: TaskDescriptor, config: &ConcurrencyConfig) {
        let Some(entry) = self.tasks.get_mut(&descriptor.id) else {
            tracing::warn!(task_id = %descriptor.id, "Queued task has no bookkeeping, skipping");
            return;
        };
        entry.snapshot.state = TaskState::Running;
        entry.snapshot.attempts += 1;
        entry.snapshot.started_at = Some(Utc::now());
        let snapshot = entry.snapshot.clone();

        descriptor.thread_budget = descriptor.thread_budget.min(config.threads_per_task).max(1);
        let task_id = descriptor.id.clone();
        let attempt = descriptor.attempt_number();

        self.events.emit(TaskEvent::updated(snapshot));
        self.events.emit(TaskEvent::Started {
            task_id: task_id.clone(),
            attempt,
        });

        let handle = self.executor.start(descriptor);
        self.running.insert(
            task_id.clone(),
            RunningAttempt {
                handle,
                kill_requested: false,
            },
        );

        tracing::info!(
            task_id = %task_id,
            attempt,
            running = self.running.len(),
            max = config.max_concurrent_tasks,
            "Task started"
        );
    }

    fn check_overload(&mut self, config: &ConcurrencyConfig) {
        let running = self.running.len();
        let overloaded = config.is_overloaded(running, self.cores);
        if overloaded && !self.overloaded {
            tracing::warn!(
                running,
                threads_per_task = config.threads_per_task,
                demand = config.thread_demand(running),
                cores = self.cores,
                "Thread demand exceeds available cores"
            );
        }
        self.overloaded = overloaded;
    }

    fn handle_report(&mut self, report: WorkerReport) {
        let current = self
            .running
            .get(&report.task_id)
            .is_some_and(|a| a.handle.unit_id() == report.unit_id);
        if !current {
            tracing::debug!(
                task_id = %report.task_id,
                unit = report.unit_id,
                kind = report.message.kind(),
                "Ignoring report from stale worker"
            );
            return;
        }

        match report.message {
            WorkerMessage::Ready => {
                tracing::debug!(task_id = %report.task_id, attempt = report.attempt, "Worker ready");
                self.events.emit(TaskEvent::Progress {
                    task_id: report.task_id,
                    progress: 0.0,
                    step: None,
                });
            }
            WorkerMessage::Log(line) => {
                let progress = parse_progress(&line);
                self.events.emit(TaskEvent::Log {
                    task_id: report.task_id.clone(),
                    log: line,
                });
                if let Some(progress) = progress {
                    self.events.emit(TaskEvent::Progress {
                        task_id: report.task_id,
                        progress,
                        step: None,
                    });
                }
            }
            WorkerMessage::Result(result) => {
                let kill_requested = self
                    .running
                    .remove(&report.task_id)
                    .is_some_and(|attempt| attempt.kill_requested);
                self.attempt_finished(&report.task_id, result, kill_requested);
                self.admit();
            }
        }
    }

    fn attempt_finished(&mut self, task_id: &str, result: AttemptResult, kill_requested: bool) {
        // a requested kill wins over whatever the unit managed to report
        let result = if kill_requested { AttemptResult::Cancelled } else { result };

        match result {
            AttemptResult::Succeeded { outputs } => self.finalize(task_id, Final::Completed(outputs)),
            AttemptResult::Cancelled => self.finalize(task_id, Final::Cancelled),
            AttemptResult::Failed { error } => self.attempt_failed(task_id, error),
        }
    }

    fn attempt_failed(&mut self, task_id: &str, error: String) {
        let Some(entry) = self.tasks.get_mut(task_id) else {
            return;
        };
        entry.snapshot.last_error = Some(error.clone());

        let failed = AttemptResult::failed(error.clone());
        if !self.retry.should_retry(&entry.snapshot.descriptor, &failed) {
            let exhausted = self.retry.exhausted(&entry.snapshot.descriptor, &error);
            tracing::error!(task_id = %task_id, error = %exhausted, "Task failed");
            self.finalize(task_id, Final::Failed(error));
            return;
        }

        entry.snapshot.descriptor.attempt += 1;
        entry.snapshot.state = TaskState::Queued;
        let descriptor = entry.snapshot.descriptor.clone();
        let snapshot = entry.snapshot.clone();

        tracing::warn!(
            task_id = %task_id,
            retry = descriptor.attempt,
            max_retry = descriptor.max_retry,
            error = %error,
            "Attempt failed, retrying"
        );
        self.events.emit(TaskEvent::updated(snapshot));

        match self.retry.delay() {
            None => self.queue.push_front(descriptor),
            Some(delay) => {
                self.pending_retry.insert(task_id.to_string());
                let requeue = self.requeue_tx.clone();
                let task_id = task_id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = requeue.send(task_id);
                });
            }
        }
    }

    fn requeue(&mut self, task_id: &str) {
        // cancelled or deleted while waiting
        if !self.pending_retry.remove(task_id) {
            return;
        }
        if let Some(entry) = self.tasks.get(task_id)
            && entry.snapshot.state == TaskState::Queued
        {
            self.queue.push_front(entry.snapshot.descriptor.clone());
            self.admit();
        }
    }

    fn finalize(&mut self, task_id: &str, outcome: Final) {
        let Some(entry) = self.tasks.get_mut(task_id) else {
            return;
        };
        entry.snapshot.finished_at = Some(Utc::now());

        let event = match outcome {
            Final::Completed(outputs) => {
                entry.snapshot.state = TaskState::Completed;
                entry.snapshot.outputs = outputs.clone();
                self.summary.completed += 1;
                self.events.emit(TaskEvent::Progress {
                    task_id: task_id.to_string(),
                    progress: 100.0,
                    step: None,
                });
                TaskEvent::Completed {
                    task_id: task_id.to_string(),
                    outputs,
                }
            }
            Final::Failed(error) => {
                entry.snapshot.state = TaskState::Failed;
                entry.snapshot.last_error = Some(error.clone());
                self.summary.failed += 1;
                TaskEvent::Failed {
                    task_id: task_id.to_string(),
                    error,
                }
            }
            Final::Cancelled => {
                entry.snapshot.state = TaskState::Cancelled;
                self.summary.cancelled += 1;
                TaskEvent::Cancelled {
                    task_id: task_id.to_string(),
                }
            }
        };

        tracing::info!(
            task_id = %task_id,
            state = %entry.snapshot.state,
            attempts = entry.snapshot.attempts,
            "Task finished"
        );
        self.events.emit(event);
    }

    fn stats(&mut self) -> SchedulerStats {
        let host = self.host.sample();
        let mut tasks = TaskCounts::default();
        for entry in self.tasks.values() {
            tasks.record(entry.snapshot.state);
        }

        SchedulerStats {
            cpu: host.cpu,
            memory: host.memory,
            cores: self.cores,
            tasks,
            summary: self.summary,
            concurrency: self.concurrency.get(),
            overloaded: self.overloaded,
        }
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty() && self.pending_retry.is_empty()
    }

    fn notify_idle(&mut self) {
        if self.idle_waiters.is_empty() || !self.is_idle() {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// Cancel everything and wait for running workers to confirm.
    async fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        tracing::info!(
            running = self.running.len(),
            queued = self.queue.len(),
            "Scheduler shutting down"
        );

        let mut waiting: Vec<String> = self.queue.drain().into_iter().map(|d| d.id).collect();
        waiting.extend(self.pending_retry.drain());
        for task_id in &waiting {
            self.finalize(task_id, Final::Cancelled);
        }

        for attempt in self.running.values_mut() {
            attempt.kill_requested = true;
            self.executor.kill(&attempt.handle);
        }

        let deadline = tokio::time::Instant::now() + self.kill_grace + Duration::from_secs(1);
        while !self.running.is_empty() {
            match tokio::time::timeout_at(deadline, self.reports.recv()).await {
                Ok(Some(report)) => self.handle_report(report),
                _ => break,
            }
        }

        let stuck: Vec<String> = self.running.drain().map(|(task_id, _)| task_id).collect();
        for task_id in &stuck {
            tracing::warn!(task_id = %task_id, "Worker did not confirm termination");
            self.finalize(task_id, Final::Cancelled);
        }
        self.notify_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineContext;
    use crate::events::EventStream;
    use crate::scheduler::{Scheduler, SchedulerHandle};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy)]
    enum Script {
        Succeed,
        Fail,
        FailOnce,
        Block,
    }

    struct ScriptedEngine {
        scripts: HashMap<String, Script>,
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new() -> Self {
            Self {
                scripts: HashMap::new(),
                delay: Duration::from_millis(5),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn with(mut self, name: &str, script: Script) -> Self {
            self.scripts.insert(name.to_string(), script);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MediaEngine for ScriptedEngine {
        async fn run(&self, descriptor: &TaskDescriptor, ctx: &EngineContext) -> Result<Vec<String>> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _in_flight = InFlight(&self.current);

            ctx.log(format!("{} threads={} 50%", descriptor.name, descriptor.thread_budget));

            let script = self.scripts.get(&descriptor.name).copied().unwrap_or(Script::Succeed);
            match script {
                Script::Succeed => {
                    tokio::time::sleep(self.delay).await;
                    Ok(vec![format!("{}.mp4", descriptor.name)])
                }
                Script::Fail => {
                    tokio::time::sleep(self.delay).await;
                    Err(BatchError::Execution("exit code 1".to_string()))
                }
                Script::FailOnce if descriptor.attempt == 0 => Err(BatchError::Execution("exit code 1".to_string())),
                Script::FailOnce => Ok(vec![format!("{}.mp4", descriptor.name)]),
                Script::Block => {
                    ctx.cancelled().await;
                    Err(BatchError::Cancelled(descriptor.id.clone()))
                }
            }
        }
    }

    fn task(name: &str) -> TaskDescriptor {
        TaskDescriptor::new("video-stitch", name, "/tmp/batchmix-test").with_id(name)
    }

    fn spawn(engine: ScriptedEngine, max: usize) -> (SchedulerHandle, Arc<ScriptedEngine>) {
        let engine = Arc::new(engine);
        let scheduler = Scheduler::new(engine.clone())
            .with_concurrency(ConcurrencyConfig::new(max, 4))
            .with_kill_grace(Duration::from_millis(100))
            .spawn();
        (scheduler, engine)
    }

    async fn wait_for(stream: &mut EventStream, pred: impl Fn(&TaskEvent) -> bool) -> TaskEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = stream.recv().await.expect("event stream closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn is_started(id: &'static str) -> impl Fn(&TaskEvent) -> bool {
        move |e| matches!(e, TaskEvent::Started { task_id, .. } if task_id == id)
    }

    fn started(events: &[TaskEvent]) -> Vec<(String, u32)> {
        events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Started { task_id, attempt } => Some((task_id.clone(), *attempt)),
                _ => None,
            })
            .collect()
    }

    fn count(events: &[TaskEvent], task_id: &str, channel: &str) -> usize {
        events
            .iter()
            .filter(|e| e.task_id() == task_id && e.channel() == channel)
            .count()
    }

    #[tokio::test]
    async fn test_bounded_concurrency_runs_in_submission_order() {
        let (scheduler, engine) = spawn(ScriptedEngine::new().with_delay(Duration::from_millis(20)), 2);
        let mut events = scheduler.subscribe(None);

        let names = ["j1", "j2", "j3", "j4", "j5"];
        for name in names {
            scheduler.submit(task(name)).await.unwrap();
        }
        scheduler.wait_idle().await.unwrap();
        let events = events.drain();

        let mut running = 0i32;
        let mut peak = 0i32;
        for event in &events {
            match event {
                TaskEvent::Started { .. } => {
                    running += 1;
                    peak = peak.max(running);
                }
                e if e.is_terminal() => running -= 1,
                _ => {}
            }
        }
        assert!(peak <= 2, "peak running {}", peak);
        assert!(engine.peak.load(Ordering::SeqCst) <= 2);

        let order: Vec<String> = started(&events).into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, names);

        let stats = scheduler.stats().await.unwrap();
        assert_eq!(stats.tasks.completed, 5);
        assert_eq!(stats.summary.total, 5);
        assert_eq!(stats.summary.completed, 5);
    }

    #[tokio::test]
    async fn test_retry_exhausted_emits_single_failure() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new().with("flaky", Script::Fail), 2);
        let mut events = scheduler.subscribe(Some("flaky"));

        scheduler.submit(task("flaky").with_max_retry(1)).await.unwrap();
        scheduler.wait_idle().await.unwrap();
        let events = events.drain();

        let snapshot = scheduler.task("flaky").await.unwrap();
        assert_eq!(snapshot.state, TaskState::Failed);
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.descriptor.attempt, 1);
        assert!(snapshot.last_error.unwrap().contains("exit code 1"));
        assert!(snapshot.finished_at.is_some());

        assert_eq!(count(&events, "flaky", "task-failed"), 1);
        assert_eq!(started(&events), vec![("flaky".to_string(), 1), ("flaky".to_string(), 2)]);
        let requeued = events
            .iter()
            .filter(|e| matches!(e, TaskEvent::Updated { task } if task.state == TaskState::Queued))
            .count();
        assert_eq!(requeued, 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_cancel_running_frees_slot() {
        let engine = ScriptedEngine::new().with("long", Script::Block);
        let (scheduler, _engine) = spawn(engine, 1);
        let mut events = scheduler.subscribe(None);

        scheduler.submit(task("long").with_max_retry(3)).await.unwrap();
        scheduler.submit(task("next")).await.unwrap();
        wait_for(&mut events, is_started("long")).await;

        scheduler.cancel("long").await.unwrap();
        wait_for(&mut events, |e| matches!(e, TaskEvent::Completed { task_id, .. } if task_id == "next")).await;

        let long = scheduler.task("long").await.unwrap();
        assert_eq!(long.state, TaskState::Cancelled);
        assert_eq!(long.attempts, 1);

        scheduler.wait_idle().await.unwrap();
        let stats = scheduler.stats().await.unwrap();
        assert_eq!(stats.summary.cancelled, 1);
        assert_eq!(stats.summary.failed, 0);
        assert_eq!(stats.tasks.running, 0);
    }

    #[tokio::test]
    async fn test_cancel_running_emits_cancelled_not_failed() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new().with("long", Script::Block), 1);
        let mut events = scheduler.subscribe(Some("long"));

        scheduler.submit(task("long")).await.unwrap();
        wait_for(&mut events, is_started("long")).await;
        scheduler.cancel("long").await.unwrap();
        scheduler.wait_idle().await.unwrap();

        let events = events.drain();
        assert_eq!(count(&events, "long", "task-cancelled"), 1);
        assert_eq!(count(&events, "long", "task-failed"), 0);
    }

    #[tokio::test]
    async fn test_higher_priority_admitted_first() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new().with("blocker", Script::Block), 1);
        let mut events = scheduler.subscribe(None);

        scheduler.submit(task("blocker")).await.unwrap();
        wait_for(&mut events, is_started("blocker")).await;

        scheduler.submit(task("low")).await.unwrap();
        scheduler.submit(task("high").with_priority(5)).await.unwrap();
        scheduler.submit(task("low2")).await.unwrap();
        scheduler.cancel("blocker").await.unwrap();
        scheduler.wait_idle().await.unwrap();

        let order: Vec<String> = started(&events.drain()).into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["high", "low", "low2"]);
    }

    #[tokio::test]
    async fn test_retry_runs_before_equal_priority_work() {
        let engine = ScriptedEngine::new()
            .with("blocker", Script::Block)
            .with("flaky", Script::FailOnce);
        let (scheduler, _engine) = spawn(engine, 1);
        let mut events = scheduler.subscribe(None);

        scheduler.submit(task("blocker")).await.unwrap();
        wait_for(&mut events, is_started("blocker")).await;
        scheduler.submit(task("flaky").with_max_retry(1)).await.unwrap();
        scheduler.submit(task("b")).await.unwrap();
        scheduler.submit(task("c")).await.unwrap();
        scheduler.cancel("blocker").await.unwrap();
        scheduler.wait_idle().await.unwrap();

        let events = events.drain();
        assert_eq!(
            started(&events),
            vec![
                ("flaky".to_string(), 1),
                ("flaky".to_string(), 2),
                ("b".to_string(), 1),
                ("c".to_string(), 1),
            ]
        );
        assert_eq!(scheduler.task("flaky").await.unwrap().state, TaskState::Completed);
        assert_eq!(count(&events, "flaky", "task-failed"), 0);
    }

    #[tokio::test]
    async fn test_set_concurrency_never_preempts() {
        let engine = ScriptedEngine::new().with("a", Script::Block).with("b", Script::Block);
        let (scheduler, _engine) = spawn(engine, 2);
        let mut events = scheduler.subscribe(None);

        for name in ["a", "b", "c"] {
            scheduler.submit(task(name)).await.unwrap();
        }
        wait_for(&mut events, is_started("a")).await;
        wait_for(&mut events, is_started("b")).await;

        let applied = scheduler.set_concurrency(1, 4).await.unwrap();
        assert_eq!(applied, ConcurrencyConfig::new(1, 4));
        let stats = scheduler.stats().await.unwrap();
        assert_eq!(stats.tasks.running, 2);
        assert_eq!(stats.tasks.queued, 1);

        scheduler.cancel("a").await.unwrap();
        wait_for(&mut events, |e| matches!(e, TaskEvent::Cancelled { task_id } if task_id == "a")).await;
        assert_eq!(scheduler.task("c").await.unwrap().state, TaskState::Queued);

        scheduler.set_concurrency(3, 4).await.unwrap();
        wait_for(&mut events, |e| matches!(e, TaskEvent::Completed { task_id, .. } if task_id == "c")).await;
        assert_eq!(scheduler.concurrency().max_concurrent_tasks, 3);

        scheduler.cancel("b").await.unwrap();
        scheduler.wait_idle().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_queued_task() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new().with("blocker", Script::Block), 1);
        let mut events = scheduler.subscribe(None);

        scheduler.submit(task("blocker")).await.unwrap();
        scheduler.submit(task("q")).await.unwrap();
        wait_for(&mut events, is_started("blocker")).await;

        scheduler.cancel("q").await.unwrap();
        assert_eq!(scheduler.task("q").await.unwrap().state, TaskState::Cancelled);
        assert!(matches!(
            scheduler.cancel("q").await,
            Err(BatchError::InvalidState(_))
        ));

        scheduler.cancel("blocker").await.unwrap();
        scheduler.wait_idle().await.unwrap();

        let events = events.drain();
        assert_eq!(count(&events, "q", "task-started"), 0);
        assert_eq!(count(&events, "q", "task-cancelled"), 1);
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new(), 1);
        assert!(matches!(
            scheduler.cancel("missing").await,
            Err(BatchError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_and_duplicate() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new().with("blocker", Script::Block), 1);

        let err = scheduler.submit(task("bad").with_thread_budget(0)).await.unwrap_err();
        assert!(matches!(err, BatchError::InvalidTask(_)));

        scheduler.submit(task("blocker")).await.unwrap();
        let err = scheduler.submit(task("blocker")).await.unwrap_err();
        assert!(matches!(err, BatchError::DuplicateTask(_)));

        assert_eq!(scheduler.tasks().await.unwrap().len(), 1);
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_event_sequence_for_successful_task() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new(), 1);
        let mut events = scheduler.subscribe(Some("j"));

        scheduler.submit(task("j").with_thread_budget(16)).await.unwrap();
        scheduler.wait_idle().await.unwrap();
        let events = events.drain();

        let channels: Vec<&str> = events.iter().map(|e| e.channel()).collect();
        assert_eq!(
            channels,
            vec![
                "task-created",
                "task-updated",
                "task-started",
                "task-progress",
                "task-log",
                "task-progress",
                "task-progress",
                "task-completed",
            ]
        );

        let progress: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0.0, 50.0, 100.0]);

        // thread budget capped at threads_per_task
        assert!(events.contains(&TaskEvent::Log {
            task_id: "j".into(),
            log: "j threads=4 50%".into(),
        }));
        assert_eq!(
            events.last(),
            Some(&TaskEvent::Completed {
                task_id: "j".into(),
                outputs: vec!["j.mp4".into()],
            })
        );
        assert_eq!(scheduler.task("j").await.unwrap().outputs, vec!["j.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_delete() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new().with("blocker", Script::Block), 1);
        let mut events = scheduler.subscribe(None);

        scheduler.submit(task("blocker")).await.unwrap();
        wait_for(&mut events, is_started("blocker")).await;
        assert!(matches!(
            scheduler.delete("blocker").await,
            Err(BatchError::InvalidState(_))
        ));

        scheduler.cancel("blocker").await.unwrap();
        scheduler.wait_idle().await.unwrap();
        scheduler.delete("blocker").await.unwrap();

        assert!(matches!(
            scheduler.task("blocker").await,
            Err(BatchError::TaskNotFound(_))
        ));
        wait_for(&mut events, |e| matches!(e, TaskEvent::Deleted { task_id } if task_id == "blocker")).await;
        assert!(scheduler.tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overload_flagged_in_stats() {
        let engine = Arc::new(ScriptedEngine::new().with("blocker", Script::Block));
        let scheduler = Scheduler::new(engine)
            .with_concurrency(ConcurrencyConfig::new(2, 4))
            .with_cores(2)
            .with_kill_grace(Duration::from_millis(100))
            .spawn();
        let mut events = scheduler.subscribe(None);

        assert_eq!(scheduler.cpu_info().cores, 2);
        assert!(!scheduler.stats().await.unwrap().overloaded);

        scheduler.submit(task("blocker")).await.unwrap();
        wait_for(&mut events, is_started("blocker")).await;

        let stats = scheduler.stats().await.unwrap();
        assert!(stats.overloaded);
        assert_eq!(stats.cores, 2);
        assert_eq!(stats.concurrency, ConcurrencyConfig::new(2, 4));

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_during_retry_delay() {
        let engine = Arc::new(ScriptedEngine::new().with("flaky", Script::Fail));
        let scheduler = Scheduler::new(engine)
            .with_retry(RetryPolicy::with_delay(Duration::from_millis(300)))
            .spawn();
        let mut events = scheduler.subscribe(Some("flaky"));

        scheduler.submit(task("flaky").with_max_retry(3)).await.unwrap();
        wait_for(&mut events, |e| matches!(e, TaskEvent::Updated { task } if task.state == TaskState::Queued && task.attempts == 1)).await;

        scheduler.cancel("flaky").await.unwrap();
        scheduler.wait_idle().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let snapshot = scheduler.task("flaky").await.unwrap();
        assert_eq!(snapshot.state, TaskState::Cancelled);
        assert_eq!(snapshot.attempts, 1);
        let events = events.drain();
        assert_eq!(count(&events, "flaky", "task-started"), 0);
        assert_eq!(count(&events, "flaky", "task-failed"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new().with("blocker", Script::Block), 1);
        let mut events = scheduler.subscribe(None);

        scheduler.submit(task("blocker")).await.unwrap();
        scheduler.submit(task("q")).await.unwrap();
        wait_for(&mut events, is_started("blocker")).await;

        scheduler.shutdown().await.unwrap();
        let events = events.drain();
        assert_eq!(count(&events, "blocker", "task-cancelled"), 1);
        assert_eq!(count(&events, "q", "task-cancelled"), 1);

        assert!(matches!(
            scheduler.submit(task("late")).await,
            Err(BatchError::SchedulerClosed)
        ));
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_idle_on_empty_scheduler() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new(), 1);
        tokio::time::timeout(Duration::from_secs(1), scheduler.wait_idle())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_tasks_listed_in_submission_order() {
        let (scheduler, _engine) = spawn(ScriptedEngine::new(), 1);
        for name in ["c", "a", "b"] {
            scheduler.submit(task(name)).await.unwrap();
        }
        scheduler.wait_idle().await.unwrap();
        let ids: Vec<String> = scheduler.tasks().await.unwrap().iter().map(|t| t.id().to_string()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}

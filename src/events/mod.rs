//! Event fan-out to observers.
//!
//! [`EventReporter`] delivers every [`TaskEvent`] to each live subscriber,
//! optionally filtered by task id. Each subscriber gets its own unbounded
//! queue, so emitting never blocks the scheduler and a slow observer never
//! loses events. Dropping an [`EventStream`] unsubscribes it without
//! touching anyone else's delivery.
//!
//! Only the scheduler coordinator emits, so events for one task reach every
//! subscriber in emission order.

use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::domain::TaskEvent;

struct Subscriber {
    id: u64,
    filter: Option<String>,
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl Subscriber {
    fn wants(&self, event: &TaskEvent) -> bool {
        match &self.filter {
            Some(task_id) => event.task_id() == task_id,
            None => true,
        }
    }
}

/// Publish/subscribe hub for task events.
#[derive(Default)]
pub struct EventReporter {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one task's events, or to all of them with `None`.
    pub fn subscribe(&self, filter: Option<&str>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Subscriber {
            id,
            filter: filter.map(str::to_string),
            tx,
        });
        tracing::debug!(subscriber = id, filter = ?filter, "Event subscriber added");
        EventStream { id, rx }
    }

    pub fn subscribe_all(&self) -> EventStream {
        self.subscribe(None)
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Subscribers whose stream was dropped are pruned here.
    pub fn emit(&self, event: TaskEvent) {
        tracing::trace!(task_id = %event.task_id(), channel = event.channel(), "Emitting event");
        let mut subscribers = self.lock();
        subscribers.retain(|sub| {
            if !sub.wants(&event) {
                return !sub.tx.is_closed();
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(subscriber = sub.id, "Event subscriber gone");
                    false
                }
            }
        });
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|sub| !sub.tx.is_closed());
        subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of a subscription.
pub struct EventStream {
    id: u64,
    rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl EventStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the reporter is gone.
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TaskEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued so far.
    pub fn drain(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = TaskEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn log(task_id: &str, line: &str) -> TaskEvent {
        TaskEvent::Log {
            task_id: task_id.to_string(),
            log: line.to_string(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let reporter = EventReporter::new();
        reporter.emit(log("a", "x"));
        assert_eq!(reporter.subscriber_count(), 0);
    }

    #[test]
    fn test_per_task_order_preserved() {
        let reporter = EventReporter::new();
        let mut all = reporter.subscribe_all();
        for i in 0..50 {
            reporter.emit(log("a", &i.to_string()));
            reporter.emit(log("b", &i.to_string()));
        }

        let lines: Vec<String> = all
            .drain()
            .into_iter()
            .filter(|e| e.task_id() == "a")
            .map(|e| match e {
                TaskEvent::Log { log, .. } => log,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_filter_by_task() {
        let reporter = EventReporter::new();
        let mut only_b = reporter.subscribe(Some("b"));
        reporter.emit(log("a", "1"));
        reporter.emit(log("b", "2"));
        reporter.emit(TaskEvent::Cancelled { task_id: "a".into() });

        let events = only_b.drain();
        assert_eq!(events, vec![log("b", "2")]);
    }

    #[test]
    fn test_unsubscribe_does_not_affect_others() {
        let reporter = EventReporter::new();
        let mut keep = reporter.subscribe_all();
        let dropped = reporter.subscribe_all();
        assert_eq!(reporter.subscriber_count(), 2);

        drop(dropped);
        reporter.emit(log("a", "after"));

        assert_eq!(keep.try_recv(), Some(log("a", "after")));
        assert_eq!(reporter.subscriber_count(), 1);
    }

    #[test]
    fn test_filtered_dead_subscriber_pruned() {
        let reporter = EventReporter::new();
        let filtered = reporter.subscribe(Some("x"));
        drop(filtered);
        reporter.emit(log("a", "1"));
        assert_eq!(reporter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_interface() {
        let reporter = EventReporter::new();
        let mut stream = reporter.subscribe_all();
        reporter.emit(log("a", "1"));
        reporter.emit(log("a", "2"));

        assert_eq!(stream.next().await, Some(log("a", "1")));
        assert_eq!(stream.recv().await, Some(log("a", "2")));
    }

    #[tokio::test]
    async fn test_stream_ends_when_reporter_dropped() {
        let reporter = EventReporter::new();
        let mut stream = reporter.subscribe_all();
        drop(reporter);
        assert_eq!(stream.recv().await, None);
    }
}

//! Priority-ordered admission queue.
//!
//! Ordered by priority (higher first), then by position within the priority
//! bracket. New submissions join the back of their bracket; retries jump to
//! the front.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::domain::TaskDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<i32>,
    seq: i64,
}

#[derive(Debug)]
pub struct TaskQueue {
    entries: BTreeMap<QueueKey, TaskDescriptor>,
    index: HashMap<String, QueueKey>,
    next_back: i64,
    next_front: i64,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_back: 0,
            next_front: -1,
        }
    }

    /// Append behind every queued task of the same priority.
    pub fn push_back(&mut self, descriptor: TaskDescriptor) {
        let seq = self.next_back;
        self.next_back += 1;
        self.insert(descriptor, seq);
    }

    /// Insert ahead of every queued task of the same priority.
    pub fn push_front(&mut self, descriptor: TaskDescriptor) {
        let seq = self.next_front;
        self.next_front -= 1;
        self.insert(descriptor, seq);
    }

    fn insert(&mut self, descriptor: TaskDescriptor, seq: i64) {
        if let Some(old) = self.index.remove(&descriptor.id) {
            self.entries.remove(&old);
        }
        let key = QueueKey {
            priority: Reverse(descriptor.priority),
            seq,
        };
        self.index.insert(descriptor.id.clone(), key);
        self.entries.insert(key, descriptor);
    }

    /// Take the next task to admit.
    pub fn pop(&mut self) -> Option<TaskDescriptor> {
        let (_, descriptor) = self.entries.pop_first()?;
        self.index.remove(&descriptor.id);
        Some(descriptor)
    }

    pub fn peek(&self) -> Option<&TaskDescriptor> {
        self.entries.values().next()
    }

    pub fn remove(&mut self, task_id: &str) -> Option<TaskDescriptor> {
        let key = self.index.remove(task_id)?;
        self.entries.remove(&key)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.index.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued task ids in admission order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.values().map(|d| d.id.clone()).collect()
    }

    /// Remove everything, in admission order.
    pub fn drain(&mut self) -> Vec<TaskDescriptor> {
        self.index.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

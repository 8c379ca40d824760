//! Scheduler statistics snapshot.

use serde::{Deserialize, Serialize};

use super::concurrency::ConcurrencyConfig;
use crate::domain::TaskState;
use crate::system::{CpuStats, MemoryStats};

/// Tasks currently tracked, by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub queued: usize,
    /// Includes tasks whose kill is not yet confirmed
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskCounts {
    pub fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Queued => self.queued += 1,
            TaskState::Running => self.running += 1,
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::Cancelled => self.cancelled += 1,
        }
    }

    pub fn active(&self) -> usize {
        self.queued + self.running
    }

    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    pub fn total(&self) -> usize {
        self.active() + self.terminal()
    }
}

/// Outcomes across everything submitted, including deleted tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Tasks accepted by submit
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.finished())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub cores: usize,
    pub tasks: TaskCounts,
    pub summary: BatchSummary,
    pub concurrency: ConcurrencyConfig,
    /// Running thread demand exceeds the core count
    pub overloaded: bool,
}

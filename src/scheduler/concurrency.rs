//! Concurrency budget shared by the control surface and admission.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Configuration for concurrency limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyConfig {
    /// Maximum jobs running at once.
    pub max_concurrent_tasks: usize,
    /// Advisory thread budget handed to each job.
    pub threads_per_task: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            threads_per_task: 4,
        }
    }
}

impl ConcurrencyConfig {
    /// Create a config; both limits are clamped to at least 1.
    pub fn new(max_concurrent_tasks: usize, threads_per_task: u32) -> Self {
        Self {
            max_concurrent_tasks: max_concurrent_tasks.max(1),
            threads_per_task: threads_per_task.max(1),
        }
    }

    /// Threads requested by `running` jobs.
    pub fn thread_demand(&self, running: usize) -> usize {
        running.saturating_mul(self.threads_per_task as usize)
    }

    /// True when `running` jobs would ask for more threads than `cores`.
    pub fn is_overloaded(&self, running: usize, cores: usize) -> bool {
        self.thread_demand(running) > cores
    }
}

/// Injectable handle to the live [`ConcurrencyConfig`].
///
/// Clones share one value. Readers get a consistent copy; [`set`](Self::set)
/// is the only way to change it.
#[derive(Debug, Clone, Default)]
pub struct SharedConcurrency {
    inner: Arc<RwLock<ConcurrencyConfig>>,
}

impl SharedConcurrency {
    pub fn new(config: ConcurrencyConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ConcurrencyConfig::new(
                config.max_concurrent_tasks,
                config.threads_per_task,
            ))),
        }
    }

    pub fn get(&self) -> ConcurrencyConfig {
        *self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the config, returning the value now in effect.
    pub fn set(&self, config: ConcurrencyConfig) -> ConcurrencyConfig {
        let config = ConcurrencyConfig::new(config.max_concurrent_tasks, config.threads_per_task);
        *self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        tracing::info!(
            max_concurrent_tasks = config.max_concurrent_tasks,
            threads_per_task = config.threads_per_task,
            "Concurrency updated"
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConcurrencyConfig::default();
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.threads_per_task, 4);
    }

    #[test]
    fn test_new_clamps_to_one() {
        let config = ConcurrencyConfig::new(0, 0);
        assert_eq!(config.max_concurrent_tasks, 1);
        assert_eq!(config.threads_per_task, 1);
    }

    #[test]
    fn test_overload() {
        let config = ConcurrencyConfig::new(4, 4);
        assert_eq!(config.thread_demand(3), 12);
        assert!(!config.is_overloaded(2, 8));
        assert!(config.is_overloaded(3, 8));
        assert!(!config.is_overloaded(0, 1));
    }

    #[test]
    fn test_shared_updates_visible_to_clones() {
        let shared = SharedConcurrency::new(ConcurrencyConfig::default());
        let reader = shared.clone();
        let applied = shared.set(ConcurrencyConfig {
            max_concurrent_tasks: 0,
            threads_per_task: 8,
        });
        assert_eq!(applied, ConcurrencyConfig::new(1, 8));
        assert_eq!(reader.get(), applied);
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(ConcurrencyConfig::default()).unwrap();
        assert_eq!(json["maxConcurrentTasks"], 2);
        assert_eq!(json["threadsPerTask"], 4);
    }
}

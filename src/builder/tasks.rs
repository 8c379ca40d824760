//! Maps planned tuples onto executable task descriptors.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::domain::TaskDescriptor;
use crate::error::{BatchError, Result};
use crate::id::generate_job_name;
use crate::planner::{CombinationIndex, MaterialPool};

/// Template shared by every descriptor of a batch.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    operation_kind: String,
    output_dir: PathBuf,
    name_prefix: String,
    params: Map<String, Value>,
    priority: i32,
    max_retry: u32,
    thread_budget: u32,
}

impl TaskBuilder {
    /// Create a builder; job names default to `{operation_kind}_{n:04}`.
    pub fn new(operation_kind: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        let operation_kind = operation_kind.into();
        Self {
            name_prefix: operation_kind.clone(),
            operation_kind,
            output_dir: output_dir.into(),
            params: Map::new(),
            priority: 0,
            max_retry: 0,
            thread_budget: 1,
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn with_thread_budget(mut self, threads: u32) -> Self {
        self.thread_budget = threads.max(1);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Build one descriptor per tuple, in tuple order.
    ///
    /// Files are resolved from the pools in pool order. The tuple itself is
    /// recorded in the `combination` param so outputs can be traced back to
    /// their inputs.
    pub fn build(&self, pools: &[MaterialPool<PathBuf>], combinations: &[CombinationIndex]) -> Result<Vec<TaskDescriptor>> {
        combinations
            .iter()
            .enumerate()
            .map(|(n, tuple)| self.build_one(pools, tuple, n + 1))
            .collect()
    }

    fn build_one(&self, pools: &[MaterialPool<PathBuf>], tuple: &CombinationIndex, ordinal: usize) -> Result<TaskDescriptor> {
        if tuple.len() != pools.len() {
            return Err(BatchError::Planning(format!(
                "combination {:?} has {} components for {} pools",
                tuple,
                tuple.len(),
                pools.len()
            )));
        }

        let files = tuple
            .iter()
            .zip(pools)
            .map(|(&index, pool)| {
                pool.get(index).cloned().ok_or_else(|| {
                    BatchError::Planning(format!(
                        "index {} out of range for pool '{}' of {} items",
                        index,
                        pool.name,
                        pool.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut params = self.params.clone();
        params.insert("combination".to_string(), serde_json::json!(tuple));

        Ok(TaskDescriptor::new(
            self.operation_kind.clone(),
            generate_job_name(&self.name_prefix, ordinal),
            self.output_dir.clone(),
        )
        .with_files(files)
        .with_params(params)
        .with_priority(self.priority)
        .with_max_retry(self.max_retry)
        .with_thread_budget(self.thread_budget))
    }
}

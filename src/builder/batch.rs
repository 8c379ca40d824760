//! Batch definition files.
//!
//! A batch file names the pools, how many jobs to plan, and the template
//! every job shares. Loading one runs the whole front half of the pipeline:
//! resolve pools, plan combinations, build descriptors.
//!
//! ```yaml
//! operation: video-stitch
//! output_dir: out/
//! name_prefix: promo
//! count: 20
//! max_retry: 1
//! pools:
//!   - name: intro
//!     files: ["clips/intro/*.mp4"]
//!   - name: body
//!     files: ["clips/body/a.mp4", "clips/body/b.mp4"]
//! sort:
//!   priority: [0]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::TaskDescriptor;
use crate::error::Result;
use crate::planner::{CombinationPlanner, PoolSource, SortConfig};

use super::tasks::TaskBuilder;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    pub operation: String,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub name_prefix: Option<String>,
    pub count: usize,
    pub pools: Vec<PoolSource>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub priority: i32,
    /// Falls back to the configured default when absent
    #[serde(default)]
    pub max_retry: Option<u32>,
    /// Falls back to the configured threads-per-task when absent
    #[serde(default)]
    pub thread_budget: Option<u32>,
    #[serde(default)]
    pub sort: Option<SortConfig>,
}

/// Descriptors produced from a batch file, plus what the planner saw.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub tasks: Vec<TaskDescriptor>,
    pub pool_sizes: Vec<usize>,
    pub max_combinations: u128,
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let batch: Self = serde_yaml::from_str(&content)?;
        tracing::info!(path = %path.display(), pools = batch.pools.len(), count = batch.count, "Loaded batch file");
        Ok(batch)
    }

    /// Resolve pools, plan, and build descriptors.
    pub fn prepare(&self, default_max_retry: u32, default_threads: u32) -> Result<PreparedBatch> {
        let pools = self
            .pools
            .iter()
            .map(PoolSource::resolve)
            .collect::<Result<Vec<_>>>()?;

        let planner = CombinationPlanner::for_pools(&pools);
        let plan = planner.plan(self.count, self.sort.as_ref())?;

        let mut builder = TaskBuilder::new(self.operation.clone(), self.output_dir.clone())
            .with_params(self.params.clone())
            .with_priority(self.priority)
            .with_max_retry(self.max_retry.unwrap_or(default_max_retry))
            .with_thread_budget(self.thread_budget.unwrap_or(default_threads));
        if let Some(prefix) = &self.name_prefix {
            builder = builder.with_name_prefix(prefix.clone());
        }

        let tasks = builder.build(&pools, &plan.combinations)?;

        Ok(PreparedBatch {
            tasks,
            pool_sizes: planner.pool_sizes().to_vec(),
            max_combinations: planner.max_combinations(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatchError;
    use tempfile::TempDir;

    const BATCH: &str = r#"
operation: video-stitch
output_dir: /out
name_prefix: promo
count: 5
max_retry: 1
pools:
  - name: intro
    files: ["a.mp4", "b.mp4", "c.mp4"]
  - name: outro
    files: ["x.mp4", "y.mp4"]
"#;

    #[test]
    fn test_load_and_prepare() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.yml");
        std::fs::write(&path, BATCH).unwrap();

        let batch = BatchFile::load(&path).unwrap();
        let prepared = batch.prepare(0, 4).unwrap();

        assert_eq!(prepared.pool_sizes, vec![3, 2]);
        assert_eq!(prepared.max_combinations, 6);
        assert_eq!(prepared.tasks.len(), 5);
        assert_eq!(prepared.tasks[0].name, "promo_0001");
        assert_eq!(prepared.tasks[0].max_retry, 1);
        assert_eq!(prepared.tasks[0].thread_budget, 4);
        assert_eq!(
            prepared.tasks[1].files,
            vec![PathBuf::from("b.mp4"), PathBuf::from("y.mp4")]
        );
    }

    #[test]
    fn test_empty_pool_prepares_nothing() {
        let batch: BatchFile = serde_yaml::from_str(
            r#"
operation: image-composite
output_dir: /out
count: 3
pools:
  - files: []
  - files: ["a.png", "b.png"]
"#,
        )
        .unwrap();
        let prepared = batch.prepare(0, 1).unwrap();
        assert!(prepared.tasks.is_empty());
        assert_eq!(prepared.max_combinations, 0);
    }

    #[test]
    fn test_bad_sort_surfaces_planning_error() {
        let mut batch: BatchFile = serde_yaml::from_str(BATCH).unwrap();
        batch.sort = Some(SortConfig::by(vec![4]));
        let err = batch.prepare(0, 1).unwrap_err();
        assert!(matches!(err, BatchError::Planning(_)));
    }
}

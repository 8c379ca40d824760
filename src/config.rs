use batchmix::engine::{OperationCommand, ProcessEngine};
use batchmix::scheduler::{ConcurrencyConfig, RetryPolicy};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub concurrency: ConcurrencySection,
    pub retry: RetrySection,
    pub worker: WorkerSection,
    pub engine: EngineSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySection {
    pub max_concurrent_tasks: usize,
    pub threads_per_task: u32,
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            threads_per_task: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Default retries for batch files that do not set their own
    pub max_retry: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub kill_grace_ms: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self { kill_grace_ms: 2000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub operations: HashMap<String, OperationCommand>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            concurrency: ConcurrencySection::default(),
            retry: RetrySection::default(),
            worker: WorkerSection::default(),
            engine: EngineSection::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn concurrency(&self) -> ConcurrencyConfig {
        ConcurrencyConfig::new(self.concurrency.max_concurrent_tasks, self.concurrency.threads_per_task)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_delay(Duration::from_millis(self.retry.delay_ms))
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.worker.kill_grace_ms)
    }

    pub fn process_engine(&self) -> ProcessEngine {
        ProcessEngine::from_operations(self.engine.operations.clone())
    }
}

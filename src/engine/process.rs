//! External-command media engine.
//!
//! Each operation kind maps to a command template. The child's stderr is the
//! log channel, non-empty stdout lines are the produced outputs, and the exit
//! code decides success.

use std::collections::{HashMap, VecDeque};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{EngineContext, MediaEngine};
use crate::domain::TaskDescriptor;
use crate::error::{BatchError, Result};

/// Stderr lines kept for the failure message
const STDERR_TAIL_LINES: usize = 20;

/// Command template for one operation kind.
///
/// Arguments may contain `{operation}`, `{name}`, `{id}`, `{attempt}`,
/// `{output_dir}`, `{threads}`, `{files}` and `{param:<key>}`. An argument
/// that is exactly `{files}` expands to one argument per input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Kill the child if it runs longer than this
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl OperationCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Render the argument list for one descriptor
    pub fn render_args(&self, descriptor: &TaskDescriptor) -> Result<Vec<String>> {
        let mut rendered = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            if arg == "{files}" {
                rendered.extend(descriptor.files.iter().map(|f| f.display().to_string()));
            } else {
                rendered.push(render(arg, descriptor)?);
            }
        }
        Ok(rendered)
    }
}

fn render(template: &str, descriptor: &TaskDescriptor) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let key = &after[..close];
        match placeholder(key, descriptor)? {
            Some(value) => out.push_str(&value),
            None => {
                // not ours, e.g. shell ${var}
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn placeholder(key: &str, descriptor: &TaskDescriptor) -> Result<Option<String>> {
    let value = match key {
        "operation" => descriptor.operation_kind.clone(),
        "name" => descriptor.name.clone(),
        "id" => descriptor.id.clone(),
        "attempt" => descriptor.attempt_number().to_string(),
        "output_dir" => descriptor.output_dir.display().to_string(),
        "threads" => descriptor.thread_budget.to_string(),
        "files" => descriptor
            .files
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join(" "),
        _ => match key.strip_prefix("param:") {
            Some(param) => match descriptor.params.get(param) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    return Err(BatchError::Engine(format!(
                        "{}: missing parameter '{}'",
                        descriptor.name, param
                    )));
                }
            },
            None => return Ok(None),
        },
    };
    Ok(Some(value))
}

enum Exit {
    Status(ExitStatus),
    Killed,
    TimedOut(u64),
}

/// Runs media operations as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessEngine {
    operations: HashMap<String, OperationCommand>,
}

impl ProcessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_operations(operations: HashMap<String, OperationCommand>) -> Self {
        Self { operations }
    }

    pub fn with_operation(mut self, kind: impl Into<String>, command: OperationCommand) -> Self {
        self.operations.insert(kind.into(), command);
        self
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    fn command_for(&self, descriptor: &TaskDescriptor) -> Result<&OperationCommand> {
        self.operations.get(&descriptor.operation_kind).ok_or_else(|| {
            BatchError::Engine(format!(
                "no command configured for operation '{}'",
                descriptor.operation_kind
            ))
        })
    }
}

#[async_trait]
impl MediaEngine for ProcessEngine {
    async fn run(&self, descriptor: &TaskDescriptor, ctx: &EngineContext) -> Result<Vec<String>> {
        let command = self.command_for(descriptor)?;
        let args = command.render_args(descriptor)?;

        tokio::fs::create_dir_all(&descriptor.output_dir).await?;

        tracing::debug!(
            task_id = %descriptor.id,
            program = %command.program,
            args = ?args,
            "Spawning media process"
        );

        let mut child = Command::new(&command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BatchError::Engine(format!("failed to spawn '{}': {}", command.program, e)))?;

        if let Some(pid) = child.id() {
            ctx.set_pid(pid);
        }

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BatchError::Engine("stderr not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BatchError::Engine("stdout not captured".to_string()))?;

        let log_ctx = ctx.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.clone());
                log_ctx.log(line);
            }
            tail
        });

        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut outputs = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if !line.is_empty() {
                    outputs.push(line.to_string());
                }
            }
            outputs
        });

        let deadline = async {
            match command.timeout_ms {
                Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                None => std::future::pending().await,
            }
        };

        let exit = tokio::select! {
            status = child.wait() => Exit::Status(status?),
            _ = ctx.cancelled() => Exit::Killed,
            _ = deadline => Exit::TimedOut(command.timeout_ms.unwrap_or_default()),
        };

        let status = match exit {
            Exit::Status(status) => Ok(status),
            Exit::Killed => Err(BatchError::Cancelled(descriptor.id.clone())),
            Exit::TimedOut(ms) => Err(BatchError::Execution(format!("timed out after {}ms", ms))),
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    tracing::warn!(task_id = %descriptor.id, error = %kill_err, "Failed to kill media process");
                }
                // grandchildren may still hold the pipes open
                stderr_task.abort();
                stdout_task.abort();
                return Err(e);
            }
        };

        let tail = stderr_task
            .await
            .map_err(|e| BatchError::Engine(format!("stderr reader failed: {}", e)))?;
        let outputs = stdout_task
            .await
            .map_err(|e| BatchError::Engine(format!("stdout reader failed: {}", e)))?;

        if status.success() {
            Ok(outputs)
        } else {
            let code = status.code().map_or_else(|| "signal".to_string(), |c| c.to_string());
            let diagnostics = Vec::from(tail).join("\n");
            Err(BatchError::Execution(if diagnostics.is_empty() {
                format!("exit code {}", code)
            } else {
                format!("exit code {}: {}", code, diagnostics)
            }))
        }
    }
}

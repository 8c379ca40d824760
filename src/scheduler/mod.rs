//! Concurrency-controlled execution of media jobs.
//!
//! This module provides:
//! - **TaskQueue**: priority-ordered admission queue, FIFO within a priority
//! - **ConcurrencyConfig / SharedConcurrency**: the live job and thread budget
//! - **RetryPolicy**: whether a failed attempt runs again
//! - **Scheduler / SchedulerHandle**: the coordinator and its control surface
//!
//! # Architecture
//!
//! 1. Callers submit descriptors through a `SchedulerHandle`
//! 2. The coordinator admits queued tasks while running < max_concurrent_tasks
//! 3. Each attempt runs in its own worker unit
//! 4. Worker reports flow back to the coordinator, which emits events,
//!    frees the slot and applies the retry policy
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use batchmix::domain::TaskDescriptor;
//! use batchmix::engine::{OperationCommand, ProcessEngine};
//! use batchmix::scheduler::{ConcurrencyConfig, Scheduler};
//!
//! # async fn example() -> batchmix::error::Result<()> {
//! let engine = ProcessEngine::new().with_operation(
//!     "video-stitch",
//!     OperationCommand::new("ffmpeg", vec!["{files}".into(), "{output_dir}/{name}.mp4".into()]),
//! );
//! let scheduler = Scheduler::new(Arc::new(engine))
//!     .with_concurrency(ConcurrencyConfig::new(2, 4))
//!     .spawn();
//!
//! scheduler.submit(TaskDescriptor::new("video-stitch", "mix_0001", "out/")).await?;
//! scheduler.wait_idle().await?;
//! # Ok(())
//! # }
//! ```

mod concurrency;
mod coordinator;
mod handle;
mod queue;
mod retry;
mod stats;

pub use concurrency::{ConcurrencyConfig, SharedConcurrency};
pub use handle::{Scheduler, SchedulerHandle, SubmitResponse};
pub use queue::TaskQueue;
pub use retry::RetryPolicy;
pub use stats::{BatchSummary, SchedulerStats, TaskCounts};

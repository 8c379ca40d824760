//! Batchmix - balanced combination planning and bounded-concurrency batch execution
//!
//! Batchmix turns several independent pools of media material into an even,
//! duplicate-free set of jobs, then runs those jobs through a scheduler that
//! caps concurrency, isolates every attempt in its own worker, retries failures
//! and streams progress to observers.

pub mod builder;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod id;
pub mod planner;
pub mod scheduler;
pub mod system;
pub mod worker;

pub use error::{BatchError, Result};

//! Domain types for batchmix
//!
//! This module contains the core domain types:
//! - TaskDescriptor: one executable media job and its budgets
//! - TaskState / TaskSnapshot: lifecycle state held by the scheduler
//! - AttemptResult: terminal result of one execution attempt
//! - TaskEvent: notifications delivered to observers

pub mod event;
pub mod outcome;
pub mod task;

pub use event::{TaskEvent, channels};
pub use outcome::AttemptResult;
pub use task::{TaskDescriptor, TaskSnapshot, TaskState};

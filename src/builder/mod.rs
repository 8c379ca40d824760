//! Task descriptor construction
//!
//! Turns planned combinations into executable jobs:
//! - TaskBuilder: shared job template applied to each tuple
//! - BatchFile: YAML batch definition (pools, count, template)

mod batch;
mod tasks;

pub use batch::{BatchFile, PreparedBatch};
pub use tasks::TaskBuilder;

//! Combination planning over independent material pools.
//!
//! This module provides:
//! - **MaterialPool**: an ordered list of opaque items (usually file paths)
//! - **UsageLedger**: how often each item of each pool has been selected
//! - **CombinationPlanner**: balanced, duplicate-avoiding tuple generation
//! - **SortConfig**: optional multi-key reordering of the accepted tuples
//!
//! # Example
//!
//! ```
//! use batchmix::planner::{CombinationPlanner, MaterialPool};
//!
//! let pools = vec![
//!     MaterialPool::new("intro", vec!["a.mp4", "b.mp4", "c.mp4"]),
//!     MaterialPool::new("outro", vec!["x.mp4", "y.mp4"]),
//! ];
//! let plan = CombinationPlanner::for_pools(&pools).plan(5, None).unwrap();
//! assert_eq!(plan.combinations.len(), 5);
//! ```

mod combination;
mod ledger;
mod pool;
mod sort;

pub use combination::{CombinationPlanner, Plan, plan};
pub use ledger::UsageLedger;
pub use pool::{MaterialPool, PoolSource};
pub use sort::{SortConfig, SortDirection};

/// One index per pool; component `i` indexes into pool `i`.
pub type CombinationIndex = Vec<usize>;

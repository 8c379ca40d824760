//! ID generation utilities for batchmix
//!
//! Provides functions for generating unique identifiers for tasks and events.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Generate a unique task ID
///
/// Format: `task-{timestamp_ms}-{sequence}-{random_hex}`
/// Example: `task-1738300800123-17-a1b2`
///
/// The process-wide sequence keeps ids distinct when a whole batch is built
/// within the same millisecond.
pub fn generate_task_id() -> String {
    let timestamp = now_ms();
    let seq = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let random: u16 = rand::rng().random();
    format!("task-{}-{}-{:04x}", timestamp, seq, random)
}

/// Generate a job name from a prefix and a 1-based ordinal
///
/// Format: `{prefix}_{ordinal:04}`
/// Example: For prefix "mix" and ordinal 7: "mix_0007"
pub fn generate_job_name(prefix: &str, ordinal: usize) -> String {
    format!("{}_{:04}", prefix, ordinal)
}

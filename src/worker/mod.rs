//! Isolated execution of attempts
//!
//! - WorkerExecutor: spawns one unit per attempt and relays its messages
//! - WorkerHandle: kill switch and identity of a running unit
//! - WorkerMessage: the Ready / Log / Result protocol

mod executor;
mod handle;
mod messages;

pub use executor::{DEFAULT_KILL_GRACE, WorkerExecutor};
pub use handle::WorkerHandle;
pub use messages::{WorkerMessage, WorkerReport};

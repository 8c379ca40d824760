//! Retry decisions for failed attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{AttemptResult, TaskDescriptor};
use crate::error::BatchError;

/// Decides whether a finished attempt is retried.
///
/// Retries happen immediately unless `delay_ms` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Pause before a retry is queued again, if any.
    pub fn delay(&self) -> Option<Duration> {
        (self.delay_ms > 0).then(|| Duration::from_millis(self.delay_ms))
    }

    /// Only failures with budget left are retried; cancellation never is.
    pub fn should_retry(&self, descriptor: &TaskDescriptor, result: &AttemptResult) -> bool {
        match result {
            AttemptResult::Failed { .. } => descriptor.has_retry_budget(),
            AttemptResult::Succeeded { .. } | AttemptResult::Cancelled => false,
        }
    }

    /// Final error for a task that ran out of attempts.
    pub fn exhausted(&self, descriptor: &TaskDescriptor, last_error: &str) -> BatchError {
        BatchError::RetryExhausted {
            attempts: descriptor.attempt_number(),
            last_error: last_error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(max_retry: u32, attempt: u32) -> TaskDescriptor {
        let mut task = TaskDescriptor::new("op", "a", "/tmp").with_max_retry(max_retry);
        task.attempt = attempt;
        task
    }

    #[test]
    fn test_retries_while_budget_remains() {
        let policy = RetryPolicy::immediate();
        let failed = AttemptResult::failed("exit 1");
        assert!(policy.should_retry(&task(2, 0), &failed));
        assert!(policy.should_retry(&task(2, 1), &failed));
        assert!(!policy.should_retry(&task(2, 2), &failed));
        assert!(!policy.should_retry(&task(0, 0), &failed));
    }

    #[test]
    fn test_cancelled_never_retried() {
        let policy = RetryPolicy::immediate();
        assert!(!policy.should_retry(&task(5, 0), &AttemptResult::Cancelled));
    }

    #[test]
    fn test_success_not_retried() {
        let policy = RetryPolicy::immediate();
        assert!(!policy.should_retry(&task(5, 0), &AttemptResult::succeeded(vec![])));
    }

    #[test]
    fn test_delay() {
        assert_eq!(RetryPolicy::immediate().delay(), None);
        assert_eq!(
            RetryPolicy::with_delay(Duration::from_millis(250)).delay(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_exhausted_carries_last_error() {
        let err = RetryPolicy::immediate().exhausted(&task(1, 1), "exit code 2");
        match err {
            BatchError::RetryExhausted { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, "exit code 2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

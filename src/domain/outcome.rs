//! Attempt outcome types.
//!
//! This module defines the terminal result of one execution attempt.

use serde::{Deserialize, Serialize};

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AttemptResult {
    /// Engine succeeded and produced these outputs
    Succeeded { outputs: Vec<String> },
    /// Engine failed, or the worker exited without reporting
    Failed { error: String },
    /// Worker was killed on request
    Cancelled,
}

impl AttemptResult {
    pub fn succeeded(outputs: Vec<String>) -> Self {
        AttemptResult::Succeeded { outputs }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        AttemptResult::Failed { error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptResult::Succeeded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AttemptResult::Cancelled)
    }

    /// Error text for failed attempts
    pub fn error(&self) -> Option<&str> {
        match self {
            AttemptResult::Failed { error } => Some(error),
            _ => None,
        }
    }
}

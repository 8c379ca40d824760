//! Output ordering for planned combinations.
//!
//! Sorting runs after planning over the accepted tuples only; it reorders the
//! output and never influences balance.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};

use super::CombinationIndex;

/// Sort direction, either shared by all keys or given per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortDirection {
    All(bool),
    PerKey(Vec<bool>),
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::All(true)
    }
}

impl SortDirection {
    /// Whether key `position` sorts ascending. Missing per-key entries default to ascending.
    pub fn ascending(&self, position: usize) -> bool {
        match self {
            SortDirection::All(asc) => *asc,
            SortDirection::PerKey(list) => list.get(position).copied().unwrap_or(true),
        }
    }
}

/// Multi-key sort over tuple components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    /// Pool indices, most significant first
    pub priority: Vec<usize>,
    /// Direction for all keys or for each key
    #[serde(default)]
    pub ascending: SortDirection,
}

impl SortConfig {
    /// Sort by the given pools, all ascending.
    pub fn by(priority: Vec<usize>) -> Self {
        Self {
            priority,
            ascending: SortDirection::All(true),
        }
    }

    /// Set a shared direction.
    pub fn with_ascending(mut self, ascending: bool) -> Self {
        self.ascending = SortDirection::All(ascending);
        self
    }

    /// Set one direction per key.
    pub fn with_directions(mut self, directions: Vec<bool>) -> Self {
        self.ascending = SortDirection::PerKey(directions);
        self
    }

    /// Reject keys that reference a pool that does not exist.
    pub fn validate(&self, pool_count: usize) -> Result<()> {
        if let Some(bad) = self.priority.iter().find(|&&p| p >= pool_count) {
            return Err(BatchError::Planning(format!(
                "sort priority references pool {} but only {} pools were given",
                bad, pool_count
            )));
        }
        if let SortDirection::PerKey(list) = &self.ascending
            && list.len() > self.priority.len()
        {
            return Err(BatchError::Planning(format!(
                "{} sort directions given for {} sort keys",
                list.len(),
                self.priority.len()
            )));
        }
        Ok(())
    }

    /// Compare two tuples by the configured keys.
    pub fn compare(&self, a: &CombinationIndex, b: &CombinationIndex) -> Ordering {
        for (position, &pool) in self.priority.iter().enumerate() {
            let ord = a[pool].cmp(&b[pool]);
            let ord = if self.ascending.ascending(position) {
                ord
            } else {
                ord.reverse()
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort in place. Call `validate` first.
    pub fn apply(&self, combinations: &mut [CombinationIndex]) {
        if self.priority.is_empty() {
            return;
        }
        combinations.sort_by(|a, b| self.compare(a, b));
    }
}

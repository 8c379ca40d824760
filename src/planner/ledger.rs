//! Usage ledger - per-pool selection counts.
//!
//! Pure bookkeeping. Owned and mutated by a single planning call, read-only
//! once the plan is returned.

use serde::Serialize;

/// Selection counts for every item of every pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageLedger {
    counts: Vec<Vec<u32>>,
}

impl UsageLedger {
    /// Create a zeroed ledger for pools of the given sizes.
    pub fn new(pool_sizes: &[usize]) -> Self {
        Self {
            counts: pool_sizes.iter().map(|&n| vec![0; n]).collect(),
        }
    }

    /// Number of pools tracked.
    pub fn pool_count(&self) -> usize {
        self.counts.len()
    }

    /// How many times item `index` of pool `pool` has been selected.
    pub fn usage(&self, pool: usize, index: usize) -> u32 {
        self.counts
            .get(pool)
            .and_then(|c| c.get(index))
            .copied()
            .unwrap_or(0)
    }

    /// All counts for one pool, in item order.
    pub fn pool_usage(&self, pool: usize) -> &[u32] {
        self.counts.get(pool).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Item indices of a pool ordered least-used first.
    ///
    /// Ties go by index counted cyclically from `origin`, so `origin` itself
    /// comes first among equally used items.
    pub fn candidates(&self, pool: usize, origin: usize) -> Vec<usize> {
        let counts = self.pool_usage(pool);
        let size = counts.len();
        let mut order: Vec<usize> = (0..size).collect();
        order.sort_by_key(|&i| (counts[i], (i + size - origin % size.max(1)) % size));
        order
    }

    /// Count one selection of every component of `tuple`.
    pub fn record(&mut self, tuple: &[usize]) {
        for (pool, &index) in tuple.iter().enumerate() {
            if let Some(count) = self.counts.get_mut(pool).and_then(|c| c.get_mut(index)) {
                *count += 1;
            }
        }
    }

    /// Difference between the most- and least-used item of a pool.
    pub fn spread(&self, pool: usize) -> u32 {
        let counts = self.pool_usage(pool);
        match (counts.iter().max(), counts.iter().min()) {
            (Some(max), Some(min)) => max - min,
            _ => 0,
        }
    }

    /// Total selections recorded for a pool.
    pub fn total(&self, pool: usize) -> u64 {
        self.pool_usage(pool).iter().map(|&c| c as u64).sum()
    }
}

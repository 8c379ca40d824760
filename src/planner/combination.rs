//! Balanced combination search.
//!
//! Each step walks the pools in order, trying items least-used first, and
//! backtracks from the last pool whenever the tuple built so far was already
//! emitted. A per-prefix count of emitted tuples lets the search skip whole
//! subtrees that are exhausted, so finding the next tuple costs at most
//! `pools × items` probes instead of scanning the product space.
//!
//! Once every combination has been emitted the emitted set is cleared and a
//! new round begins. Reuse past the product size therefore stays balanced
//! and each round is duplicate-free.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;

use super::ledger::UsageLedger;
use super::pool::MaterialPool;
use super::sort::SortConfig;
use super::CombinationIndex;

/// Result of one planning call.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// Accepted tuples, in generation order unless a sort was requested
    pub combinations: Vec<CombinationIndex>,
    /// Final per-item usage counts
    pub ledger: UsageLedger,
}

impl Plan {
    fn empty(pool_sizes: &[usize]) -> Self {
        Self {
            combinations: Vec::new(),
            ledger: UsageLedger::new(pool_sizes),
        }
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }
}

/// Plans balanced, duplicate-avoiding index tuples over a fixed set of pools.
#[derive(Debug, Clone)]
pub struct CombinationPlanner {
    pool_sizes: Vec<usize>,
    /// `capacity[d]` = number of distinct completions below a prefix of length `d`
    capacity: Vec<u128>,
}

impl CombinationPlanner {
    /// Create a planner for pools of the given sizes.
    pub fn new(pool_sizes: Vec<usize>) -> Self {
        let mut capacity = vec![1u128; pool_sizes.len() + 1];
        for depth in (0..pool_sizes.len()).rev() {
            capacity[depth] = capacity[depth + 1].saturating_mul(pool_sizes[depth] as u128);
        }
        Self { pool_sizes, capacity }
    }

    /// Create a planner sized to the given pools.
    pub fn for_pools<T>(pools: &[MaterialPool<T>]) -> Self {
        Self::new(pools.iter().map(MaterialPool::len).collect())
    }

    pub fn pool_sizes(&self) -> &[usize] {
        &self.pool_sizes
    }

    /// Number of distinct tuples (product of pool sizes, saturating).
    pub fn max_combinations(&self) -> u128 {
        if self.pool_sizes.is_empty() {
            return 0;
        }
        self.capacity[0]
    }

    /// Produce `count` tuples.
    ///
    /// Returns an empty plan when there are no pools or any pool is empty.
    /// An out-of-range sort key is reported before any work is done.
    pub fn plan(&self, count: usize, sort: Option<&SortConfig>) -> Result<Plan> {
        if let Some(sort) = sort {
            sort.validate(self.pool_sizes.len())?;
        }

        if self.max_combinations() == 0 {
            tracing::debug!(pools = ?self.pool_sizes, "Empty pool set, nothing to plan");
            return Ok(Plan::empty(&self.pool_sizes));
        }

        let mut search = Search::new(self);
        let mut combinations = Vec::with_capacity(count);

        for _ in 0..count {
            if search.round_complete() {
                tracing::debug!(
                    emitted = combinations.len(),
                    max = %self.max_combinations(),
                    "All combinations emitted, starting a new round"
                );
                search.start_round();
            }

            match search.next_tuple() {
                Some(tuple) => {
                    search.accept(&tuple);
                    combinations.push(tuple);
                }
                None => break,
            }
        }

        if combinations.len() as u128 > self.max_combinations() {
            tracing::info!(
                requested = count,
                max = %self.max_combinations(),
                "Requested more jobs than distinct combinations, items are reused"
            );
        }

        if let Some(sort) = sort {
            sort.apply(&mut combinations);
        }

        Ok(Plan {
            combinations,
            ledger: search.ledger,
        })
    }
}

/// Mutable state of one planning call.
struct Search<'a> {
    planner: &'a CombinationPlanner,
    ledger: UsageLedger,
    /// Emitted tuples counted under every prefix (lengths 1..=pools)
    emitted_under: HashMap<Vec<usize>, u128>,
    emitted_in_round: u128,
}

impl<'a> Search<'a> {
    fn new(planner: &'a CombinationPlanner) -> Self {
        Self {
            planner,
            ledger: UsageLedger::new(&planner.pool_sizes),
            emitted_under: HashMap::new(),
            emitted_in_round: 0,
        }
    }

    fn round_complete(&self) -> bool {
        self.emitted_in_round >= self.planner.max_combinations()
    }

    fn start_round(&mut self) {
        self.emitted_under.clear();
        self.emitted_in_round = 0;
    }

    fn is_exhausted(&self, prefix: &[usize]) -> bool {
        let used = self.emitted_under.get(prefix).copied().unwrap_or(0);
        used >= self.planner.capacity[prefix.len()]
    }

    /// Candidate order for `pool` given the items already chosen for earlier pools.
    ///
    /// Least-used first. Ties go by index, counted from the item picked in
    /// the nearest earlier pool of the same size; this walks equal-sized
    /// pools along diagonals instead of revisiting the same row, even when
    /// pools of other sizes sit between them.
    fn candidates(&self, pool: usize, prefix: &[usize]) -> Vec<usize> {
        let sizes = &self.planner.pool_sizes;
        let size = sizes[pool];
        let origin = (0..prefix.len())
            .rev()
            .find(|&k| sizes[k] == size)
            .map_or(0, |k| prefix[k]);
        self.ledger.candidates(pool, origin)
    }

    /// Depth-first search with an explicit stack, bounded by the pool count.
    fn next_tuple(&self) -> Option<CombinationIndex> {
        let pools = self.planner.pool_sizes.len();
        let mut levels: Vec<(Vec<usize>, usize)> = vec![(self.candidates(0, &[]), 0)];
        let mut tuple: Vec<usize> = Vec::with_capacity(pools);

        while let Some((order, cursor)) = levels.last_mut() {
            let Some(&candidate) = order.get(*cursor) else {
                levels.pop();
                if tuple.pop().is_some()
                    && let Some((_, parent_cursor)) = levels.last_mut()
                {
                    *parent_cursor += 1;
                }
                continue;
            };

            tuple.push(candidate);
            if self.is_exhausted(&tuple) {
                tuple.pop();
                *cursor += 1;
                continue;
            }
            if tuple.len() == pools {
                return Some(tuple);
            }
            let next_pool = tuple.len();
            levels.push((self.candidates(next_pool, &tuple), 0));
        }

        None
    }

    fn accept(&mut self, tuple: &[usize]) {
        for len in 1..=tuple.len() {
            *self.emitted_under.entry(tuple[..len].to_vec()).or_insert(0) += 1;
        }
        self.emitted_in_round += 1;
        self.ledger.record(tuple);
    }
}

/// Plan `count` tuples over `pools`.
pub fn plan<T>(pools: &[MaterialPool<T>], count: usize, sort: Option<&SortConfig>) -> Result<Vec<CombinationIndex>> {
    Ok(CombinationPlanner::for_pools(pools).plan(count, sort)?.combinations)
}

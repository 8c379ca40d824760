//! Planner integration tests
//!
//! Drives the planning front half through the public API: pools in,
//! balanced tuples and task descriptors out.

use std::collections::HashSet;
use std::path::PathBuf;

use batchmix::builder::TaskBuilder;
use batchmix::error::BatchError;
use batchmix::planner::{CombinationPlanner, MaterialPool, SortConfig, plan};

#[test]
fn test_three_by_two_pools_five_jobs() {
    let pools = vec![
        MaterialPool::new("numbers", vec!["1", "2", "3"]),
        MaterialPool::new("letters", vec!["a", "b"]),
    ];

    let planned = CombinationPlanner::for_pools(&pools).plan(5, None).unwrap();

    assert_eq!(planned.len(), 5);
    let distinct: HashSet<_> = planned.combinations.iter().collect();
    assert_eq!(distinct.len(), 5);

    // No number used three times while another is unused
    let counts = planned.ledger.pool_usage(0);
    assert_eq!(counts.iter().sum::<u32>(), 5);
    assert!(counts.iter().all(|&c| (1..=2).contains(&c)));
    assert!(planned.ledger.spread(0) <= 1);
    assert!(planned.ledger.spread(1) <= 1);
}

#[test]
fn test_empty_pool_yields_nothing() {
    let pools = vec![MaterialPool::new("empty", vec![]), MaterialPool::new("pair", vec![1, 2])];
    assert!(plan(&pools, 3, None).unwrap().is_empty());
}

#[test]
fn test_plan_is_deterministic() {
    let pools = vec![
        MaterialPool::from(vec!["i1", "i2", "i3", "i4"]),
        MaterialPool::from(vec!["b1", "b2", "b3"]),
        MaterialPool::from(vec!["o1", "o2"]),
    ];
    let first = plan(&pools, 17, None).unwrap();
    let second = plan(&pools, 17, None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_full_product_then_balanced_reuse() {
    let pools = vec![MaterialPool::from(vec![0, 1]), MaterialPool::from(vec![0, 1, 2])];
    let planner = CombinationPlanner::for_pools(&pools);
    assert_eq!(planner.max_combinations(), 6);

    let planned = planner.plan(9, None).unwrap();
    assert_eq!(planned.len(), 9);

    // The first round covers every combination exactly once
    let first_round: HashSet<_> = planned.combinations[..6].iter().collect();
    assert_eq!(first_round.len(), 6);

    assert!(planned.ledger.spread(0) <= 1);
    assert!(planned.ledger.spread(1) <= 1);
}

#[test]
fn test_sort_reorders_without_changing_the_set() {
    let pools = vec![MaterialPool::from(vec![0, 1, 2]), MaterialPool::from(vec![0, 1])];
    let unsorted = plan(&pools, 6, None).unwrap();
    let sorted = plan(&pools, 6, Some(&SortConfig::by(vec![1, 0]).with_ascending(false))).unwrap();

    let a: HashSet<_> = unsorted.iter().collect();
    let b: HashSet<_> = sorted.iter().collect();
    assert_eq!(a, b);
    assert_eq!(sorted.first(), Some(&vec![2, 1]));
    assert_eq!(sorted.last(), Some(&vec![0, 0]));
}

#[test]
fn test_out_of_range_sort_key_is_rejected() {
    let pools = vec![MaterialPool::from(vec![1, 2])];
    let err = plan(&pools, 2, Some(&SortConfig::by(vec![3]))).unwrap_err();
    assert!(matches!(err, BatchError::Planning(_)));
}

#[test]
fn test_descriptors_follow_the_plan() {
    let pools = vec![
        MaterialPool::new("intro", vec![PathBuf::from("i1.mp4"), PathBuf::from("i2.mp4")]),
        MaterialPool::new("outro", vec![PathBuf::from("o1.mp4"), PathBuf::from("o2.mp4")]),
    ];
    let planned = CombinationPlanner::for_pools(&pools).plan(4, None).unwrap();

    let tasks = TaskBuilder::new("video-stitch", "/out")
        .with_name_prefix("promo")
        .with_max_retry(2)
        .build(&pools, &planned.combinations)
        .unwrap();

    assert_eq!(tasks.len(), 4);
    let ids: HashSet<_> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), 4);

    for (task, tuple) in tasks.iter().zip(&planned.combinations) {
        assert_eq!(task.operation_kind, "video-stitch");
        assert_eq!(task.max_retry, 2);
        assert_eq!(task.files[0], pools[0].items[tuple[0]]);
        assert_eq!(task.files[1], pools[1].items[tuple[1]]);
    }
    assert_eq!(tasks[0].name, "promo_0001");
    assert_eq!(tasks[3].name, "promo_0004");
}

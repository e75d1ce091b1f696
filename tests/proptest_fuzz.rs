//! Property-based tests for sink invariants.
//!
//! Uses proptest to vary item counts, batch sizes and pool bounds, and checks
//! the properties every sink promises regardless of configuration:
//! no loss, no duplication, bounded batches, bounded worker counts.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use ingest_sinks::{
    BatchSinkConfig, BatchingSink, BufferedSink, DataSink, ElasticSink, ElasticSinkConfig,
    PoolSinkConfig, ProcessError, ScalingDecision, ScalingPolicy, SinkQueue,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime")
}

// =============================================================================
// Strategies
// =============================================================================

fn scaling_policy_strategy() -> impl Strategy<Value = ScalingPolicy> {
    (1usize..8, 0usize..8, prop_oneof![Just(0.5), Just(1.0), Just(2.0), Just(4.0), 0.1f64..10.0])
        .prop_map(|(min, extra, factor)| ScalingPolicy {
            min_workers: min,
            max_workers: min + extra,
            scaling_factor: factor,
        })
}

// =============================================================================
// Scaling decision
// =============================================================================

proptest! {
    #[test]
    fn scaling_never_leaves_bounds(
        policy in scaling_policy_strategy(),
        backlog in 0usize..10_000,
        offset in 0usize..8,
    ) {
        let workers = (policy.min_workers + offset).min(policy.max_workers);
        let next = match policy.decide(backlog, workers) {
            ScalingDecision::Grow => workers + 1,
            ScalingDecision::Shrink => workers - 1,
            ScalingDecision::Hold => workers,
        };
        prop_assert!(next >= policy.min_workers);
        prop_assert!(next <= policy.max_workers);
    }

    #[test]
    fn scaling_grow_is_monotonic_in_backlog(
        policy in scaling_policy_strategy(),
        backlog in 0usize..200,
        offset in 0usize..8,
    ) {
        let workers = (policy.min_workers + offset).min(policy.max_workers);
        if policy.decide(backlog, workers) == ScalingDecision::Grow {
            prop_assert_eq!(policy.decide(backlog + 1, workers), ScalingDecision::Grow);
        }
        if policy.decide(backlog + 1, workers) == ScalingDecision::Shrink {
            prop_assert_eq!(policy.decide(backlog, workers), ScalingDecision::Shrink);
        }
    }
}

// =============================================================================
// Queue
// =============================================================================

proptest! {
    #[test]
    fn queue_pop_up_to_preserves_fifo(items in prop::collection::vec(any::<u32>(), 0..200), chunk in 1usize..50) {
        let queue = SinkQueue::new();
        for item in &items {
            queue.push(*item);
        }
        let mut drained = Vec::new();
        loop {
            let batch = queue.pop_up_to(chunk);
            if batch.is_empty() {
                break;
            }
            prop_assert!(batch.len() <= chunk);
            drained.extend(batch);
        }
        prop_assert_eq!(drained, items);
        prop_assert!(queue.is_empty());
    }
}

// =============================================================================
// Sinks
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn batching_delivers_everything_in_bounded_batches(
        count in 0u32..300,
        batch_size in 1usize..40,
    ) {
        let batches: Arc<Mutex<Vec<Vec<u32>>>> = Arc::default();
        let summary = runtime().block_on({
            let batches = batches.clone();
            async move {
                let sink = BatchingSink::new(
                    BatchSinkConfig { name: "prop-batch".into(), batch_size, time_limit_ms: 5 },
                    move |batch: Vec<u32>| {
                        let batches = batches.clone();
                        async move {
                            batches.lock().push(batch);
                            Ok::<(), ProcessError>(())
                        }
                    },
                )
                .unwrap();
                for i in 0..count {
                    sink.submit(i).await.unwrap();
                }
                sink.complete().await.unwrap()
            }
        });

        let batches = batches.lock();
        prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
        let flat: Vec<u32> = batches.iter().flatten().copied().collect();
        prop_assert_eq!(flat, (0..count).collect::<Vec<_>>());
        prop_assert_eq!(summary.processed, u64::from(count));
        prop_assert_eq!(summary.batches as usize, batches.len());
    }

    #[test]
    fn pool_delivers_exactly_once(count in 0u64..300, max_workers in 1usize..8) {
        let seen: Arc<Mutex<Vec<u64>>> = Arc::default();
        let summary = runtime().block_on({
            let seen = seen.clone();
            async move {
                let sink = BufferedSink::new(
                    PoolSinkConfig { name: "prop-pool".into(), max_workers },
                    move |item: u64| {
                        let seen = seen.clone();
                        async move {
                            seen.lock().push(item);
                            Ok::<(), ProcessError>(())
                        }
                    },
                )
                .unwrap();
                for i in 0..count {
                    sink.submit(i).await.unwrap();
                    prop_assert!(sink.active_workers() <= max_workers);
                }
                Ok(sink.complete().await.unwrap())
            }
        })?;

        let seen = seen.lock();
        let unique: HashSet<_> = seen.iter().copied().collect();
        prop_assert_eq!(seen.len() as u64, count);
        prop_assert_eq!(unique.len() as u64, count);
        prop_assert!(summary.fully_drained());
    }

    #[test]
    fn elastic_stays_within_bounds_and_delivers(
        count in 0u64..300,
        min_workers in 1usize..4,
        extra in 0usize..5,
        scaling_factor in prop_oneof![Just(0.5), Just(1.0), Just(4.0)],
    ) {
        let max_workers = min_workers + extra;
        let seen: Arc<Mutex<Vec<u64>>> = Arc::default();
        let summary = runtime().block_on({
            let seen = seen.clone();
            async move {
                let sink = ElasticSink::new(
                    ElasticSinkConfig {
                        name: "prop-elastic".into(),
                        min_workers,
                        max_workers,
                        scaling_factor,
                        idle_poll_ms: 5,
                    },
                    move |item: u64| {
                        let seen = seen.clone();
                        async move {
                            seen.lock().push(item);
                            Ok::<(), ProcessError>(())
                        }
                    },
                )
                .unwrap();
                for i in 0..count {
                    sink.submit(i).await.unwrap();
                    let workers = sink.worker_count();
                    prop_assert!(workers >= min_workers && workers <= max_workers);
                }
                Ok(sink.complete().await.unwrap())
            }
        })?;

        let seen = seen.lock();
        let unique: HashSet<_> = seen.iter().copied().collect();
        prop_assert_eq!(seen.len() as u64, count);
        prop_assert_eq!(unique.len() as u64, count);
        prop_assert_eq!(summary.processed, count);
    }
}

// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The bridge connecting producers to consumers.
//!
//! Bridging recursively splits a producer and a consumer in half, runs the
//! two halves and combines their partial results. Down to a configurable
//! depth the left half is submitted to the thread pool while the right half
//! runs on the calling thread; below that depth the recursion continues
//! sequentially, which bounds the number of tasks a pipeline can have in
//! flight. Splitting stops entirely once a shard is small enough or the
//! recursion too deep, and the shard is then drained on one thread.

use super::config;
use super::consumer::Consumer;
use super::producer::{Producer, UnindexedProducer};
use super::thread_pool::ThreadPool;
use crate::macros::log_trace;

/// Per-pipeline snapshot of everything the recursion needs.
///
/// The global configuration is read once when the pipeline starts, so a
/// concurrent reconfiguration never tears a running pipeline.
struct Context<'pool> {
    /// The pool to offload to. A single-threaded configuration has none and
    /// runs every shard on the calling thread, still splitting at the same
    /// granularity.
    pool: Option<&'pool ThreadPool>,
    min_split_size: usize,
    max_depth: usize,
    /// Depth below which the left half is submitted to the pool.
    parallel_depth_limit: usize,
}

/// Depth down to which halves are offloaded to the pool.
///
/// With `n` worker threads this is `floor(log2(n)) + 1` clamped to `[2, 4]`,
/// so a pipeline submits at most `2^limit - 1` tasks. Task joins only ever
/// target tasks the joiner spawned itself, and an unstarted task is stolen
/// back and run inline by its joiner, so the pool cannot deadlock even when
/// every worker is itself blocked in a join.
fn parallel_depth_limit(num_threads: usize) -> usize {
    (num_threads.max(1).ilog2() as usize + 1).clamp(2, 4)
}

/// Runs a full pipeline: drains the producer into the consumer, in parallel
/// on the global thread pool.
pub(crate) fn bridge<P, C>(producer: P, consumer: C) -> C::Result
where
    P: Producer,
    C: Consumer<P::Item>,
{
    let exec = config::execution();
    let ctx = Context {
        pool: exec.pool.as_deref(),
        min_split_size: exec.min_split_size,
        max_depth: exec.max_depth,
        parallel_depth_limit: parallel_depth_limit(exec.num_threads),
    };
    bridge_at_depth(&ctx, producer, consumer, 0)
}

fn bridge_at_depth<P, C>(ctx: &Context<'_>, producer: P, consumer: C, depth: usize) -> C::Result
where
    P: Producer,
    C: Consumer<P::Item>,
{
    let len = producer.len();
    if len <= ctx.min_split_size || depth >= ctx.max_depth {
        return bridge_sequential(producer, consumer);
    }
    let mid = len / 2;
    if mid == 0 {
        return bridge_sequential(producer, consumer);
    }

    // The midpoint is interior (0 < mid < len), so the split cannot fail.
    let (left_producer, right_producer) = producer
        .split_at(mid)
        .expect("splitting at an interior index always succeeds");
    let (left_consumer, right_consumer) = consumer.split();

    let (left, right) = match ctx.pool {
        Some(pool) if depth < ctx.parallel_depth_limit => {
            log_trace!("[bridge] offloading {mid} of {len} items at depth {depth}");
            // SAFETY: the handle is joined below, before the borrows
            // captured by the task (`ctx` and the moved halves' own
            // borrows) go away.
            let handle = unsafe {
                pool.submit(move || bridge_at_depth(ctx, left_producer, left_consumer, depth + 1))
            };
            let right = bridge_at_depth(ctx, right_producer, right_consumer, depth + 1);
            (handle.join(), right)
        }
        _ => {
            let left = bridge_at_depth(ctx, left_producer, left_consumer, depth + 1);
            let right = bridge_at_depth(ctx, right_producer, right_consumer, depth + 1);
            (left, right)
        }
    };
    consumer.combine(left, right)
}

/// Runs a pipeline over a producer of unknown length.
///
/// The producer decides itself whether it is worth splitting further; the
/// depth cap is the only other brake on the recursion. When a pool exists,
/// every split is offloaded, which is safe for the same reason as the
/// indexed bridge: joins form a tree and unstarted tasks are stolen back by
/// their joiner.
pub(crate) fn bridge_unindexed<P, C>(producer: P, consumer: C) -> C::Result
where
    P: UnindexedProducer,
    C: Consumer<P::Item>,
{
    let exec = config::execution();
    let ctx = Context {
        pool: exec.pool.as_deref(),
        min_split_size: exec.min_split_size,
        max_depth: exec.max_depth,
        parallel_depth_limit: parallel_depth_limit(exec.num_threads),
    };
    bridge_unindexed_at_depth(&ctx, producer, consumer, 0)
}

fn bridge_unindexed_at_depth<P, C>(
    ctx: &Context<'_>,
    producer: P,
    consumer: C,
    depth: usize,
) -> C::Result
where
    P: UnindexedProducer,
    C: Consumer<P::Item>,
{
    if !producer.can_split() || depth >= ctx.max_depth {
        return consumer.consume_iter(producer.into_seq_iter());
    }
    let (left_producer, right_producer) = producer.split();
    let Some(right_producer) = right_producer else {
        return consumer.consume_iter(left_producer.into_seq_iter());
    };
    let (left_consumer, right_consumer) = consumer.split();

    log_trace!("[bridge] split an unindexed producer at depth {depth}");
    let (left, right) = match ctx.pool {
        Some(pool) => {
            // SAFETY: the handle is joined below, before the borrows
            // captured by the task go away.
            let handle = unsafe {
                pool.submit(move || {
                    bridge_unindexed_at_depth(ctx, left_producer, left_consumer, depth + 1)
                })
            };
            let right = bridge_unindexed_at_depth(ctx, right_producer, right_consumer, depth + 1);
            (handle.join(), right)
        }
        None => {
            let left = bridge_unindexed_at_depth(ctx, left_producer, left_consumer, depth + 1);
            let right = bridge_unindexed_at_depth(ctx, right_producer, right_consumer, depth + 1);
            (left, right)
        }
    };
    consumer.combine(left, right)
}

/// Runs a full pipeline on the calling thread, with no splitting at all.
pub(crate) fn bridge_sequential<P, C>(producer: P, consumer: C) -> C::Result
where
    P: Producer,
    C: Consumer<P::Item>,
{
    consumer.consume_iter(producer.into_seq_iter())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::config::test_util::ConfigGuard;
    use crate::core::config::{get_num_threads, set_max_depth, set_min_split_size, set_num_threads};
    use crate::core::consumer::{
        CollectConsumer, CountConsumer, FilterConsumer, FoldConsumer, MapConsumer, MaxConsumer,
        MinConsumer, ReduceConsumer, SumConsumer,
    };
    use crate::core::producer::{RangeProducer, SliceProducer};

    #[test]
    fn depth_limit_follows_the_thread_count() {
        assert_eq!(parallel_depth_limit(1), 2);
        assert_eq!(parallel_depth_limit(2), 2);
        assert_eq!(parallel_depth_limit(4), 3);
        assert_eq!(parallel_depth_limit(8), 4);
        assert_eq!(parallel_depth_limit(64), 4);
    }

    #[test]
    fn bridge_sums_squares() {
        let _guard = ConfigGuard::acquire();
        set_min_split_size(1).unwrap();

        let producer = RangeProducer::from(0..100);
        let square = |x: i64| x * x;
        let consumer = MapConsumer::new(SumConsumer::<i64>::new(), &square);
        assert_eq!(bridge(producer, consumer), 328_350);
    }

    #[test]
    fn bridge_reduces_a_product() {
        let _guard = ConfigGuard::acquire();
        set_min_split_size(1).unwrap();

        let producer = RangeProducer::from(1..11);
        let identity = || 1i64;
        let product = |a: i64, b: i64| a * b;
        let consumer = ReduceConsumer::new(&identity, &product);
        assert_eq!(bridge(producer, consumer), 3_628_800);
    }

    #[test]
    fn bridge_filters_and_counts() {
        let _guard = ConfigGuard::acquire();
        set_min_split_size(1).unwrap();

        let values: Vec<i64> = (0..1000).collect();
        let producer = SliceProducer::new(&values);
        let is_even = |x: &&i64| **x % 2 == 0;
        let consumer = FilterConsumer::new(CountConsumer, &is_even);
        assert_eq!(bridge(producer, consumer), 500);
    }

    #[test]
    fn bridge_collect_preserves_order() {
        let _guard = ConfigGuard::acquire();
        set_min_split_size(1).unwrap();

        let producer = RangeProducer::from(0..257);
        let collected = bridge(producer, CollectConsumer);
        assert_eq!(collected, (0..257).collect::<Vec<i64>>());
    }

    #[test]
    fn bridge_min_max_over_a_range() {
        let _guard = ConfigGuard::acquire();
        set_min_split_size(1).unwrap();

        assert_eq!(
            bridge(RangeProducer::from(-50..50), MinConsumer),
            Some(-50)
        );
        assert_eq!(
            bridge(RangeProducer::from(-50..50), MaxConsumer),
            Some(49)
        );
        let empty = RangeProducer::from(0..0);
        assert_eq!(bridge(empty, MinConsumer), None);
    }

    #[test]
    fn bridge_matches_sequential_at_any_depth() {
        let _guard = ConfigGuard::acquire();
        set_min_split_size(1).unwrap();

        for max_depth in 1..6 {
            set_max_depth(max_depth).unwrap();
            let parallel = bridge(RangeProducer::from(0..1234), SumConsumer::<i64>::new());
            let sequential =
                bridge_sequential(RangeProducer::from(0..1234), SumConsumer::<i64>::new());
            assert_eq!(parallel, sequential);
        }
    }

    #[test]
    fn single_thread_splits_at_the_same_granularity() {
        let _guard = ConfigGuard::acquire();
        set_min_split_size(1).unwrap();
        let previous = get_num_threads();
        set_num_threads(1).unwrap();

        // One fold value per leaf shard: with four items and a split
        // threshold of one, the recursion must produce four shards even
        // though everything runs on the calling thread.
        let identity = || 0usize;
        let count_op = |acc: usize, _item: i64| acc + 1;
        let consumer = FoldConsumer::new(CountConsumer, &identity, &count_op);
        assert_eq!(bridge(RangeProducer::from(0..4), consumer), 4);

        set_num_threads(previous).unwrap();
    }

    /// Unindexed producer yielding pre-chunked values, splittable down to a
    /// single chunk.
    struct ChunkedProducer {
        chunks: Vec<Vec<i64>>,
    }

    impl UnindexedProducer for ChunkedProducer {
        type Item = i64;
        type SeqIter = std::iter::Flatten<std::vec::IntoIter<Vec<i64>>>;

        fn can_split(&self) -> bool {
            self.chunks.len() > 1
        }

        fn split(mut self) -> (Self, Option<Self>) {
            if self.chunks.len() < 2 {
                return (self, None);
            }
            let right = self.chunks.split_off(self.chunks.len() / 2);
            (self, Some(Self { chunks: right }))
        }

        fn into_seq_iter(self) -> Self::SeqIter {
            self.chunks.into_iter().flatten()
        }
    }

    #[test]
    fn bridge_unindexed_sums_chunks() {
        let _guard = ConfigGuard::acquire();

        let chunks: Vec<Vec<i64>> = (0..20).map(|i| (i * 10..(i + 1) * 10).collect()).collect();
        let producer = ChunkedProducer { chunks };
        assert_eq!(
            bridge_unindexed(producer, SumConsumer::<i64>::new()),
            (0..200).sum::<i64>()
        );
    }

    #[test]
    fn bridge_unindexed_single_chunk_runs_sequentially() {
        let _guard = ConfigGuard::acquire();

        let producer = ChunkedProducer {
            chunks: vec![vec![1, 2, 3]],
        };
        assert_eq!(bridge_unindexed(producer, SumConsumer::<i64>::new()), 6);
    }
}

// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Parallel pipelines: lazy adapters and terminal operations.
//!
//! A pipeline starts from a source ([`par_range()`],
//! [`par_iter()`](IntoParallelRefIterator::par_iter) or [`Source`]),
//! optionally goes through lazy adapters ([`map()`](ParallelIterator::map),
//! [`filter()`](ParallelIterator::filter),
//! [`fold()`](ParallelIterator::fold)), and runs when a terminal operation
//! is called. Adapters build no intermediate collections: they stack
//! consumers, and the whole stack runs once over each shard.

mod source;

use crate::core::consumer::{
    CollectConsumer, Consumer, CountConsumer, FilterConsumer, FoldConsumer, ForEachConsumer,
    MapConsumer, MaxByKeyConsumer, MaxConsumer, MinByKeyConsumer, MinConsumer, ReduceConsumer,
    SumConsumer,
};
use std::iter::Sum;
use std::ops::Add;

pub use source::{
    par_range, par_range_step, IntoParallelIterator, IntoParallelRefIterator, Source,
    UnindexedSource,
};

/// A sequence of items that can be processed in parallel.
///
/// Adapters are lazy and terminals drive the pipeline to completion on the
/// global thread pool. All closures may run concurrently on several threads,
/// hence the `Sync` bounds.
pub trait ParallelIterator: Sized {
    /// The type of the items this pipeline yields.
    type Item: Send;

    /// Runs the pipeline, draining every item into `consumer`.
    ///
    /// This is the plumbing every adapter and terminal goes through; direct
    /// callers are usually custom [`Consumer`] implementations.
    fn drive<C: Consumer<Self::Item>>(self, consumer: C) -> C::Result;

    /// Applies `func` to each item.
    #[must_use = "iterator adaptors are lazy"]
    fn map<U, F>(self, func: F) -> Map<Self, F>
    where
        U: Send,
        F: Fn(Self::Item) -> U + Sync,
    {
        Map { base: self, func }
    }

    /// Keeps only the items for which `predicate` returns `true`.
    #[must_use = "iterator adaptors are lazy"]
    fn filter<F>(self, predicate: F) -> Filter<Self, F>
    where
        F: Fn(&Self::Item) -> bool + Sync,
    {
        Filter {
            base: self,
            predicate,
        }
    }

    /// Folds each sequential shard into one accumulated value, yielding the
    /// per-shard values.
    ///
    /// How many values come out depends on how the input was split, so a
    /// fold is always followed by an order-insensitive terminal (typically
    /// [`reduce`](Self::reduce)) that combines the per-shard values.
    #[must_use = "iterator adaptors are lazy"]
    fn fold<A, Id, F>(self, identity: Id, fold_op: F) -> Fold<Self, Id, F>
    where
        A: Send,
        Id: Fn() -> A + Sync,
        F: Fn(A, Self::Item) -> A + Sync,
    {
        Fold {
            base: self,
            identity,
            fold_op,
        }
    }

    /// Reduces all the items to a single value.
    ///
    /// `identity()` must be a neutral element of `reduce_op`, and
    /// `reduce_op` must be associative; the reduction order across shards is
    /// otherwise unspecified.
    fn reduce<Id, Op>(self, identity: Id, reduce_op: Op) -> Self::Item
    where
        Id: Fn() -> Self::Item + Sync,
        Op: Fn(Self::Item, Self::Item) -> Self::Item + Sync,
    {
        self.drive(ReduceConsumer::new(&identity, &reduce_op))
    }

    /// Runs `func` on each item, for its side effects.
    ///
    /// Invocations from different shards may run concurrently.
    fn for_each<F>(self, func: F)
    where
        F: Fn(Self::Item) + Sync,
    {
        self.drive(ForEachConsumer::new(&func))
    }

    /// Collects all the items into a vector.
    ///
    /// Items coming from ordered sources keep their source order.
    fn collect(self) -> Vec<Self::Item> {
        self.drive(CollectConsumer)
    }

    /// Sums all the items.
    fn sum<S>(self) -> S
    where
        S: Send + Sum<Self::Item> + Add<Output = S>,
    {
        self.drive(SumConsumer::new())
    }

    /// Counts the items.
    fn count(self) -> usize {
        self.drive(CountConsumer)
    }

    /// Returns the smallest item, or [`None`] if the pipeline is empty.
    ///
    /// On ties, the item earliest in the source order wins, regardless of
    /// how the input was split.
    fn min(self) -> Option<Self::Item>
    where
        Self::Item: Ord,
    {
        self.drive(MinConsumer)
    }

    /// Returns the largest item, or [`None`] if the pipeline is empty. Ties
    /// resolve to the earliest item in the source order.
    fn max(self) -> Option<Self::Item>
    where
        Self::Item: Ord,
    {
        self.drive(MaxConsumer)
    }

    /// Returns the item with the smallest key, or [`None`] if the pipeline
    /// is empty. Ties resolve to the earliest item in the source order.
    fn min_by_key<K, F>(self, key: F) -> Option<Self::Item>
    where
        K: Ord,
        F: Fn(&Self::Item) -> K + Sync,
    {
        self.drive(MinByKeyConsumer::new(&key))
    }

    /// Returns the item with the largest key, or [`None`] if the pipeline
    /// is empty. Ties resolve to the earliest item in the source order.
    fn max_by_key<K, F>(self, key: F) -> Option<Self::Item>
    where
        K: Ord,
        F: Fn(&Self::Item) -> K + Sync,
    {
        self.drive(MaxByKeyConsumer::new(&key))
    }

    /// Returns `true` if `predicate` holds for at least one item.
    ///
    /// Every item is visited; there is no short-circuiting across shards.
    fn any<F>(self, predicate: F) -> bool
    where
        F: Fn(Self::Item) -> bool + Sync,
    {
        let identity = || false;
        let or = |a: bool, b: bool| a || b;
        self.drive(MapConsumer::new(ReduceConsumer::new(&identity, &or), &predicate))
    }

    /// Returns `true` if `predicate` holds for every item (vacuously on an
    /// empty pipeline). Every item is visited.
    fn all<F>(self, predicate: F) -> bool
    where
        F: Fn(Self::Item) -> bool + Sync,
    {
        let identity = || true;
        let and = |a: bool, b: bool| a && b;
        self.drive(MapConsumer::new(ReduceConsumer::new(&identity, &and), &predicate))
    }
}

/// A pipeline applying a function to each item. See
/// [`ParallelIterator::map()`].
#[must_use = "iterator adaptors are lazy"]
pub struct Map<P, F> {
    base: P,
    func: F,
}

impl<P, U, F> ParallelIterator for Map<P, F>
where
    P: ParallelIterator,
    U: Send,
    F: Fn(P::Item) -> U + Sync,
{
    type Item = U;

    fn drive<C: Consumer<U>>(self, consumer: C) -> C::Result {
        self.base.drive(MapConsumer::new(consumer, &self.func))
    }
}

/// A pipeline keeping only the items matching a predicate. See
/// [`ParallelIterator::filter()`].
#[must_use = "iterator adaptors are lazy"]
pub struct Filter<P, F> {
    base: P,
    predicate: F,
}

impl<P, F> ParallelIterator for Filter<P, F>
where
    P: ParallelIterator,
    F: Fn(&P::Item) -> bool + Sync,
{
    type Item = P::Item;

    fn drive<C: Consumer<P::Item>>(self, consumer: C) -> C::Result {
        self.base.drive(FilterConsumer::new(consumer, &self.predicate))
    }
}

/// A pipeline folding each shard into one value. See
/// [`ParallelIterator::fold()`].
#[must_use = "iterator adaptors are lazy"]
pub struct Fold<P, Id, F> {
    base: P,
    identity: Id,
    fold_op: F,
}

impl<P, A, Id, F> ParallelIterator for Fold<P, Id, F>
where
    P: ParallelIterator,
    A: Send,
    Id: Fn() -> A + Sync,
    F: Fn(A, P::Item) -> A + Sync,
{
    type Item = A;

    fn drive<C: Consumer<A>>(self, consumer: C) -> C::Result {
        self.base
            .drive(FoldConsumer::new(consumer, &self.identity, &self.fold_op))
    }
}

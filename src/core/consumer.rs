// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Splittable result accumulators.
//!
//! A [`Consumer`] reduces a stream of items to a result. It can split itself
//! into two independent consumers of the same kind, and combine two partial
//! results into one with an associative operation, so that splitting at any
//! granularity (including not at all) yields the same result for
//! order-insensitive consumers.
//!
//! Two families are provided. *Adapter* consumers ([`MapConsumer`],
//! [`FilterConsumer`], [`FoldConsumer`]) wrap a base consumer and a user
//! function, delegating `split` and `combine` structurally to the base.
//! *Terminal* consumers ([`ReduceConsumer`], [`CollectConsumer`],
//! [`ForEachConsumer`], [`SumConsumer`], [`CountConsumer`], [`MinConsumer`],
//! [`MaxConsumer`] and the keyed variants) actually accumulate.
//!
//! User functions are held by shared reference, so splitting a consumer tree
//! allocates nothing and the two halves share no mutable state.

use std::iter::Sum;
use std::ops::Add;

/// A splittable accumulator reducing a stream of items to a result.
pub trait Consumer<T>: Sized + Send {
    /// The type of the accumulated result.
    type Result: Send;

    /// Consumes all the given items on the calling thread, with no further
    /// parallel fan-out, and returns the accumulated result.
    fn consume_iter(self, items: impl Iterator<Item = T>) -> Self::Result;

    /// Splits this consumer into two independent consumers of the same kind.
    ///
    /// Unlike producer splitting, this never fails. The two halves must not
    /// share any mutable state.
    fn split(&self) -> (Self, Self);

    /// Combines the results of two split halves into one.
    ///
    /// Must be associative, and must tolerate any split granularity: combining
    /// the results of `split()` halves is equivalent to never having split.
    fn combine(&self, left: Self::Result, right: Self::Result) -> Self::Result;
}

/// Adapter consumer applying a function to each item before delegating to a
/// base consumer.
pub struct MapConsumer<'f, C, F> {
    base: C,
    func: &'f F,
}

impl<'f, C, F> MapConsumer<'f, C, F> {
    /// Wraps the given base consumer, mapping items with `func` first.
    pub fn new(base: C, func: &'f F) -> Self {
        Self { base, func }
    }
}

impl<T, U, C, F> Consumer<T> for MapConsumer<'_, C, F>
where
    T: Send,
    U: Send,
    C: Consumer<U>,
    F: Fn(T) -> U + Sync,
{
    type Result = C::Result;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> C::Result {
        let func = self.func;
        self.base.consume_iter(items.map(|item| func(item)))
    }

    fn split(&self) -> (Self, Self) {
        let (left, right) = self.base.split();
        (
            Self {
                base: left,
                func: self.func,
            },
            Self {
                base: right,
                func: self.func,
            },
        )
    }

    fn combine(&self, left: C::Result, right: C::Result) -> C::Result {
        self.base.combine(left, right)
    }
}

/// Adapter consumer skipping items that fail a predicate before delegating to
/// a base consumer.
pub struct FilterConsumer<'f, C, F> {
    base: C,
    predicate: &'f F,
}

impl<'f, C, F> FilterConsumer<'f, C, F> {
    /// Wraps the given base consumer, keeping only items matching
    /// `predicate`.
    pub fn new(base: C, predicate: &'f F) -> Self {
        Self { base, predicate }
    }
}

impl<T, C, F> Consumer<T> for FilterConsumer<'_, C, F>
where
    T: Send,
    C: Consumer<T>,
    F: Fn(&T) -> bool + Sync,
{
    type Result = C::Result;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> C::Result {
        let predicate = self.predicate;
        self.base.consume_iter(items.filter(|item| predicate(item)))
    }

    fn split(&self) -> (Self, Self) {
        let (left, right) = self.base.split();
        (
            Self {
                base: left,
                predicate: self.predicate,
            },
            Self {
                base: right,
                predicate: self.predicate,
            },
        )
    }

    fn combine(&self, left: C::Result, right: C::Result) -> C::Result {
        self.base.combine(left, right)
    }
}

/// Adapter consumer folding a whole shard into a single accumulated value,
/// then feeding that value to a base consumer as a one-element stream.
///
/// This is how a fold becomes a regular consumer usable by the bridge: the
/// fold produces one value per leaf shard, and the wrapping terminal consumer
/// combines those values.
pub struct FoldConsumer<'f, C, Id, F> {
    base: C,
    identity: &'f Id,
    fold_op: &'f F,
}

impl<'f, C, Id, F> FoldConsumer<'f, C, Id, F> {
    /// Wraps the given base consumer with a fold over `(identity, fold_op)`.
    pub fn new(base: C, identity: &'f Id, fold_op: &'f F) -> Self {
        Self {
            base,
            identity,
            fold_op,
        }
    }
}

impl<T, U, C, Id, F> Consumer<T> for FoldConsumer<'_, C, Id, F>
where
    T: Send,
    U: Send,
    C: Consumer<U>,
    Id: Fn() -> U + Sync,
    F: Fn(U, T) -> U + Sync,
{
    type Result = C::Result;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> C::Result {
        let mut accumulator = (self.identity)();
        for item in items {
            accumulator = (self.fold_op)(accumulator, item);
        }
        self.base.consume_iter(std::iter::once(accumulator))
    }

    fn split(&self) -> (Self, Self) {
        let (left, right) = self.base.split();
        (
            Self {
                base: left,
                identity: self.identity,
                fold_op: self.fold_op,
            },
            Self {
                base: right,
                identity: self.identity,
                fold_op: self.fold_op,
            },
        )
    }

    fn combine(&self, left: C::Result, right: C::Result) -> C::Result {
        self.base.combine(left, right)
    }
}

/// Terminal consumer reducing all the items to a single value with an
/// identity and an associative operator.
pub struct ReduceConsumer<'f, Id, Op> {
    identity: &'f Id,
    reduce_op: &'f Op,
}

impl<'f, Id, Op> ReduceConsumer<'f, Id, Op> {
    /// Creates a reduction over `(identity, reduce_op)`.
    pub fn new(identity: &'f Id, reduce_op: &'f Op) -> Self {
        Self {
            identity,
            reduce_op,
        }
    }
}

impl<T, Id, Op> Consumer<T> for ReduceConsumer<'_, Id, Op>
where
    T: Send,
    Id: Fn() -> T + Sync,
    Op: Fn(T, T) -> T + Sync,
{
    type Result = T;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> T {
        let mut accumulator = (self.identity)();
        for item in items {
            accumulator = (self.reduce_op)(accumulator, item);
        }
        accumulator
    }

    fn split(&self) -> (Self, Self) {
        // The halves compute with the same functions but are referentially
        // independent: there is no shared mutable state to race on.
        (
            Self {
                identity: self.identity,
                reduce_op: self.reduce_op,
            },
            Self {
                identity: self.identity,
                reduce_op: self.reduce_op,
            },
        )
    }

    fn combine(&self, left: T, right: T) -> T {
        (self.reduce_op)(left, right)
    }
}

/// Terminal consumer collecting all the items into a [`Vec`].
///
/// Each shard accumulates its own buffer and `combine` concatenates the right
/// buffer onto the left one, so a driver that combines halves in source
/// order (as the bridge does) yields a globally ordered result.
pub struct CollectConsumer;

impl<T: Send> Consumer<T> for CollectConsumer {
    type Result = Vec<T>;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> Vec<T> {
        items.collect()
    }

    fn split(&self) -> (Self, Self) {
        (Self, Self)
    }

    fn combine(&self, mut left: Vec<T>, mut right: Vec<T>) -> Vec<T> {
        left.append(&mut right);
        left
    }
}

/// Terminal consumer running a side-effecting function on each item.
///
/// Side effects from different shards may run concurrently; making them
/// thread-safe is the caller's responsibility. `combine` is a no-op.
pub struct ForEachConsumer<'f, F> {
    func: &'f F,
}

impl<'f, F> ForEachConsumer<'f, F> {
    /// Creates a consumer running `func` on every item.
    pub fn new(func: &'f F) -> Self {
        Self { func }
    }
}

impl<T, F> Consumer<T> for ForEachConsumer<'_, F>
where
    T: Send,
    F: Fn(T) + Sync,
{
    type Result = ();

    fn consume_iter(self, items: impl Iterator<Item = T>) {
        for item in items {
            (self.func)(item);
        }
    }

    fn split(&self) -> (Self, Self) {
        (Self { func: self.func }, Self { func: self.func })
    }

    fn combine(&self, _left: (), _right: ()) {}
}

/// Terminal consumer summing all the items.
pub struct SumConsumer<S> {
    _marker: std::marker::PhantomData<fn() -> S>,
}

impl<S> SumConsumer<S> {
    /// Creates a summing consumer with output type `S`.
    pub fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<S> Default for SumConsumer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> Consumer<T> for SumConsumer<S>
where
    T: Send,
    S: Send + Sum<T> + Add<Output = S>,
{
    type Result = S;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> S {
        items.sum()
    }

    fn split(&self) -> (Self, Self) {
        (Self::new(), Self::new())
    }

    fn combine(&self, left: S, right: S) -> S {
        left + right
    }
}

/// Terminal consumer counting the items.
pub struct CountConsumer;

impl<T: Send> Consumer<T> for CountConsumer {
    type Result = usize;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> usize {
        items.count()
    }

    fn split(&self) -> (Self, Self) {
        (Self, Self)
    }

    fn combine(&self, left: usize, right: usize) -> usize {
        left + right
    }
}

/// Terminal consumer finding the minimum item.
///
/// An empty shard yields [`None`], which acts as the identity for `combine`.
/// Comparisons use `<=` so that on ties the element encountered earliest in
/// the original sequence order wins, deterministically across thread counts.
pub struct MinConsumer;

impl<T: Send + Ord> Consumer<T> for MinConsumer {
    type Result = Option<T>;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> Option<T> {
        items.reduce(|a, b| if a <= b { a } else { b })
    }

    fn split(&self) -> (Self, Self) {
        (Self, Self)
    }

    fn combine(&self, left: Option<T>, right: Option<T>) -> Option<T> {
        match (left, right) {
            (None, right) => right,
            (left, None) => left,
            (Some(l), Some(r)) => Some(if l <= r { l } else { r }),
        }
    }
}

/// Terminal consumer finding the maximum item.
///
/// Same shape as [`MinConsumer`], with `>=` comparisons: on ties the earliest
/// encountered element wins.
pub struct MaxConsumer;

impl<T: Send + Ord> Consumer<T> for MaxConsumer {
    type Result = Option<T>;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> Option<T> {
        items.reduce(|a, b| if a >= b { a } else { b })
    }

    fn split(&self) -> (Self, Self) {
        (Self, Self)
    }

    fn combine(&self, left: Option<T>, right: Option<T>) -> Option<T> {
        match (left, right) {
            (None, right) => right,
            (left, None) => left,
            (Some(l), Some(r)) => Some(if l >= r { l } else { r }),
        }
    }
}

/// Terminal consumer finding the item with the minimum key.
pub struct MinByKeyConsumer<'f, F> {
    key: &'f F,
}

impl<'f, F> MinByKeyConsumer<'f, F> {
    /// Creates a consumer comparing items by the given key function.
    pub fn new(key: &'f F) -> Self {
        Self { key }
    }
}

impl<T, K, F> Consumer<T> for MinByKeyConsumer<'_, F>
where
    T: Send,
    K: Ord,
    F: Fn(&T) -> K + Sync,
{
    type Result = Option<T>;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> Option<T> {
        let key = self.key;
        items.reduce(|a, b| if key(&a) <= key(&b) { a } else { b })
    }

    fn split(&self) -> (Self, Self) {
        (Self { key: self.key }, Self { key: self.key })
    }

    fn combine(&self, left: Option<T>, right: Option<T>) -> Option<T> {
        match (left, right) {
            (None, right) => right,
            (left, None) => left,
            (Some(l), Some(r)) => Some(if (self.key)(&l) <= (self.key)(&r) { l } else { r }),
        }
    }
}

/// Terminal consumer finding the item with the maximum key.
pub struct MaxByKeyConsumer<'f, F> {
    key: &'f F,
}

impl<'f, F> MaxByKeyConsumer<'f, F> {
    /// Creates a consumer comparing items by the given key function.
    pub fn new(key: &'f F) -> Self {
        Self { key }
    }
}

impl<T, K, F> Consumer<T> for MaxByKeyConsumer<'_, F>
where
    T: Send,
    K: Ord,
    F: Fn(&T) -> K + Sync,
{
    type Result = Option<T>;

    fn consume_iter(self, items: impl Iterator<Item = T>) -> Option<T> {
        let key = self.key;
        items.reduce(|a, b| if key(&a) >= key(&b) { a } else { b })
    }

    fn split(&self) -> (Self, Self) {
        (Self { key: self.key }, Self { key: self.key })
    }

    fn combine(&self, left: Option<T>, right: Option<T>) -> Option<T> {
        match (left, right) {
            (None, right) => right,
            (left, None) => left,
            (Some(l), Some(r)) => Some(if (self.key)(&l) >= (self.key)(&r) { l } else { r }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Consumes the items both in one go and shard by shard through a freshly
    /// split consumer tree, asserting that the two agree.
    fn assert_split_equivalent<T, C>(make: impl Fn() -> C, items: Vec<T>)
    where
        T: Clone + Send,
        C: Consumer<T>,
        C::Result: PartialEq + std::fmt::Debug,
    {
        let whole = make().consume_iter(items.clone().into_iter());

        for split_point in 0..=items.len() {
            let consumer = make();
            let (left, right) = consumer.split();
            let left_result = left.consume_iter(items[..split_point].iter().cloned());
            let right_result = right.consume_iter(items[split_point..].iter().cloned());
            let combined = consumer.combine(left_result, right_result);
            assert_eq!(combined, whole, "split at {split_point}");
        }
    }

    #[test]
    fn reduce_split_combine_equivalence() {
        let identity = || 1u64;
        let product = |a: u64, b: u64| a * b;
        assert_split_equivalent(
            || ReduceConsumer::new(&identity, &product),
            (1..=10u64).collect(),
        );
    }

    #[test]
    fn sum_split_combine_equivalence() {
        assert_split_equivalent(SumConsumer::<i64>::new, (0..100i64).collect());
    }

    #[test]
    fn count_split_combine_equivalence() {
        assert_split_equivalent(|| CountConsumer, vec!["a"; 17]);
    }

    #[test]
    fn min_max_split_combine_equivalence() {
        let items = vec![5, 3, 9, 3, 7, 1, 8, 1];
        assert_split_equivalent(|| MinConsumer, items.clone());
        assert_split_equivalent(|| MaxConsumer, items);
    }

    #[test]
    fn min_max_empty_sentinel() {
        let empty = std::iter::empty::<i32>();
        assert_eq!(MinConsumer.consume_iter(empty), None);
        assert_eq!(MaxConsumer.consume_iter(std::iter::empty::<i32>()), None);

        assert_eq!(MinConsumer.combine(None, Some(3)), Some(3));
        assert_eq!(MinConsumer.combine(Some(2), None), Some(2));
        assert_eq!(MaxConsumer.combine(None, None::<i32>), None);
    }

    #[test]
    fn min_ties_favor_the_left_element() {
        // Pairs ordered by their first field only, so ties are observable
        // through the second field.
        let key = |pair: &(i32, usize)| pair.0;

        let consumer = MinByKeyConsumer::new(&key);
        let shard = vec![(1, 0), (1, 1), (1, 2)];
        assert_eq!(
            consumer.split().0.consume_iter(shard.into_iter()),
            Some((1, 0))
        );
        assert_eq!(
            MinByKeyConsumer::new(&key).combine(Some((1, 0)), Some((1, 1))),
            Some((1, 0))
        );

        let consumer = MaxByKeyConsumer::new(&key);
        assert_eq!(
            consumer.consume_iter(vec![(5, 0), (5, 1)].into_iter()),
            Some((5, 0))
        );
        assert_eq!(
            MaxByKeyConsumer::new(&key).combine(Some((5, 0)), Some((5, 1))),
            Some((5, 0))
        );
    }

    #[test]
    fn map_applies_before_the_base() {
        let double = |x: i32| x * 2;
        let consumer = MapConsumer::new(SumConsumer::<i32>::new(), &double);
        assert_eq!(consumer.consume_iter(0..5), 20);
    }

    #[test]
    fn filter_skips_items() {
        let even = |x: &i32| x % 2 == 0;
        let consumer = FilterConsumer::new(CountConsumer, &even);
        assert_eq!(consumer.consume_iter(0..10), 5);
    }

    #[test]
    fn map_split_combine_equivalence() {
        let square = |x: i64| x * x;
        assert_split_equivalent(
            || MapConsumer::new(SumConsumer::<i64>::new(), &square),
            (0..50i64).collect(),
        );
    }

    #[test]
    fn fold_feeds_one_value_per_shard() {
        // Fold each shard into its length, then sum the per-shard lengths:
        // the total must be the input length regardless of splitting.
        let identity = || 0usize;
        let count_op = |acc: usize, _item: i32| acc + 1;

        let consumer = FoldConsumer::new(SumConsumer::<usize>::new(), &identity, &count_op);
        let (left, right) = consumer.split();
        let left_result = left.consume_iter(0..7);
        let right_result = right.consume_iter(7..20);
        assert_eq!(left_result, 7);
        assert_eq!(right_result, 13);
        assert_eq!(consumer.combine(left_result, right_result), 20);
    }

    #[test]
    fn for_each_runs_side_effects() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = AtomicUsize::new(0);
        let bump = |_x: i32| {
            hits.fetch_add(1, Ordering::Relaxed);
        };
        let consumer = ForEachConsumer::new(&bump);
        let (left, right) = consumer.split();
        left.consume_iter(0..4);
        right.consume_iter(0..6);
        consumer.combine((), ());
        assert_eq!(hits.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn collect_concatenates_shards() {
        let consumer = CollectConsumer;
        // The item type is pinned explicitly: nothing else constrains it at
        // the point of the split.
        let (left, right) = Consumer::<i32>::split(&consumer);
        let left_result = left.consume_iter(vec![1, 2].into_iter());
        let right_result = right.consume_iter(vec![3, 4, 5].into_iter());
        assert_eq!(consumer.combine(left_result, right_result), vec![1, 2, 3, 4, 5]);
    }
}

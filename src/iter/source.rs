// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pipeline sources: ranges, slices and chained sources.

use super::ParallelIterator;
use crate::core::bridge::{bridge, bridge_unindexed};
use crate::core::consumer::Consumer;
use crate::core::producer::{
    ChainProducer, Producer, RangeProducer, SliceProducer, UnindexedProducer,
};
use crate::error::Result;
use std::ops::Range;

/// A parallel pipeline source backed by an indexed [`Producer`].
///
/// This is the entry point of every pipeline: wrap a producer (or use one of
/// the constructors such as [`par_range()`]), then chain adapters and a
/// terminal from the [`ParallelIterator`] trait.
#[must_use = "iterator adaptors are lazy"]
pub struct Source<P: Producer> {
    producer: P,
}

impl<P: Producer> Source<P> {
    /// Wraps the given producer as a pipeline source.
    pub fn new(producer: P) -> Self {
        Self { producer }
    }

    /// Returns the number of items this source yields.
    pub fn len(&self) -> usize {
        self.producer.len()
    }

    /// Returns `true` if this source yields no item.
    pub fn is_empty(&self) -> bool {
        self.producer.is_empty()
    }

    /// Concatenates two sources of the same kind: the chained source yields
    /// all of `self`'s items, then all of `other`'s.
    pub fn chain(self, other: Source<P>) -> Source<ChainProducer<P>> {
        Source::new(ChainProducer::new(vec![self.producer, other.producer]))
    }
}

impl<P: Producer> ParallelIterator for Source<P> {
    type Item = P::Item;

    fn drive<C: Consumer<P::Item>>(self, consumer: C) -> C::Result {
        bridge(self.producer, consumer)
    }
}

/// A parallel pipeline source backed by an [`UnindexedProducer`], for data
/// whose length isn't known up front.
#[must_use = "iterator adaptors are lazy"]
pub struct UnindexedSource<P: UnindexedProducer> {
    producer: P,
}

impl<P: UnindexedProducer> UnindexedSource<P> {
    /// Wraps the given producer as a pipeline source.
    pub fn new(producer: P) -> Self {
        Self { producer }
    }
}

impl<P: UnindexedProducer> ParallelIterator for UnindexedSource<P> {
    type Item = P::Item;

    fn drive<C: Consumer<P::Item>>(self, consumer: C) -> C::Result {
        bridge_unindexed(self.producer, consumer)
    }
}

/// Creates a pipeline over the integers of `range`, in order, with step 1.
pub fn par_range(range: Range<i64>) -> Source<RangeProducer> {
    Source::new(RangeProducer::from(range))
}

/// Creates a pipeline over the integers from `start` (inclusive) towards
/// `stop` (exclusive) by `step`, which may be negative.
///
/// Fails with [`Error::InvalidStep`](crate::Error::InvalidStep) if `step` is
/// zero.
pub fn par_range_step(start: i64, stop: i64, step: i64) -> Result<Source<RangeProducer>> {
    Ok(Source::new(RangeProducer::new(start, stop, step)?))
}

/// Conversion into a parallel pipeline, by value.
pub trait IntoParallelIterator {
    /// The type of the items the pipeline yields.
    type Item: Send;
    /// The resulting pipeline type.
    type Iter: ParallelIterator<Item = Self::Item>;

    /// Converts `self` into a parallel pipeline.
    fn into_par_iter(self) -> Self::Iter;
}

impl IntoParallelIterator for Range<i64> {
    type Item = i64;
    type Iter = Source<RangeProducer>;

    fn into_par_iter(self) -> Self::Iter {
        par_range(self)
    }
}

impl<'data, T: Sync> IntoParallelIterator for &'data [T] {
    type Item = &'data T;
    type Iter = Source<SliceProducer<'data, T>>;

    fn into_par_iter(self) -> Self::Iter {
        Source::new(SliceProducer::new(self))
    }
}

impl<'data, T: Sync> IntoParallelIterator for &'data Vec<T> {
    type Item = &'data T;
    type Iter = Source<SliceProducer<'data, T>>;

    fn into_par_iter(self) -> Self::Iter {
        self.as_slice().into_par_iter()
    }
}

/// Conversion into a parallel pipeline over shared references.
///
/// Blanket-implemented for every type whose reference converts via
/// [`IntoParallelIterator`], so that `values.par_iter()` works on slices and
/// vectors.
pub trait IntoParallelRefIterator<'data> {
    /// The type of the items the pipeline yields.
    type Item: Send;
    /// The resulting pipeline type.
    type Iter: ParallelIterator<Item = Self::Item>;

    /// Creates a parallel pipeline borrowing `self`'s items.
    fn par_iter(&'data self) -> Self::Iter;
}

impl<'data, T> IntoParallelRefIterator<'data> for T
where
    T: ?Sized + 'data,
    &'data T: IntoParallelIterator,
{
    type Item = <&'data T as IntoParallelIterator>::Item;
    type Iter = <&'data T as IntoParallelIterator>::Iter;

    fn par_iter(&'data self) -> Self::Iter {
        self.into_par_iter()
    }
}

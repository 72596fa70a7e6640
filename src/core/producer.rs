// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Splittable, length-known data sources.
//!
//! A [`Producer`] is an ordered source of items that knows its exact length,
//! can split itself at an arbitrary element index into two producers covering
//! the left and right parts, and can materialize a sequential iterator over
//! its whole span. The [bridge](crate::core::bridge) matches producer splits
//! with [consumer](crate::core::consumer) splits to fan a pipeline out over
//! the thread pool.
//!
//! Producers are transient: one is created per pipeline invocation and
//! discarded once the bridge returns. Splitting only narrows views over the
//! underlying data, it never copies items.

use crate::error::{Error, Result};
use std::ops::Range;

/// A splittable, ordered data source with a known length.
pub trait Producer: Sized + Send {
    /// The type of items that this producer yields.
    type Item: Send;

    /// Sequential iterator over the items of this producer.
    type SeqIter: Iterator<Item = Self::Item>;

    /// Returns the exact number of items this producer will yield, in `O(1)`.
    fn len(&self) -> usize;

    /// Returns `true` if this producer yields no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits this producer at the given index.
    ///
    /// The left producer covers items `[0, index)` and the right producer
    /// covers items `[index, len)`, so that their lengths sum to the original
    /// length and their concatenated output order equals the original output
    /// order.
    ///
    /// Fails with [`Error::InvalidSplit`] if `index == 0 || index >= len()`.
    fn split_at(self, index: usize) -> Result<(Self, Self)>;

    /// Converts this producer into a sequential iterator yielding exactly
    /// [`len()`](Self::len) items in the original order.
    fn into_seq_iter(self) -> Self::SeqIter;
}

/// A producer whose length isn't known in advance.
///
/// Unlike [`Producer`], splitting doesn't take an index: the producer decides
/// where to split, and may decline. This is the contract used by
/// [`bridge_unindexed`](crate::core::bridge::bridge_unindexed).
pub trait UnindexedProducer: Sized + Send {
    /// The type of items that this producer yields.
    type Item: Send;

    /// Sequential iterator over the items of this producer.
    type SeqIter: Iterator<Item = Self::Item>;

    /// Returns `true` if this producer may be split further.
    fn can_split(&self) -> bool;

    /// Attempts to split this producer in two.
    ///
    /// Returns the left half together with `Some(right)` on success. A
    /// producer that declines to split returns itself unchanged together with
    /// [`None`]; the caller then consumes it sequentially.
    fn split(self) -> (Self, Option<Self>);

    /// Converts this producer into a sequential iterator.
    fn into_seq_iter(self) -> Self::SeqIter;
}

/// A producer over an arithmetic range of integers.
///
/// Yields `start, start + step, start + 2*step, ...` up to but excluding
/// `stop`. The step may be negative; it may not be zero. Splitting computes
/// the absolute boundary value without materializing anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeProducer {
    start: i64,
    stop: i64,
    step: i64,
}

impl RangeProducer {
    /// Creates a producer over `start..stop` advancing by `step`.
    ///
    /// Fails with [`Error::InvalidStep`] if `step == 0`.
    pub fn new(start: i64, stop: i64, step: i64) -> Result<Self> {
        if step == 0 {
            return Err(Error::InvalidStep);
        }
        Ok(Self { start, stop, step })
    }

    /// Number of items in `start..stop` by `step`, by ceiling division.
    ///
    /// Computed in 128-bit arithmetic so that ranges spanning most of the
    /// `i64` domain don't overflow.
    fn range_len(start: i64, stop: i64, step: i64) -> usize {
        let (start, stop, step) = (start as i128, stop as i128, step as i128);
        let span = if step > 0 { stop - start } else { start - stop };
        if span <= 0 {
            0
        } else {
            ((span - 1) / step.unsigned_abs() as i128 + 1) as usize
        }
    }
}

impl Producer for RangeProducer {
    type Item = i64;
    type SeqIter = RangeIter;

    fn len(&self) -> usize {
        Self::range_len(self.start, self.stop, self.step)
    }

    fn split_at(self, index: usize) -> Result<(Self, Self)> {
        let len = self.len();
        if index == 0 || index >= len {
            return Err(Error::InvalidSplit { index, len });
        }
        // The boundary is an interior element of the range, so it fits in
        // an i64 even when the intermediate product doesn't.
        let mid = (self.start as i128 + index as i128 * self.step as i128) as i64;
        let left = Self {
            start: self.start,
            stop: mid,
            step: self.step,
        };
        let right = Self {
            start: mid,
            stop: self.stop,
            step: self.step,
        };
        Ok((left, right))
    }

    fn into_seq_iter(self) -> RangeIter {
        RangeIter {
            cursor: self.start,
            step: self.step,
            remaining: self.len(),
        }
    }
}

impl From<Range<i64>> for RangeProducer {
    fn from(range: Range<i64>) -> Self {
        Self {
            start: range.start,
            stop: range.end,
            step: 1,
        }
    }
}

/// Sequential iterator over a [`RangeProducer`].
pub struct RangeIter {
    cursor: i64,
    step: i64,
    remaining: usize,
}

impl Iterator for RangeIter {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        let value = self.cursor;
        self.cursor = self.cursor.wrapping_add(self.step);
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RangeIter {}

/// A producer over a contiguous view of a slice.
///
/// The backing storage is borrowed, shared and read-only for the whole
/// parallel run; splitting narrows the view without copying.
#[derive(Debug)]
pub struct SliceProducer<'data, T> {
    slice: &'data [T],
}

impl<'data, T> SliceProducer<'data, T> {
    /// Creates a producer over the whole given slice.
    pub fn new(slice: &'data [T]) -> Self {
        Self { slice }
    }
}

impl<'data, T: Sync> Producer for SliceProducer<'data, T> {
    type Item = &'data T;
    type SeqIter = std::slice::Iter<'data, T>;

    fn len(&self) -> usize {
        self.slice.len()
    }

    fn split_at(self, index: usize) -> Result<(Self, Self)> {
        let len = self.slice.len();
        if index == 0 || index >= len {
            return Err(Error::InvalidSplit { index, len });
        }
        let (left, right) = self.slice.split_at(index);
        Ok((Self { slice: left }, Self { slice: right }))
    }

    fn into_seq_iter(self) -> std::slice::Iter<'data, T> {
        self.slice.iter()
    }
}

/// A producer concatenating an ordered sequence of child producers.
///
/// Splitting walks the cumulative child lengths: when the index lands
/// exactly on a child boundary the children are redistributed without
/// splitting any of them, otherwise the straddling child is split
/// recursively. Child order is preserved on both sides.
#[derive(Debug)]
pub struct ChainProducer<P: Producer> {
    children: Vec<P>,
    len: usize,
}

impl<P: Producer> ChainProducer<P> {
    /// Creates a producer chaining the given children in order.
    pub fn new(children: Vec<P>) -> Self {
        let len = children.iter().map(|child| child.len()).sum();
        Self { children, len }
    }
}

impl<P: Producer> Producer for ChainProducer<P> {
    type Item = P::Item;
    type SeqIter = ChainIter<P>;

    fn len(&self) -> usize {
        self.len
    }

    fn split_at(mut self, index: usize) -> Result<(Self, Self)> {
        if index == 0 || index >= self.len {
            return Err(Error::InvalidSplit {
                index,
                len: self.len,
            });
        }

        // Find the child that contains the split point.
        let mut cumulative = 0;
        let mut straddling = None;
        for (i, child) in self.children.iter().enumerate() {
            let child_len = child.len();
            if cumulative + child_len > index {
                straddling = Some((i, index - cumulative));
                break;
            }
            cumulative += child_len;
        }
        // index < len, so some child must straddle it.
        let (i, local_index) = straddling.expect("split index not covered by any child");

        let mut right_children = self.children.split_off(i);
        if local_index > 0 {
            let (left_child, right_child) = right_children.remove(0).split_at(local_index)?;
            self.children.push(left_child);
            right_children.insert(0, right_child);
        }
        Ok((Self::new(self.children), Self::new(right_children)))
    }

    fn into_seq_iter(self) -> ChainIter<P> {
        ChainIter {
            children: self.children.into_iter(),
            current: None,
        }
    }
}

/// Sequential iterator over a [`ChainProducer`], exhausting each child in
/// order.
pub struct ChainIter<P: Producer> {
    children: std::vec::IntoIter<P>,
    current: Option<P::SeqIter>,
}

impl<P: Producer> Iterator for ChainIter<P> {
    type Item = P::Item;

    fn next(&mut self) -> Option<P::Item> {
        loop {
            if let Some(iter) = &mut self.current {
                if let Some(item) = iter.next() {
                    return Some(item);
                }
            }
            match self.children.next() {
                Some(child) => self.current = Some(child.into_seq_iter()),
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    fn items<P: Producer>(producer: P) -> Vec<P::Item> {
        producer.into_seq_iter().collect()
    }

    #[test]
    fn range_rejects_zero_step() {
        assert_eq!(RangeProducer::new(0, 10, 0), Err(Error::InvalidStep));
    }

    #[test]
    fn range_length() {
        assert_eq!(RangeProducer::new(0, 10, 1).unwrap().len(), 10);
        assert_eq!(RangeProducer::new(0, 10, 3).unwrap().len(), 4);
        assert_eq!(RangeProducer::new(0, 9, 3).unwrap().len(), 3);
        assert_eq!(RangeProducer::new(0, 0, 1).unwrap().len(), 0);
        assert_eq!(RangeProducer::new(5, 0, 1).unwrap().len(), 0);
        assert_eq!(RangeProducer::new(10, 0, -1).unwrap().len(), 10);
        assert_eq!(RangeProducer::new(10, 0, -3).unwrap().len(), 4);
        assert_eq!(RangeProducer::new(0, 10, -1).unwrap().len(), 0);
        assert_eq!(RangeProducer::new(-5, 5, 2).unwrap().len(), 5);
    }

    #[test]
    fn range_sequential_order() {
        let producer = RangeProducer::new(0, 10, 3).unwrap();
        assert_eq!(items(producer), vec![0, 3, 6, 9]);

        let producer = RangeProducer::new(10, 0, -3).unwrap();
        assert_eq!(items(producer), vec![10, 7, 4, 1]);
    }

    #[test]
    fn range_split_preserves_length_and_order() {
        let producer = RangeProducer::new(0, 100, 7).unwrap();
        let len = producer.len();
        for index in 1..len {
            let (left, right) = producer.split_at(index).unwrap();
            assert_eq!(left.len(), index);
            assert_eq!(left.len() + right.len(), len);

            let mut sequence = items(left);
            sequence.extend(items(right));
            assert_eq!(sequence, items(producer));
        }
    }

    #[test]
    fn range_split_negative_step() {
        let producer = RangeProducer::new(20, -1, -2).unwrap();
        let (left, right) = producer.split_at(4).unwrap();
        assert_eq!(items(left), vec![20, 18, 16, 14]);
        assert_eq!(items(right), vec![12, 10, 8, 6, 4, 2, 0]);
    }

    #[test]
    fn range_rejects_boundary_splits() {
        let producer = RangeProducer::new(0, 10, 1).unwrap();
        assert_eq!(
            producer.split_at(0),
            Err(Error::InvalidSplit { index: 0, len: 10 })
        );
        assert_eq!(
            producer.split_at(10),
            Err(Error::InvalidSplit {
                index: 10,
                len: 10
            })
        );
    }

    #[test]
    fn range_from_std_range() {
        let producer = RangeProducer::from(3..7);
        assert_eq!(items(producer), vec![3, 4, 5, 6]);
    }

    #[test]
    fn slice_split_narrows_view() {
        let data = [1, 2, 3, 4, 5];
        let producer = SliceProducer::new(&data);
        assert_eq!(producer.len(), 5);

        let (left, right) = producer.split_at(2).unwrap();
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 3);
        assert_eq!(items(left), vec![&1, &2]);
        assert_eq!(items(right), vec![&3, &4, &5]);
    }

    #[test]
    fn slice_rejects_boundary_splits() {
        let data = [1, 2, 3];
        assert_eq!(
            SliceProducer::new(&data).split_at(0).unwrap_err(),
            Error::InvalidSplit { index: 0, len: 3 }
        );
        assert_eq!(
            SliceProducer::new(&data).split_at(3).unwrap_err(),
            Error::InvalidSplit { index: 3, len: 3 }
        );
    }

    #[test]
    fn chain_concatenates_children_in_order() {
        let producer = ChainProducer::new(vec![
            RangeProducer::new(0, 3, 1).unwrap(),
            RangeProducer::new(10, 13, 1).unwrap(),
            RangeProducer::new(20, 22, 1).unwrap(),
        ]);
        assert_eq!(producer.len(), 8);
        assert_eq!(items(producer), vec![0, 1, 2, 10, 11, 12, 20, 21]);
    }

    #[test]
    fn chain_split_on_child_boundary() {
        let producer = ChainProducer::new(vec![
            RangeProducer::new(0, 3, 1).unwrap(),
            RangeProducer::new(10, 13, 1).unwrap(),
        ]);
        let (left, right) = producer.split_at(3).unwrap();
        assert_eq!(items(left), vec![0, 1, 2]);
        assert_eq!(items(right), vec![10, 11, 12]);
    }

    #[test]
    fn chain_split_inside_a_child() {
        let producer = ChainProducer::new(vec![
            RangeProducer::new(0, 3, 1).unwrap(),
            RangeProducer::new(10, 14, 1).unwrap(),
            RangeProducer::new(20, 22, 1).unwrap(),
        ]);
        let (left, right) = producer.split_at(5).unwrap();
        assert_eq!(left.len(), 5);
        assert_eq!(items(left), vec![0, 1, 2, 10, 11]);
        assert_eq!(items(right), vec![12, 13, 20, 21]);
    }

    #[test]
    fn chain_split_with_empty_children() {
        let producer = ChainProducer::new(vec![
            RangeProducer::new(0, 0, 1).unwrap(),
            RangeProducer::new(0, 4, 1).unwrap(),
            RangeProducer::new(0, 0, 1).unwrap(),
        ]);
        assert_eq!(producer.len(), 4);
        let (left, right) = producer.split_at(2).unwrap();
        assert_eq!(items(left), vec![0, 1]);
        assert_eq!(items(right), vec![2, 3]);
    }

    #[test]
    fn chain_rejects_boundary_splits() {
        let producer = ChainProducer::new(vec![RangeProducer::new(0, 4, 1).unwrap()]);
        assert_eq!(
            producer.split_at(4).unwrap_err(),
            Error::InvalidSplit { index: 4, len: 4 }
        );
    }

    #[test]
    fn random_splits_preserve_length_and_order() {
        let mut rng = rand::rng();
        let data: Vec<u32> = (0..500).collect();
        for _ in 0..100 {
            let producer = ChainProducer::new(vec![
                SliceProducer::new(&data[..200]),
                SliceProducer::new(&data[200..350]),
                SliceProducer::new(&data[350..]),
            ]);
            let len = producer.len();
            let index = rng.random_range(1..len);

            let (left, right) = producer.split_at(index).unwrap();
            assert_eq!(left.len(), index);
            assert_eq!(left.len() + right.len(), len);

            let mut sequence: Vec<u32> = items(left).into_iter().copied().collect();
            sequence.extend(items(right).into_iter().copied());
            assert_eq!(sequence, data);
        }
    }
}

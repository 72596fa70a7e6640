// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error taxonomy of the engine.
//!
//! All errors are surfaced synchronously to the caller and none of them is
//! retried: every operation in this crate is deterministic given correct
//! inputs. Panics raised by user-provided functions are not part of this
//! taxonomy; they propagate through whichever thread was executing the shard
//! and are re-raised on the joining thread.

use thiserror::Error;

/// A specialized [`Result`](std::result::Result) type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by producers and by the pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A configuration setter was called with a value below its minimum. The
    /// configuration is left unchanged.
    #[error("invalid argument {name}: {message}")]
    InvalidArgument {
        /// Name of the rejected parameter.
        name: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// A range producer was constructed with a step of zero.
    #[error("range step cannot be zero")]
    InvalidStep,

    /// A producer was asked to split at an out-of-range index.
    ///
    /// The bridge never requests a boundary index, so observing this error
    /// outside of direct producer manipulation indicates a bug in the
    /// splitting algorithm.
    #[error("invalid split index {index} for a producer of {len} items")]
    InvalidSplit {
        /// The requested split index.
        index: usize,
        /// The length of the producer that was asked to split.
        len: usize,
    },
}

impl Error {
    /// Creates an [`Error::InvalidArgument`] for the given parameter.
    pub(crate) fn invalid_arg(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            name,
            message: message.into(),
        }
    }
}

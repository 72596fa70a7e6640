// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs)]

mod core;
mod error;
pub mod iter;
mod macros;

pub use crate::core::config::{
    get_max_depth, get_min_split_size, get_num_threads, set_max_depth, set_min_split_size,
    set_num_threads, ThreadPoolConfig,
};
pub use crate::core::{consumer, producer};
pub use crate::error::{Error, Result};

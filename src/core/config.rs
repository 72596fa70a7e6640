// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Global configuration of the parallel execution strategy.
//!
//! All parallel pipelines run against a single process-wide
//! [`ThreadPoolConfig`]: a thread count, a minimal input length below which
//! splitting stops, and a maximal recursion depth. The configuration only
//! affects how work is scheduled, never the result of a pipeline.

use super::thread_pool::ThreadPool;
use crate::error::{Error, Result};
use crate::macros::{log_debug, log_warn};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Environment variable overriding the default thread count, read once at
/// first use.
const NUM_THREADS_ENV: &str = "PARAFORK_NUM_THREADS";

/// Default for the minimal number of items a task processes sequentially.
const DEFAULT_MIN_SPLIT_SIZE: usize = 10_000;

/// Default for the maximal recursion depth of the splitting process.
const DEFAULT_MAX_DEPTH: usize = 8;

/// The process-wide configuration singleton.
static CONFIG: OnceLock<ThreadPoolConfig> = OnceLock::new();

/// Process-wide configuration of the thread pool and splitting strategy.
///
/// There is a single instance per process, obtained with
/// [`ThreadPoolConfig::global()`]. The free functions at the crate root
/// ([`set_num_threads()`] and friends) are shorthands for its methods.
pub struct ThreadPoolConfig {
    state: Mutex<State>,
}

/// Mutable state behind the global configuration.
struct State {
    /// Number of worker threads, resolved lazily.
    num_threads: Option<NonZeroUsize>,
    /// Minimal number of items below which a task isn't split further.
    min_split_size: usize,
    /// Maximal depth of the splitting recursion.
    max_depth: usize,
    /// The active thread pool, created lazily on first use.
    pool: Option<Arc<ThreadPool>>,
}

/// Resolves the thread count from the environment or the host parallelism.
fn default_num_threads() -> NonZeroUsize {
    if let Ok(value) = std::env::var(NUM_THREADS_ENV) {
        match value.parse::<NonZeroUsize>() {
            Ok(count) => return count,
            Err(_) => {
                log_warn!("[config] ignoring invalid {NUM_THREADS_ENV}={value:?}");
            }
        }
    }
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

impl ThreadPoolConfig {
    /// Returns the process-wide configuration.
    pub fn global() -> &'static ThreadPoolConfig {
        CONFIG.get_or_init(|| ThreadPoolConfig {
            state: Mutex::new(State {
                num_threads: None,
                min_split_size: DEFAULT_MIN_SPLIT_SIZE,
                max_depth: DEFAULT_MAX_DEPTH,
                pool: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Returns the number of worker threads in effect.
    ///
    /// Unless overridden by [`set_num_threads()`](Self::set_num_threads),
    /// the count is resolved on first call from the `PARAFORK_NUM_THREADS`
    /// environment variable, falling back to the host's available
    /// parallelism. The resolved value is cached; later environment changes
    /// have no effect.
    pub fn num_threads(&self) -> usize {
        Self::resolve_num_threads(&mut self.lock()).get()
    }

    fn resolve_num_threads(state: &mut State) -> NonZeroUsize {
        match state.num_threads {
            Some(count) => count,
            None => {
                let count = default_num_threads();
                log_debug!("[config] resolved the thread count to {count}");
                state.num_threads = Some(count);
                count
            }
        }
    }

    /// Sets the number of worker threads for subsequent pipelines.
    ///
    /// If a thread pool is already running, it is retired asynchronously:
    /// its workers drain their queue and exit on their own, and a new pool
    /// with the requested size is created by the next pipeline. Pipelines
    /// already in flight finish on the old pool and are unaffected.
    ///
    /// Fails if `num_threads` is zero.
    pub fn set_num_threads(&self, num_threads: usize) -> Result<()> {
        let Some(count) = NonZeroUsize::new(num_threads) else {
            return Err(Error::invalid_arg("num_threads", "must be at least 1"));
        };
        let mut state = self.lock();
        state.num_threads = Some(count);
        if let Some(pool) = state.pool.take() {
            log_debug!("[config] retiring the active thread pool");
            pool.finish();
        }
        Ok(())
    }

    /// Returns the minimal number of items a task processes sequentially.
    pub fn min_split_size(&self) -> usize {
        self.lock().min_split_size
    }

    /// Sets the minimal number of items below which work isn't split
    /// further. Fails if `min_split_size` is zero.
    pub fn set_min_split_size(&self, min_split_size: usize) -> Result<()> {
        if min_split_size == 0 {
            return Err(Error::invalid_arg("min_split_size", "must be at least 1"));
        }
        self.lock().min_split_size = min_split_size;
        Ok(())
    }

    /// Returns the maximal depth of the splitting recursion.
    pub fn max_depth(&self) -> usize {
        self.lock().max_depth
    }

    /// Sets the maximal depth of the splitting recursion. Fails if
    /// `max_depth` is zero.
    pub fn set_max_depth(&self, max_depth: usize) -> Result<()> {
        if max_depth == 0 {
            return Err(Error::invalid_arg("max_depth", "must be at least 1"));
        }
        self.lock().max_depth = max_depth;
        Ok(())
    }

    /// Tears the active thread pool down synchronously, waiting for its
    /// workers to drain their queue and exit.
    ///
    /// The next pipeline lazily creates a fresh pool, so this is safe to
    /// call at any point, typically before process exit.
    pub fn shutdown(&self) {
        let pool = self.lock().pool.take();
        if let Some(pool) = pool {
            pool.finish();
            pool.join_workers();
            log_debug!("[config] thread pool shut down");
        }
    }

    /// Takes a consistent snapshot of the configuration.
    ///
    /// The thread pool is created on first use, and only when more than one
    /// thread is configured: a single-threaded run never fans out, so it
    /// gets no pool at all.
    pub(crate) fn execution(&self) -> Execution {
        let mut state = self.lock();
        let num_threads = Self::resolve_num_threads(&mut state).get();
        let pool = if num_threads > 1 {
            Some(match &state.pool {
                Some(pool) => pool.clone(),
                None => {
                    let pool = Arc::new(ThreadPool::new(num_threads));
                    state.pool = Some(pool.clone());
                    pool
                }
            })
        } else {
            None
        };
        Execution {
            pool,
            num_threads,
            min_split_size: state.min_split_size,
            max_depth: state.max_depth,
        }
    }
}

/// Snapshot of the splitting parameters together with the active pool.
pub(crate) struct Execution {
    /// The active thread pool, or [`None`] when a single thread is
    /// configured.
    pub(crate) pool: Option<Arc<ThreadPool>>,
    /// Number of worker threads in the pool.
    pub(crate) num_threads: usize,
    /// Minimal number of items a task processes sequentially.
    pub(crate) min_split_size: usize,
    /// Maximal depth of the splitting recursion.
    pub(crate) max_depth: usize,
}

/// Shorthand for [`ThreadPoolConfig::global()`]`.execution()`.
pub(crate) fn execution() -> Execution {
    ThreadPoolConfig::global().execution()
}

/// Returns the number of worker threads in effect. See
/// [`ThreadPoolConfig::num_threads()`].
pub fn get_num_threads() -> usize {
    ThreadPoolConfig::global().num_threads()
}

/// Sets the number of worker threads for subsequent pipelines. See
/// [`ThreadPoolConfig::set_num_threads()`].
pub fn set_num_threads(num_threads: usize) -> Result<()> {
    ThreadPoolConfig::global().set_num_threads(num_threads)
}

/// Returns the minimal number of items a task processes sequentially.
pub fn get_min_split_size() -> usize {
    ThreadPoolConfig::global().min_split_size()
}

/// Sets the minimal number of items below which work isn't split further.
pub fn set_min_split_size(min_split_size: usize) -> Result<()> {
    ThreadPoolConfig::global().set_min_split_size(min_split_size)
}

/// Returns the maximal depth of the splitting recursion.
pub fn get_max_depth() -> usize {
    ThreadPoolConfig::global().max_depth()
}

/// Sets the maximal depth of the splitting recursion.
pub fn set_max_depth(max_depth: usize) -> Result<()> {
    ThreadPoolConfig::global().set_max_depth(max_depth)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Serializes tests touching the global configuration.
    static TEST_CONFIG_LOCK: Mutex<()> = Mutex::new(());

    /// Locks the global configuration for a test and restores the default
    /// splitting parameters on release.
    pub(crate) struct ConfigGuard {
        _guard: MutexGuard<'static, ()>,
    }

    impl ConfigGuard {
        pub(crate) fn acquire() -> Self {
            let guard = TEST_CONFIG_LOCK
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _guard: guard }
        }
    }

    impl Drop for ConfigGuard {
        fn drop(&mut self) {
            let mut state = ThreadPoolConfig::global().lock();
            state.min_split_size = DEFAULT_MIN_SPLIT_SIZE;
            state.max_depth = DEFAULT_MAX_DEPTH;
        }
    }
}

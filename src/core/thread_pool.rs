// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A thread pool executing fork-join tasks.
//!
//! The pool owns a fixed set of worker threads parked on a shared task
//! queue. Submitting a task returns a [`TaskHandle`] whose
//! [`join()`](TaskHandle::join) blocks until the task completes and yields
//! its output, re-raising the task's panic on the joining thread if it had
//! one.
//!
//! Joining first tries to claim and run the task inline if no worker has
//! picked it up yet. A joiner therefore never blocks on an unstarted task,
//! which keeps the wait graph deadlock-free: waits only target running
//! tasks, and those form a tree across threads (a task only waits on tasks
//! it spawned itself), so the deepest wait always sits above a task that
//! completes.

use super::util::Status;
use crate::macros::{log_debug, log_error, log_trace};
use crossbeam_utils::CachePadded;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A lifetime-erased task body.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads consuming a shared task queue.
pub(crate) struct ThreadPool {
    /// State shared with the worker threads.
    shared: Arc<Shared>,
    /// Handles to all the worker threads in the pool.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// State shared between the pool handle and the worker threads.
struct Shared {
    /// Tasks submitted and not yet claimed by any thread.
    queue: Mutex<VecDeque<Arc<Task>>>,
    /// Signaled when a task is pushed or when shutdown is requested.
    available: Condvar,
    /// Once set, workers exit as soon as the queue is drained.
    shutdown: CachePadded<AtomicBool>,
}

/// A claimable unit of work with a completion flag.
struct Task {
    /// The body to run, taken by whichever thread claims the task first.
    job: Mutex<Option<Job>>,
    /// Set to `true` once the body has run to completion.
    done: Status<bool>,
}

impl Task {
    /// Claims and runs this task, or does nothing if another thread already
    /// claimed it.
    fn run(&self) {
        let job = self.job.lock().unwrap().take();
        if let Some(job) = job {
            // The job catches panics internally and cannot unwind here.
            job();
            self.done.notify_all(true);
        }
    }

    /// Blocks until this task has run to completion.
    fn wait_done(&self) {
        let _guard = self.done.wait_while(|done| !*done);
    }
}

impl ThreadPool {
    /// Creates a pool with the given number of worker threads.
    pub(crate) fn new(num_threads: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: CachePadded::new(AtomicBool::new(false)),
        });

        let workers = (0..num_threads)
            .map(|id| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("parafork-{id}"))
                    .spawn(move || worker_loop(&shared, id))
                    .expect("failed to spawn a worker thread")
            })
            .collect();
        log_debug!("[pool] spawned {num_threads} worker thread(s)");

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Submits a task to the pool and returns a handle to join it.
    ///
    /// The task's panics are captured and re-raised by
    /// [`join()`](TaskHandle::join) on the joining thread.
    ///
    /// # Safety
    ///
    /// The closure may borrow from the caller's environment (lifetime
    /// `'env`). The caller must ensure that the task has finished running
    /// before any such borrow ends: joining or dropping the handle inside
    /// `'env` guarantees this, so the handle must not be leaked (e.g. via
    /// [`std::mem::forget`]).
    pub(crate) unsafe fn submit<'env, R, F>(&self, func: F) -> TaskHandle<'env, R>
    where
        R: Send + 'env,
        F: FnOnce() -> R + Send + 'env,
    {
        let output = Arc::new(Mutex::new(None));
        let slot = output.clone();
        let job: Box<dyn FnOnce() + Send + 'env> = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(func));
            if result.is_err() {
                log_error!("[pool] a task panicked; re-raising on the joining thread");
            }
            *slot.lock().unwrap() = Some(result);
        });
        // SAFETY: The `'env` lifetime is erased here. The caller guarantees
        // that the task runs to completion before `'env` ends (see the
        // function's safety contract), and the only path that runs the job
        // notifies `done` right after, which is exactly what `join()` and the
        // handle's destructor wait for. The borrows captured by the job are
        // therefore never dereferenced after `'env` ends.
        let job: Job = unsafe { std::mem::transmute(job) };

        let task = Arc::new(Task {
            job: Mutex::new(Some(job)),
            done: Status::new(false),
        });
        self.shared.queue.lock().unwrap().push_back(task.clone());
        self.shared.available.notify_one();
        log_trace!("[pool] submitted a task");

        TaskHandle {
            task,
            output,
            _env: PhantomData,
        }
    }

    /// Requests an asynchronous shutdown.
    ///
    /// Workers drain the remaining queue and exit; tasks already running are
    /// never aborted. Returns without waiting for the workers.
    pub(crate) fn finish(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        log_debug!("[pool] shutdown requested");
    }

    /// Joins all the worker threads. Call [`finish()`](Self::finish) first.
    pub(crate) fn join_workers(&self) {
        for handle in self.workers.lock().unwrap().drain(..) {
            if handle.join().is_err() {
                log_error!("[pool] a worker thread panicked");
            }
        }
        log_debug!("[pool] joined all worker threads");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Asynchronous teardown: the workers hold their own reference to the
        // shared state and exit once the queue is drained.
        self.finish();
    }
}

/// Main function run by a worker thread.
fn worker_loop(shared: &Shared, _id: usize) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    break Some(task);
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                queue = shared.available.wait(queue).unwrap();
            }
        };
        match task {
            Some(task) => task.run(),
            None => break,
        }
    }
    log_debug!("[worker {_id}] exiting");
}

/// Handle to a submitted task, used to wait for its output.
///
/// The handle's destructor waits for the task to complete, so that borrows
/// captured by the task remain valid for its whole execution even when the
/// handle is dropped without joining (e.g. while unwinding).
pub(crate) struct TaskHandle<'env, R> {
    /// The submitted task.
    task: Arc<Task>,
    /// Slot receiving the task's output or panic payload.
    output: Arc<Mutex<Option<std::thread::Result<R>>>>,
    /// Invariant marker tying the handle to the borrows captured by the task.
    _env: PhantomData<&'env mut &'env ()>,
}

impl<R> TaskHandle<'_, R> {
    /// Blocks until the task completes and returns its output.
    ///
    /// If the task panicked, the panic is re-raised here with its original
    /// payload.
    pub(crate) fn join(self) -> R {
        // Steal-back: claim and run the task inline if no worker picked it
        // up yet, so that joining never blocks on an unstarted task.
        self.task.run();
        self.task.wait_done();
        let result = self
            .output
            .lock()
            .unwrap()
            .take()
            .expect("task completed without storing an output");
        match result {
            Ok(value) => value,
            Err(payload) => resume_unwind(payload),
        }
    }
}

impl<R> Drop for TaskHandle<'_, R> {
    fn drop(&mut self) {
        // No-op after a join; otherwise runs or waits for the task, whose
        // borrows must outlive its execution.
        self.task.run();
        self.task.wait_done();
    }
}

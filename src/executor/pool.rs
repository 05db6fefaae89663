//! Fixed-size thread pool.
//!
//! Workers pull jobs from one shared FIFO. `shutdown` stops intake but lets
//! already-queued jobs finish, which is exactly the window in which a
//! key-sequential runner sees its continuations rejected.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::{Executor, Job};
use crate::error::{RejectedExecution, Result};

thread_local! {
    /// Set on threads spawned as pool workers.
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

struct Queue {
    jobs: VecDeque<Job>,
    shutdown: bool,
    live_workers: usize,
}

struct Shared {
    queue: Mutex<Queue>,
    work_available: Condvar,
    terminated: Condvar,
}

/// A pool of `threads` workers implementing [`Executor`].
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Start a pool with `threads` workers named `keyseq-worker-N`.
    pub fn new(threads: usize) -> Result<Self> {
        Self::with_name(threads, "keyseq-worker")
    }

    /// Start a pool whose worker threads are named `{prefix}-N`.
    pub fn with_name(threads: usize, prefix: &str) -> Result<Self> {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                shutdown: false,
                live_workers: threads,
            }),
            work_available: Condvar::new(),
            terminated: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(threads);
        for n in 0..threads {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{prefix}-{n}"))
                .spawn(move || worker_loop(&worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Workers that never started must not be awaited.
                    {
                        let mut queue = shared.queue.lock();
                        queue.live_workers -= threads - n;
                        queue.shutdown = true;
                    }
                    shared.work_available.notify_all();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(e.into());
                }
            }
        }

        debug!(threads, prefix, "thread pool started");
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Stop accepting jobs. Jobs already queued still run.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
        }
        self.shared.work_available.notify_all();
        debug!("thread pool shutting down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.queue.lock().shutdown
    }

    /// Number of jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    /// Block until every worker has exited after [`shutdown`](Self::shutdown).
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut queue = self.shared.queue.lock();
        while queue.live_workers > 0 {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .terminated
                        .wait_until(&mut queue, deadline)
                        .timed_out()
                    {
                        return queue.live_workers == 0;
                    }
                }
                None => self.shared.terminated.wait(&mut queue),
            }
        }
        drop(queue);

        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
        true
    }
}

impl Executor for ThreadPool {
    fn execute(&self, job: Job) -> std::result::Result<(), RejectedExecution> {
        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return Err(RejectedExecution::Shutdown);
            }
            queue.jobs.push_back(job);
        }
        self.shared.work_available.notify_one();
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
        // A worker dropping the last handle cannot wait for itself to exit.
        if ON_WORKER.with(Cell::get) {
            return;
        }
        if !self.await_termination(Duration::from_secs(5)) {
            warn!("thread pool workers still busy after shutdown, detaching them");
        }
    }
}

fn worker_loop(shared: &Shared) {
    ON_WORKER.with(|on_worker| on_worker.set(true));
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break Some(job);
                }
                if queue.shutdown {
                    break None;
                }
                shared.work_available.wait(&mut queue);
            }
        };

        let Some(job) = job else { break };
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
            warn!("job panicked on pool worker");
        }
    }

    let mut queue = shared.queue.lock();
    queue.live_workers -= 1;
    if queue.live_workers == 0 {
        shared.terminated.notify_all();
    }
}

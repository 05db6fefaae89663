//! Executor backed by a tokio runtime's blocking pool.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;

use super::{Executor, Job};
use crate::error::RejectedExecution;

/// Runs jobs with [`Handle::spawn_blocking`].
///
/// Tasks are synchronous closures, so they go to the blocking pool rather
/// than the async worker threads. Intake can be closed explicitly with
/// [`close`](Self::close); tokio itself never refuses a blocking spawn.
pub struct TokioExecutor {
    handle: Handle,
    closed: AtomicBool,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            closed: AtomicBool::new(false),
        }
    }

    /// Bind to the runtime the caller is running on.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Refuse every job submitted from now on.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) -> Result<(), RejectedExecution> {
        if self.is_closed() {
            return Err(RejectedExecution::Shutdown);
        }
        // Detached: completion is observed by the task itself, not the handle.
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }
}

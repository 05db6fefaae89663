//! Underlying executors: the collaborators that actually run work.
//!
//! The key-sequential machinery never owns threads. It hands zero-argument
//! jobs to an [`Executor`], which either accepts them for asynchronous
//! execution or refuses them synchronously with a [`RejectedExecution`].

pub mod blocking;
pub mod pool;

use std::sync::Arc;

use crate::error::RejectedExecution;

pub use blocking::TokioExecutor;
pub use pool::ThreadPool;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs, possibly with bounded capacity.
///
/// Implementations must not run the job on the calling thread while holding
/// any lock the caller could need, and must report refusal through the return
/// value rather than by dropping the job silently.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job) -> Result<(), RejectedExecution>;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, job: Job) -> Result<(), RejectedExecution> {
        (**self).execute(job)
    }
}

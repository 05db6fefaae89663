//! Key-synchronized executor.
//!
//! Same per-key ordering as [`KeySequentialExecutor`](crate::keyed::KeySequentialExecutor),
//! but a worker that picks up a key keeps running that key's queue until it
//! is empty. Consecutive tasks for one key therefore run on the same thread
//! whenever they are queued before the worker retires the key.

use std::sync::Arc;

use crate::error::Result;
use crate::executor::Executor;
use crate::keyed::{KeyedExecutor, KeyedTask};
use crate::runner::{Continuation, FailureHandler, Key, KeySequentialRunner, discard};

#[derive(Clone)]
pub struct KeySynchronizedExecutor<K: Key> {
    runner: KeySequentialRunner<K>,
}

impl<K: Key> KeySynchronizedExecutor<K> {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self::with_handler(executor, discard())
    }

    pub fn with_handler(executor: Arc<dyn Executor>, handler: FailureHandler<K>) -> Self {
        Self {
            runner: KeySequentialRunner::build(executor, handler, Continuation::SameThread),
        }
    }

    /// Number of keys with queued work or an active worker.
    pub fn active_keys(&self) -> usize {
        self.runner.active_keys()
    }
}

impl<K: Key> KeyedExecutor<K> for KeySynchronizedExecutor<K> {
    fn execute(&self, task: KeyedTask<K>) -> Result<()> {
        let (key, task) = task.into_parts();
        self.runner.submit(key, task)
    }
}

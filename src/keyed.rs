//! Keyed task wrapper and the executor-shaped surface over the runner.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::Result;
use crate::executor::Executor;
use crate::runner::{FailureHandler, Key, KeySequentialRunner, Task};

/// A task bundled with the key it must be serialized under.
///
/// Equality and hashing delegate to the key, so two keyed tasks compare equal
/// when they belong to the same serialization domain.
pub struct KeyedTask<K> {
    key: K,
    task: Option<Task>,
}

impl<K> KeyedTask<K> {
    pub fn new<F>(key: K, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            key,
            task: Some(Box::new(f)),
        }
    }

    /// Assemble a keyed task from an already boxed, possibly absent task.
    pub fn from_parts(key: K, task: Option<Task>) -> Self {
        Self { key, task }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn has_task(&self) -> bool {
        self.task.is_some()
    }

    pub fn into_parts(self) -> (K, Option<Task>) {
        (self.key, self.task)
    }
}

impl<K: PartialEq> PartialEq for KeyedTask<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Eq> Eq for KeyedTask<K> {}

impl<K: Hash> Hash for KeyedTask<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<K: fmt::Debug> fmt::Debug for KeyedTask<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedTask")
            .field("key", &self.key)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

/// Executes keyed tasks with per-key ordering.
pub trait KeyedExecutor<K: Key>: Send + Sync {
    fn execute(&self, task: KeyedTask<K>) -> Result<()>;

    /// Execute a closure under `key`.
    fn run<F>(&self, key: K, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
        Self: Sized,
    {
        self.execute(KeyedTask::new(key, f))
    }
}

/// Executor-shaped adapter forwarding keyed tasks to a [`KeySequentialRunner`].
#[derive(Clone)]
pub struct KeySequentialExecutor<K: Key> {
    runner: KeySequentialRunner<K>,
}

impl<K: Key> KeySequentialExecutor<K> {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            runner: KeySequentialRunner::new(executor),
        }
    }

    pub fn with_handler(executor: Arc<dyn Executor>, handler: FailureHandler<K>) -> Self {
        Self {
            runner: KeySequentialRunner::with_handler(executor, handler),
        }
    }

    pub fn runner(&self) -> &KeySequentialRunner<K> {
        &self.runner
    }
}

impl<K: Key> From<KeySequentialRunner<K>> for KeySequentialExecutor<K> {
    fn from(runner: KeySequentialRunner<K>) -> Self {
        Self { runner }
    }
}

impl<K: Key> KeyedExecutor<K> for KeySequentialExecutor<K> {
    fn execute(&self, task: KeyedTask<K>) -> Result<()> {
        let (key, task) = task.into_parts();
        self.runner.submit(key, task)
    }
}

//! Key-sequential dispatch engine.
//!
//! Tasks submitted under the same key run strictly one after another, in
//! submission order. Tasks under different keys run concurrently on the
//! underlying [`Executor`].
//!
//! ## Locking
//! - One coarse registry lock over the key → state map (insert/remove, and
//!   the enqueue that must not race a removal).
//! - One fine lock per key over its queue.
//! - Order is always registry → key. Neither lock is held while a task runs
//!   or while the executor is called.
//!
//! ## Per-key lifecycle
//! ```text
//! absent ──submit──► armed ──step──► armed ... ──empty──► absent
//!                      │
//!                      ├─continuation rejected─► draining inline ──► absent
//!                      └─first dispatch rejected─► absent (or unarmed while tasks remain)
//! ```

pub mod handler;
pub(crate) mod state;
mod trampoline;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, RejectedExecution, Result};
use crate::executor::Executor;
use crate::telemetry::dispatch::{record_drained, start_drain_span};
use crate::telemetry::metrics::DispatchInstruments;

pub use handler::{FailureHandler, TaskFailure, discard};
use state::KeyState;

/// An opaque side-effecting unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Bounds every key type must satisfy.
pub trait Key: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + Debug + Send + Sync + 'static> Key for T {}

/// What a trampoline does after finishing a task when more work is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Hand the next task back to the executor as a fresh job.
    Resubmit,
    /// Keep running the key's queue on the current thread until it is empty.
    SameThread,
}

struct Inner<K: Key> {
    executor: Arc<dyn Executor>,
    handler: FailureHandler<K>,
    continuation: Continuation,
    registry: Mutex<HashMap<K, Arc<KeyState>>>,
    instruments: DispatchInstruments,
}

/// Runs tasks sequentially per key on top of an underlying executor.
///
/// Cloning is cheap and clones share the same registry.
pub struct KeySequentialRunner<K: Key> {
    inner: Arc<Inner<K>>,
}

impl<K: Key> Clone for KeySequentialRunner<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Key> KeySequentialRunner<K> {
    /// Create a runner that discards task failures.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self::with_handler(executor, discard())
    }

    /// Create a runner that reports task failures to `handler`.
    pub fn with_handler(executor: Arc<dyn Executor>, handler: FailureHandler<K>) -> Self {
        Self::build(executor, handler, Continuation::Resubmit)
    }

    pub(crate) fn build(
        executor: Arc<dyn Executor>,
        handler: FailureHandler<K>,
        continuation: Continuation,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                handler,
                continuation,
                registry: Mutex::new(HashMap::new()),
                instruments: DispatchInstruments::new(),
            }),
        }
    }

    /// Queue `task` under `key`.
    ///
    /// Fails with [`Error::MissingTask`] before touching any state if `task`
    /// is `None`, and with [`Error::KeyRejected`] if this submission armed the
    /// key and the executor refused its first dispatch.
    ///
    /// If the key is currently draining inline after a rejected continuation,
    /// the task is dropped and `Ok(())` is returned.
    pub fn submit(&self, key: K, task: Option<Task>) -> Result<()> {
        let task = task.ok_or(Error::MissingTask)?;

        let (state, refused) = {
            let mut registry = self.inner.registry.lock();
            let state = Arc::clone(
                registry
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(KeyState::new())),
            );
            let refused = state.enqueue(task).err();
            (state, refused)
        };

        if let Some(task) = refused {
            drop(task);
            self.inner.instruments.dropped.add(1, &[]);
            warn!(key = ?key, "key is draining inline, task dropped");
            return Ok(());
        }
        self.inner.instruments.submitted.add(1, &[]);

        self.inner.trigger(&key, &state)
    }

    /// Queue a closure under `key`.
    pub fn run<F>(&self, key: K, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(key, Some(Box::new(f)))
    }

    /// Number of keys with queued work or an active trampoline.
    pub fn active_keys(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// True when no key has pending work.
    pub fn is_idle(&self) -> bool {
        self.inner.registry.lock().is_empty()
    }

    /// True if `key` currently has queued work or an active trampoline.
    pub fn is_active(&self, key: &K) -> bool {
        self.inner.registry.lock().contains_key(key)
    }
}

impl<K: Key> Inner<K> {
    /// Arm the key if nobody owns it yet and hand its head to the executor.
    ///
    /// A refused first dispatch rolls the key back and is reported to this
    /// caller. Tasks other callers queued meanwhile get one more dispatch
    /// attempt; if that is refused too they stay queued, unarmed, for the next
    /// submitter. Queued tasks are never run on this caller's thread.
    fn trigger(self: &Arc<Self>, key: &K, state: &Arc<KeyState>) -> Result<()> {
        let Some(first) = state.try_arm() else {
            return Ok(());
        };

        let Err((reason, _)) = self.dispatch(key, state, first) else {
            return Ok(());
        };
        self.instruments.record_rejection("initial", reason.as_label());
        warn!(key = ?key, %reason, "first dispatch rejected");
        self.roll_back(key, state, None);

        if let Some(next) = state.try_arm() {
            if let Err((retry_reason, unrun)) = self.dispatch(key, state, next) {
                self.instruments.record_rejection("initial", retry_reason.as_label());
                debug!(key = ?key, reason = %retry_reason, "queued tasks wait for the next submit");
                self.roll_back(key, state, unrun);
            }
        }

        Err(Error::KeyRejected {
            key: format!("{key:?}"),
            source: reason,
        })
    }

    /// Undo an arm whose first dispatch was refused, retiring the key if
    /// nothing is left to run.
    fn roll_back(&self, key: &K, state: &Arc<KeyState>, unrun: Option<Task>) {
        let mut registry = self.registry.lock();
        state.disarm(unrun);
        if remove_if_empty(&mut registry, key, state) {
            debug!(key = ?key, "key retired");
        }
    }

    /// Submit one step for `key` to the executor.
    ///
    /// On refusal the task is handed back alongside the reason.
    fn dispatch(
        self: &Arc<Self>,
        key: &K,
        state: &Arc<KeyState>,
        task: Task,
    ) -> std::result::Result<(), (RejectedExecution, Option<Task>)> {
        let slot = Arc::new(Mutex::new(Some(task)));
        let job = {
            let inner = Arc::clone(self);
            let key = key.clone();
            let state = Arc::clone(state);
            let slot = Arc::clone(&slot);
            Box::new(move || {
                let task = slot.lock().take();
                if let Some(task) = task {
                    trampoline::bounce(move || inner.step(key, state, task));
                }
            })
        };

        self.executor
            .execute(job)
            .map_err(|reason| (reason, slot.lock().take()))
    }

    /// One trampoline step: run the task, then pass the key on or retire it.
    ///
    /// Never recurses into itself; an executor that runs the continuation
    /// inline gets it deferred by [`trampoline::bounce`].
    fn step(self: Arc<Self>, key: K, state: Arc<KeyState>, task: Task) {
        let mut task = task;
        loop {
            self.run_isolated(&key, task);
            let Some(next) = self.next(&key, &state) else {
                return;
            };
            match self.continuation {
                Continuation::SameThread => task = next,
                Continuation::Resubmit => return self.hand_off(&key, &state, next),
            }
        }
    }

    /// Dispatch the key's next task; drain inline if the executor refuses.
    fn hand_off(self: &Arc<Self>, key: &K, state: &Arc<KeyState>, next: Task) {
        if let Err((reason, next)) = self.dispatch(key, state, next) {
            self.instruments.record_rejection("continuation", reason.as_label());
            self.drain_inline(key, state, next, reason);
        }
    }

    /// Close the key and run everything still queued on this thread.
    fn drain_inline(
        &self,
        key: &K,
        state: &Arc<KeyState>,
        first: Option<Task>,
        reason: RejectedExecution,
    ) {
        state.close();
        self.instruments.drained_inline.add(1, &[]);
        let span = start_drain_span(key, reason.as_label());

        let mut drained = 0u64;
        let mut current = first.or_else(|| self.next(key, state));
        while let Some(task) = current {
            self.run_isolated(key, task);
            drained += 1;
            current = self.next(key, state);
        }
        record_drained(&span, drained);
    }

    /// Fetch the key's next task, retiring the key if there is none.
    ///
    /// The unlocked-registry dequeue is the fast path. An empty result is
    /// re-checked under the registry lock so that a task enqueued in between
    /// is never stranded behind a removed state.
    fn next(&self, key: &K, state: &Arc<KeyState>) -> Option<Task> {
        if let Some(task) = state.dequeue() {
            return Some(task);
        }

        let mut registry = self.registry.lock();
        let task = state.dequeue();
        if task.is_none() && remove_if_empty(&mut registry, key, state) {
            debug!(key = ?key, "key retired");
        }
        task
    }

    fn run_isolated(&self, key: &K, task: Task) {
        let started = Instant::now();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.instruments.record_outcome(result.is_err(), elapsed_ms);

        if let Err(payload) = result {
            let failure = TaskFailure::from_panic(payload);
            debug!(key = ?key, error = %failure, "task failed");
            (self.handler)(key, failure);
        }
    }
}

/// Remove `key` only if it still maps to `state` and `state` has no tasks.
///
/// Must be called with the registry lock held.
fn remove_if_empty<K: Key>(
    registry: &mut HashMap<K, Arc<KeyState>>,
    key: &K,
    state: &Arc<KeyState>,
) -> bool {
    let owned = registry
        .get(key)
        .is_some_and(|current| Arc::ptr_eq(current, state));
    if owned && state.is_empty() {
        registry.remove(key);
        true
    } else {
        false
    }
}

//! # Admission control
//!
//! Caps the number of tasks in flight (admitted but not yet finished).
//! When the cap is reached the [`BoundedStrategy`] decides what happens to a
//! new submission:
//!
//! - `Block`: the submitting thread waits for a slot.
//! - `Reject`: the submission fails with [`RejectedExecution::Saturated`].
//!
//! ## Drain
//! `drain(timeout)` closes intake for good (every later submission fails with
//! [`RejectedExecution::Draining`], blocked submitters included) and waits
//! until everything admitted has finished.
//!
//! ## Placement
//! [`KeySequentialBoundedExecutor`] admits keyed tasks before they reach the
//! runner, so a permit covers one task from submission to completion.
//! [`BoundedExecutor`] admits raw jobs; do not use it with `Block` as the
//! underlying executor of a runner, since a trampoline re-submits from inside
//! a job that still holds its own permit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, RejectedExecution, Result};
use crate::executor::{Executor, Job};
use crate::keyed::{KeyedExecutor, KeyedTask};
use crate::runner::{FailureHandler, Key, KeySequentialRunner};
use crate::telemetry::metrics::admissions;

/// What to do with a submission while at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundedStrategy {
    /// Block the submitting thread until a slot frees up.
    #[default]
    Block,
    /// Fail the submission immediately.
    Reject,
}

impl std::str::FromStr for BoundedStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(BoundedStrategy::Block),
            "reject" => Ok(BoundedStrategy::Reject),
            other => Err(Error::Config(format!(
                "unknown bounded strategy {other:?} (expected \"block\" or \"reject\")"
            ))),
        }
    }
}

impl std::fmt::Display for BoundedStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BoundedStrategy::Block => "block",
            BoundedStrategy::Reject => "reject",
        };
        write!(f, "{s}")
    }
}

struct Slots {
    in_flight: usize,
    draining: bool,
}

/// Counting gate shared by the bounded executors.
pub struct Admission {
    max: usize,
    strategy: BoundedStrategy,
    slots: Mutex<Slots>,
    released: Condvar,
    decisions: Counter<u64>,
}

/// One admitted unit of work. Dropping it frees the slot.
pub struct Permit {
    admission: Arc<Admission>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        {
            let mut slots = self.admission.slots.lock();
            slots.in_flight -= 1;
        }
        self.admission.released.notify_all();
    }
}

impl Admission {
    /// A gate admitting at most `max` units at once (`max` is raised to 1).
    pub fn new(max: usize, strategy: BoundedStrategy) -> Arc<Self> {
        Arc::new(Self {
            max: max.max(1),
            strategy,
            slots: Mutex::new(Slots {
                in_flight: 0,
                draining: false,
            }),
            released: Condvar::new(),
            decisions: admissions(),
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn strategy(&self) -> BoundedStrategy {
        self.strategy
    }

    pub fn in_flight(&self) -> usize {
        self.slots.lock().in_flight
    }

    pub fn is_draining(&self) -> bool {
        self.slots.lock().draining
    }

    /// Take a slot, blocking or rejecting at capacity per the strategy.
    pub fn acquire(self: &Arc<Self>) -> std::result::Result<Permit, RejectedExecution> {
        let mut slots = self.slots.lock();
        loop {
            if slots.draining {
                self.record("draining");
                return Err(RejectedExecution::Draining);
            }
            if slots.in_flight < self.max {
                slots.in_flight += 1;
                self.record("admitted");
                return Ok(Permit {
                    admission: Arc::clone(self),
                });
            }
            match self.strategy {
                BoundedStrategy::Reject => {
                    self.record("saturated");
                    return Err(RejectedExecution::Saturated);
                }
                BoundedStrategy::Block => self.released.wait(&mut slots),
            }
        }
    }

    /// Close intake and wait for in-flight work to finish.
    ///
    /// Returns `true` if everything finished before `timeout`.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut slots = self.slots.lock();
        if !slots.draining {
            slots.draining = true;
            // Blocked submitters must wake up and observe the drain.
            self.released.notify_all();
            debug!(in_flight = slots.in_flight, "admission draining");
        }

        while slots.in_flight > 0 {
            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut slots, deadline).timed_out() {
                        return slots.in_flight == 0;
                    }
                }
                None => self.released.wait(&mut slots),
            }
        }
        true
    }

    fn record(&self, result: &'static str) {
        self.decisions.add(1, &[KeyValue::new("result", result)]);
    }
}

/// [`Executor`] decorator admitting each job through an [`Admission`] gate.
pub struct BoundedExecutor<E: Executor> {
    inner: E,
    admission: Arc<Admission>,
}

impl<E: Executor> BoundedExecutor<E> {
    pub fn new(max: usize, strategy: BoundedStrategy, inner: E) -> Self {
        Self {
            inner,
            admission: Admission::new(max, strategy),
        }
    }

    pub fn admission(&self) -> &Arc<Admission> {
        &self.admission
    }

    /// See [`Admission::drain`].
    pub fn drain(&self, timeout: Duration) -> bool {
        self.admission.drain(timeout)
    }
}

impl<E: Executor> Executor for BoundedExecutor<E> {
    fn execute(&self, job: Job) -> std::result::Result<(), RejectedExecution> {
        let permit = self.admission.acquire()?;
        // A refused job is dropped by the inner executor, releasing the permit.
        self.inner.execute(Box::new(move || {
            let _permit = permit;
            job();
        }))
    }
}

/// Key-sequential executor with admission control on submitted tasks.
pub struct KeySequentialBoundedExecutor<K: Key> {
    runner: KeySequentialRunner<K>,
    admission: Arc<Admission>,
}

impl<K: Key> KeySequentialBoundedExecutor<K> {
    pub fn new(max_tasks: usize, strategy: BoundedStrategy, executor: Arc<dyn Executor>) -> Self {
        Self::from_runner(max_tasks, strategy, KeySequentialRunner::new(executor))
    }

    pub fn with_handler(
        max_tasks: usize,
        strategy: BoundedStrategy,
        executor: Arc<dyn Executor>,
        handler: FailureHandler<K>,
    ) -> Self {
        Self::from_runner(
            max_tasks,
            strategy,
            KeySequentialRunner::with_handler(executor, handler),
        )
    }

    fn from_runner(
        max_tasks: usize,
        strategy: BoundedStrategy,
        runner: KeySequentialRunner<K>,
    ) -> Self {
        Self {
            runner,
            admission: Admission::new(max_tasks, strategy),
        }
    }

    pub fn runner(&self) -> &KeySequentialRunner<K> {
        &self.runner
    }

    pub fn admission(&self) -> &Arc<Admission> {
        &self.admission
    }

    /// See [`Admission::drain`].
    pub fn drain(&self, timeout: Duration) -> bool {
        self.admission.drain(timeout)
    }
}

impl<K: Key> KeyedExecutor<K> for KeySequentialBoundedExecutor<K> {
    fn execute(&self, task: KeyedTask<K>) -> Result<()> {
        let (key, task) = task.into_parts();
        let task = task.ok_or(Error::MissingTask)?;
        let permit = self.admission.acquire()?;
        // The permit travels with the task: it is released when the task
        // finishes, panics, or is dropped unexecuted.
        self.runner.run(key, move || {
            let _permit = permit;
            task();
        })
    }
}

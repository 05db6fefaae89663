//! Failure reporting for tasks that panic.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A panic captured from a task body.
pub struct TaskFailure {
    payload: Box<dyn Any + Send + 'static>,
}

impl TaskFailure {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self { payload }
    }

    /// The panic message, when the payload is a string.
    pub fn message(&self) -> Option<&str> {
        if let Some(s) = self.payload.downcast_ref::<&'static str>() {
            Some(s)
        } else {
            self.payload.downcast_ref::<String>().map(String::as_str)
        }
    }

    /// The raw panic payload, for callers that panic with their own types.
    pub fn payload(&self) -> &(dyn Any + Send + 'static) {
        &*self.payload
    }

    /// Take the raw panic payload, e.g. to resume unwinding with it.
    pub fn into_payload(self) -> Box<dyn Any + Send + 'static> {
        self.payload
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFailure")
            .field("message", &self.message())
            .finish()
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "task panicked: {msg}"),
            None => write!(f, "task panicked"),
        }
    }
}

/// Receives `(key, failure)` on the thread that ran the failed task.
///
/// The handler must not panic. A panicking handler is outside the runner's
/// contract and may abort the dispatch of that key.
pub type FailureHandler<K> = Arc<dyn Fn(&K, TaskFailure) + Send + Sync>;

/// The default handler: discard the failure.
pub fn discard<K: 'static>() -> FailureHandler<K> {
    Arc::new(|_key: &K, _failure: TaskFailure| {})
}

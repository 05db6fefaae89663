//! Per-key queue and dispatch flags.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::Task;

struct Queue {
    tasks: VecDeque<Task>,
    /// Set while a trampoline owns this key. Cleared only when the key's
    /// first dispatch is refused.
    armed: bool,
    /// Cleared when a continuation was rejected and the key is draining inline.
    accepting: bool,
}

/// State of one key while it has pending work or an active trampoline.
///
/// The lock here guards the queue only. It is taken after the registry lock
/// when both are needed and is never held while a task runs.
pub(crate) struct KeyState {
    queue: Mutex<Queue>,
}

impl KeyState {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                armed: false,
                accepting: true,
            }),
        }
    }

    /// Append a task. A closed key hands the task back to the caller, who
    /// drops it outside every lock.
    pub(crate) fn enqueue(&self, task: Task) -> Result<(), Task> {
        let mut queue = self.queue.lock();
        if !queue.accepting {
            return Err(task);
        }
        queue.tasks.push_back(task);
        Ok(())
    }

    /// Arm the key and take its head task.
    ///
    /// Returns `None` if a trampoline already owns the key (it will pick the
    /// new task up) or if there is nothing queued.
    pub(crate) fn try_arm(&self) -> Option<Task> {
        let mut queue = self.queue.lock();
        if queue.armed {
            return None;
        }
        let head = queue.tasks.pop_front()?;
        queue.armed = true;
        Some(head)
    }

    /// Release the key after its first dispatch was refused.
    ///
    /// `unrun` goes back to the head of the queue so the next arm picks it up.
    pub(crate) fn disarm(&self, unrun: Option<Task>) {
        let mut queue = self.queue.lock();
        if let Some(task) = unrun {
            queue.tasks.push_front(task);
        }
        queue.armed = false;
    }

    pub(crate) fn dequeue(&self) -> Option<Task> {
        self.queue.lock().tasks.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().tasks.is_empty()
    }

    /// Stop accepting external submissions for this key.
    pub(crate) fn close(&self) {
        self.queue.lock().accepting = false;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.lock().tasks.len()
    }
}

//! Thread-local trampoline for dispatch steps.
//!
//! An executor is free to run a job on the submitting thread. When a step
//! hands its continuation to such an executor, the next step would start
//! inside the current one and the stack would grow with the key's queue.
//! Steps therefore go through [`bounce`]: the outermost call on a thread runs
//! them, nested calls only enqueue and return.

use std::cell::RefCell;
use std::collections::VecDeque;

type Bounce = Box<dyn FnOnce()>;

thread_local! {
    static PENDING: RefCell<Option<VecDeque<Bounce>>> = const { RefCell::new(None) };
}

/// Resets the thread's trampoline even if a bounce unwinds.
struct Active;

impl Drop for Active {
    fn drop(&mut self) {
        PENDING.with(|pending| pending.borrow_mut().take());
    }
}

/// Run `step` now, or after the step currently running on this thread.
pub(crate) fn bounce(step: impl FnOnce() + 'static) {
    let step: Bounce = Box::new(step);
    let outermost = PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        match pending.as_mut() {
            Some(queue) => {
                queue.push_back(step);
                None
            }
            None => {
                *pending = Some(VecDeque::new());
                Some(step)
            }
        }
    });

    let Some(step) = outermost else { return };
    let _active = Active;
    step();
    while let Some(next) = PENDING.with(|pending| pending.borrow_mut().as_mut()?.pop_front()) {
        next();
    }
}
